//! Instrument response functions

mod aeff;
pub use aeff::*;
mod edisp;
pub use edisp::*;

#[derive(thiserror::Error, Debug)]
pub enum IrfError {
    #[error("{found} effective area values for {expected} true energy bins")]
    AeffShape { found: usize, expected: usize },
    #[error("energy dispersion is {found:?}, expected {expected:?} (true x reco)")]
    EdispShape {
        found: (usize, usize),
        expected: (usize, usize),
    },
    #[error("{found} values to fold for {expected} true energy bins")]
    FoldShape { found: usize, expected: usize },
    #[error("{found} safe range flags for {expected} reco energy bins")]
    MaskShape { found: usize, expected: usize },
}
