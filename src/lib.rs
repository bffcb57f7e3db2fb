//! # Gamma-ray 1D spectral observations
//!
//! Region based spectral analysis data: on and off counts vectors, effective area
//! and energy dispersion, bundled into a [SpectrumObservation].
//! A [SpectrumObservationList] is stacked into a single observation with the
//! [SpectrumObservationStacker].
//!
//! Observations are saved as an OGIP-like family of pickle files (see [ogip]).

pub mod counts;
pub mod energy;
pub mod error;
pub mod irf;
pub mod models;
pub mod observation;
pub mod observation_list;
pub mod ogip;
pub mod pha;
#[cfg(feature = "plot")]
pub mod plot;
pub mod stacker;
pub mod stats;

pub use counts::CountsSpectrum;
pub use energy::{AreaUnit, EnergyBounds, EnergyUnit};
pub use error::Error;
pub use irf::{EffectiveAreaTable, EnergyDispersion};
pub use models::{PowerLaw, SpectralModel};
pub use observation::SpectrumObservation;
pub use observation_list::SpectrumObservationList;
pub use ogip::{UnitConvention, WriteOptions};
pub use pha::{Backscal, ObsId, PhaCountsSpectrum};
pub use stacker::SpectrumObservationStacker;
pub use stats::SpectrumStats;
