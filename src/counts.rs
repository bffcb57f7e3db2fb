use crate::energy::{EnergyBounds, EnergyUnit};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum SpectrumError {
    #[error("{counts} counts for {bins} energy bins")]
    ShapeMismatch { counts: usize, bins: usize },
    #[error("cannot add spectra with different energy grids")]
    GridMismatch,
    #[error("{what} has {found} entries, expected {expected}")]
    Length {
        what: &'static str,
        found: usize,
        expected: usize,
    },
}
type Result<T> = std::result::Result<T, SpectrumError>;

/// Counts histogram over an energy grid
///
/// Counts are real valued: background vectors scaled by alpha are not integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountsSpectrum {
    energy: EnergyBounds,
    data: Vec<f64>,
}
impl CountsSpectrum {
    pub fn new(data: Vec<f64>, energy: EnergyBounds) -> Result<Self> {
        if data.len() != energy.nbins() {
            return Err(SpectrumError::ShapeMismatch {
                counts: data.len(),
                bins: energy.nbins(),
            });
        }
        Ok(Self { energy, data })
    }
    /// Empty spectrum
    pub fn zeros(energy: EnergyBounds) -> Self {
        Self {
            data: vec![0f64; energy.nbins()],
            energy,
        }
    }
    pub fn nbins(&self) -> usize {
        self.data.len()
    }
    pub fn energy(&self) -> &EnergyBounds {
        &self.energy
    }
    pub fn data(&self) -> &[f64] {
        &self.data
    }
    /// Sum of all the bins
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }
    /// Index of the bin holding `energy`
    pub fn find_bin(&self, energy: f64) -> Option<usize> {
        self.energy.find_bin(energy)
    }
    /// Bin by bin sum of two spectra sharing the same energy grid
    pub fn try_add(&self, other: &CountsSpectrum) -> Result<CountsSpectrum> {
        if !self.energy.is_compatible(&other.energy) {
            return Err(SpectrumError::GridMismatch);
        }
        Ok(Self {
            energy: self.energy.clone(),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a + b)
                .collect(),
        })
    }
    /// Returns the spectrum with its energy grid expressed in `unit`
    pub fn to_energy_unit(&self, unit: EnergyUnit) -> Self {
        Self {
            energy: self.energy.to_unit(unit),
            data: self.data.clone(),
        }
    }
    /// Iterator over the (lower edge, upper edge, counts) of each bin
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.energy
            .lower_bounds()
            .iter()
            .zip(self.energy.upper_bounds())
            .zip(&self.data)
            .map(|((&lo, &hi), &n)| (lo, hi, n))
    }
}
