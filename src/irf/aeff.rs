use super::IrfError;
use crate::energy::{AreaUnit, EnergyBounds, EnergyUnit};
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, IrfError>;

/// Effective area versus true energy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveAreaTable {
    /// true energy bins
    energy: EnergyBounds,
    /// effective area of each true energy bin
    data: Vec<f64>,
    unit: AreaUnit,
}
impl EffectiveAreaTable {
    pub fn new(energy: EnergyBounds, data: Vec<f64>, unit: AreaUnit) -> Result<Self> {
        if data.len() != energy.nbins() {
            return Err(IrfError::AeffShape {
                found: data.len(),
                expected: energy.nbins(),
            });
        }
        Ok(Self { energy, data, unit })
    }
    pub fn energy(&self) -> &EnergyBounds {
        &self.energy
    }
    pub fn unit(&self) -> AreaUnit {
        self.unit
    }
    pub fn nbins(&self) -> usize {
        self.data.len()
    }
    /// Effective area of each true energy bin
    pub fn evaluate(&self) -> &[f64] {
        &self.data
    }
    /// Effective area of each true energy bin with NaN replaced by 0
    pub fn evaluate_fill_nan(&self) -> Vec<f64> {
        self.data
            .iter()
            .map(|&a| if a.is_nan() { 0f64 } else { a })
            .collect()
    }
    /// Effective area at a given true energy
    pub fn evaluate_at(&self, energy: f64) -> Option<f64> {
        self.energy.find_bin(energy).map(|i| self.data[i])
    }
    /// Largest effective area
    pub fn max_area(&self) -> f64 {
        self.data
            .iter()
            .filter(|a| !a.is_nan())
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max)
    }
    /// Returns the table with energy and area expressed in the given units
    pub fn to_units(&self, energy_unit: EnergyUnit, area_unit: AreaUnit) -> Self {
        Self {
            energy: self.energy.to_unit(energy_unit),
            data: self
                .data
                .iter()
                .map(|&a| self.unit.convert(a, area_unit))
                .collect(),
            unit: area_unit,
        }
    }
}
