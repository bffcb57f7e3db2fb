//! Energy binning
//!
//! Bin edges of reconstructed and true energy axes together with their physical unit.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

#[derive(thiserror::Error, Debug)]
pub enum EnergyError {
    #[error("an energy grid needs at least 2 edges, found {0}")]
    TooFewEdges(usize),
    #[error("energy edges must be finite and strictly increasing (edge #{0})")]
    NotIncreasing(usize),
    #[error("invalid log-spaced grid: [{0}, {1}] with {2} bins")]
    InvalidSpacing(f64, f64, usize),
    #[error("unknown unit")]
    Unit(#[from] strum::ParseError),
}
type Result<T> = std::result::Result<T, EnergyError>;

/// Relative tolerance used when comparing energies
pub const ENERGY_RTOL: f64 = 1e-9;

/// `a <= b` up to [`ENERGY_RTOL`]
pub(crate) fn le_rtol(a: f64, b: f64) -> bool {
    a <= b + ENERGY_RTOL * a.abs().max(b.abs())
}

/// Energy unit
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum EnergyUnit {
    #[strum(serialize = "keV")]
    KeV,
    #[strum(serialize = "MeV")]
    MeV,
    #[strum(serialize = "GeV")]
    GeV,
    #[default]
    #[strum(serialize = "TeV")]
    TeV,
}
impl EnergyUnit {
    /// Value of one unit in keV
    pub fn in_kev(&self) -> f64 {
        match self {
            EnergyUnit::KeV => 1f64,
            EnergyUnit::MeV => 1e3,
            EnergyUnit::GeV => 1e6,
            EnergyUnit::TeV => 1e9,
        }
    }
    /// Converts `value` from this unit into `unit`
    pub fn convert(&self, value: f64, unit: EnergyUnit) -> f64 {
        if *self == unit {
            value
        } else {
            value * self.in_kev() / unit.in_kev()
        }
    }
}

/// Area unit
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum AreaUnit {
    #[default]
    #[strum(serialize = "m2")]
    SquareMeter,
    #[strum(serialize = "cm2")]
    SquareCentimeter,
}
impl AreaUnit {
    /// Value of one unit in cm^2
    pub fn in_cm2(&self) -> f64 {
        match self {
            AreaUnit::SquareMeter => 1e4,
            AreaUnit::SquareCentimeter => 1f64,
        }
    }
    /// Converts `value` from this unit into `unit`
    pub fn convert(&self, value: f64, unit: AreaUnit) -> f64 {
        if *self == unit {
            value
        } else {
            value * self.in_cm2() / unit.in_cm2()
        }
    }
}

/// Energy bin edges
///
/// `N` bins are described by `N+1` strictly increasing edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyBounds {
    edges: Vec<f64>,
    unit: EnergyUnit,
}
impl EnergyBounds {
    pub fn new(edges: Vec<f64>, unit: EnergyUnit) -> Result<Self> {
        if edges.len() < 2 {
            return Err(EnergyError::TooFewEdges(edges.len()));
        }
        if let Some(i) = edges.iter().position(|e| !e.is_finite()) {
            return Err(EnergyError::NotIncreasing(i));
        }
        if let Some(i) = edges.windows(2).position(|w| w[1] <= w[0]) {
            return Err(EnergyError::NotIncreasing(i + 1));
        }
        Ok(Self { edges, unit })
    }
    /// Logarithmically spaced bins between `emin` and `emax`
    pub fn equal_log_spacing(emin: f64, emax: f64, nbins: usize, unit: EnergyUnit) -> Result<Self> {
        if nbins == 0 || !(emin > 0f64) || !(emax > emin) {
            return Err(EnergyError::InvalidSpacing(emin, emax, nbins));
        }
        let (log_min, log_max) = (emin.log10(), emax.log10());
        let step = (log_max - log_min) / nbins as f64;
        let edges = (0..=nbins)
            .map(|i| match i {
                0 => emin,
                i if i == nbins => emax,
                i => 10f64.powf(log_min + step * i as f64),
            })
            .collect();
        Self::new(edges, unit)
    }
    /// Number of bins
    pub fn nbins(&self) -> usize {
        self.edges.len() - 1
    }
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }
    pub fn unit(&self) -> EnergyUnit {
        self.unit
    }
    pub fn lower_bounds(&self) -> &[f64] {
        &self.edges[..self.nbins()]
    }
    pub fn upper_bounds(&self) -> &[f64] {
        &self.edges[1..]
    }
    /// First edge
    pub fn min(&self) -> f64 {
        self.edges[0]
    }
    /// Last edge
    pub fn max(&self) -> f64 {
        self.edges[self.nbins()]
    }
    /// Geometric bin centers
    pub fn log_centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| (w[0] * w[1]).sqrt()).collect()
    }
    /// Lower and upper edges of bin `idx`
    pub fn bin(&self, idx: usize) -> Option<(f64, f64)> {
        (idx < self.nbins()).then(|| (self.edges[idx], self.edges[idx + 1]))
    }
    /// Index of the bin holding `energy`, the last edge belongs to the last bin
    pub fn find_bin(&self, energy: f64) -> Option<usize> {
        if !(energy >= self.min() && energy <= self.max()) {
            return None;
        }
        let idx = self.edges.partition_point(|&e| e <= energy);
        Some(idx.saturating_sub(1).min(self.nbins() - 1))
    }
    /// Returns the grid expressed in `unit`
    pub fn to_unit(&self, unit: EnergyUnit) -> Self {
        Self {
            edges: self
                .edges
                .iter()
                .map(|&e| self.unit.convert(e, unit))
                .collect(),
            unit,
        }
    }
    /// Checks that both grids have the same edges once expressed in the same unit
    pub fn is_compatible(&self, other: &EnergyBounds) -> bool {
        self.nbins() == other.nbins()
            && self
                .edges
                .iter()
                .zip(other.to_unit(self.unit).edges.iter())
                .all(|(a, b)| (a - b).abs() <= ENERGY_RTOL * a.abs().max(b.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn log_spacing() {
        let e = EnergyBounds::equal_log_spacing(0.1, 100., 3, EnergyUnit::TeV).unwrap();
        assert_eq!(e.nbins(), 3);
        assert_eq!(e.min(), 0.1);
        assert_eq!(e.max(), 100.);
        assert!((e.edges()[1] - 1.).abs() < 1e-12);
        assert!((e.log_centers()[1] - 10f64.sqrt() * 1.).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_edges() {
        assert!(matches!(
            EnergyBounds::new(vec![1.], EnergyUnit::TeV),
            Err(EnergyError::TooFewEdges(1))
        ));
        assert!(matches!(
            EnergyBounds::new(vec![1., 2., 2.], EnergyUnit::TeV),
            Err(EnergyError::NotIncreasing(2))
        ));
        assert!(EnergyBounds::new(vec![1., f64::NAN], EnergyUnit::TeV).is_err());
    }

    #[test]
    fn find_bin() {
        let e = EnergyBounds::new(vec![1., 2., 4., 8.], EnergyUnit::TeV).unwrap();
        assert_eq!(e.find_bin(1.), Some(0));
        assert_eq!(e.find_bin(3.), Some(1));
        assert_eq!(e.find_bin(4.), Some(2));
        assert_eq!(e.find_bin(8.), Some(2));
        assert_eq!(e.find_bin(0.5), None);
        assert_eq!(e.find_bin(9.), None);
    }

    #[test]
    fn unit_compatibility() {
        let tev = EnergyBounds::new(vec![1., 10.], EnergyUnit::TeV).unwrap();
        let kev = tev.to_unit(EnergyUnit::KeV);
        assert_eq!(kev.edges()[0], 1e9);
        assert!(tev.is_compatible(&kev));
        let other = EnergyBounds::new(vec![1., 11.], EnergyUnit::TeV).unwrap();
        assert!(!tev.is_compatible(&other));
        assert_eq!("keV".parse::<EnergyUnit>().unwrap(), EnergyUnit::KeV);
        assert_eq!(AreaUnit::SquareMeter.convert(1., AreaUnit::SquareCentimeter), 1e4);
    }

    #[test]
    fn unit_strings() {
        assert_eq!(
            EnergyUnit::iter().map(|u| u.to_string()).collect::<Vec<_>>(),
            vec!["keV", "MeV", "GeV", "TeV"]
        );
        assert_eq!(
            AreaUnit::iter().map(|u| u.to_string()).collect::<Vec<_>>(),
            vec!["m2", "cm2"]
        );
        assert!("eV".parse::<EnergyUnit>().is_err());
    }
}
