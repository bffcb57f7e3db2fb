//! OGIP PHA counts spectrum
//!
//! A [CountsSpectrum] with the observation meta data: observation id, livetime,
//! background scaling, quality flags and safe energy range.

use crate::{
    counts::{CountsSpectrum, SpectrumError},
    energy::{le_rtol, EnergyBounds, EnergyUnit},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Deref};

type Result<T> = std::result::Result<T, SpectrumError>;

/// Observation identifier
///
/// Stacked spectra carry the sorted union of the ids of the observations they are made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObsId {
    Single(u32),
    Stacked(Vec<u32>),
}
impl Default for ObsId {
    fn default() -> Self {
        ObsId::Single(0)
    }
}
impl From<u32> for ObsId {
    fn from(id: u32) -> Self {
        ObsId::Single(id)
    }
}
impl ObsId {
    /// Sorted and deduplicated union of several ids
    pub fn union<'a>(ids: impl IntoIterator<Item = &'a ObsId>) -> Self {
        ObsId::Stacked(
            ids.into_iter()
                .flat_map(|id| id.ids())
                .sorted_unstable()
                .dedup()
                .collect(),
        )
    }
    /// All the ids
    pub fn ids(&self) -> Vec<u32> {
        match self {
            ObsId::Single(id) => vec![*id],
            ObsId::Stacked(ids) => ids.clone(),
        }
    }
    pub fn contains(&self, id: u32) -> bool {
        match self {
            ObsId::Single(this) => *this == id,
            ObsId::Stacked(ids) => ids.contains(&id),
        }
    }
    /// Tag used in OGIP file names
    pub fn file_tag(&self) -> String {
        match self {
            ObsId::Single(id) => id.to_string(),
            ObsId::Stacked(_) => "stacked".to_string(),
        }
    }
}
impl fmt::Display for ObsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObsId::Single(id) => write!(f, "{}", id),
            ObsId::Stacked(ids) => match (ids.first(), ids.last()) {
                (Some(first), Some(last)) => write!(f, "[{}-{}]", first, last),
                _ => write!(f, "[]"),
            },
        }
    }
}

/// Background scaling factor, a scalar or one value per bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Backscal {
    Scalar(f64),
    PerBin(Vec<f64>),
}
impl Default for Backscal {
    fn default() -> Self {
        Backscal::Scalar(1f64)
    }
}
impl Backscal {
    /// Backscal value of each of the `nbins` bins
    pub fn to_array(&self, nbins: usize) -> Vec<f64> {
        match self {
            Backscal::Scalar(value) => vec![*value; nbins],
            Backscal::PerBin(values) => values.clone(),
        }
    }
    fn check(&self, nbins: usize) -> Result<()> {
        match self {
            Backscal::PerBin(values) if values.len() != nbins => Err(SpectrumError::Length {
                what: "backscal",
                found: values.len(),
                expected: nbins,
            }),
            _ => Ok(()),
        }
    }
}

/// OGIP PHA counts spectrum
#[derive(Debug, Clone, PartialEq)]
pub struct PhaCountsSpectrum {
    counts: CountsSpectrum,
    obs_id: ObsId,
    /// livetime [s]
    livetime: f64,
    backscal: Backscal,
    /// `true` for bad bins
    quality: Vec<bool>,
    lo_threshold: f64,
    hi_threshold: f64,
}
impl Deref for PhaCountsSpectrum {
    type Target = CountsSpectrum;

    fn deref(&self) -> &Self::Target {
        &self.counts
    }
}
impl PhaCountsSpectrum {
    /// Creates a PHA spectrum with its safe range spanning the whole energy grid
    pub fn new(data: Vec<f64>, energy: EnergyBounds) -> Result<Self> {
        let counts = CountsSpectrum::new(data, energy)?;
        let nbins = counts.nbins();
        let (lo_threshold, hi_threshold) = (counts.energy().min(), counts.energy().max());
        Ok(Self {
            counts,
            obs_id: ObsId::default(),
            livetime: 0f64,
            backscal: Backscal::default(),
            quality: vec![false; nbins],
            lo_threshold,
            hi_threshold,
        })
    }
    pub fn with_obs_id<I: Into<ObsId>>(self, obs_id: I) -> Self {
        Self {
            obs_id: obs_id.into(),
            ..self
        }
    }
    pub fn with_livetime(self, livetime: f64) -> Self {
        Self { livetime, ..self }
    }
    pub fn with_backscal(self, backscal: Backscal) -> Result<Self> {
        backscal.check(self.nbins())?;
        Ok(Self { backscal, ..self })
    }
    pub fn with_quality(self, quality: Vec<bool>) -> Result<Self> {
        if quality.len() != self.nbins() {
            return Err(SpectrumError::Length {
                what: "quality",
                found: quality.len(),
                expected: self.nbins(),
            });
        }
        Ok(Self { quality, ..self })
    }
    /// Sets the low and high energy thresholds, in the unit of the energy grid
    pub fn with_thresholds(self, lo_threshold: f64, hi_threshold: f64) -> Self {
        Self {
            lo_threshold,
            hi_threshold,
            ..self
        }
    }

    pub fn counts(&self) -> &CountsSpectrum {
        &self.counts
    }
    pub fn obs_id(&self) -> &ObsId {
        &self.obs_id
    }
    pub fn set_obs_id<I: Into<ObsId>>(&mut self, obs_id: I) {
        self.obs_id = obs_id.into();
    }
    /// Livetime [s]
    pub fn livetime(&self) -> f64 {
        self.livetime
    }
    pub fn set_livetime(&mut self, livetime: f64) {
        self.livetime = livetime;
    }
    pub fn backscal(&self) -> &Backscal {
        &self.backscal
    }
    pub fn set_backscal(&mut self, backscal: Backscal) -> Result<()> {
        backscal.check(self.nbins())?;
        self.backscal = backscal;
        Ok(())
    }
    /// Backscal value of each bin
    pub fn backscal_array(&self) -> Vec<f64> {
        self.backscal.to_array(self.nbins())
    }
    pub fn quality(&self) -> &[bool] {
        &self.quality
    }
    pub fn lo_threshold(&self) -> f64 {
        self.lo_threshold
    }
    pub fn set_lo_threshold(&mut self, threshold: f64) {
        self.lo_threshold = threshold;
    }
    pub fn hi_threshold(&self) -> f64 {
        self.hi_threshold
    }
    pub fn set_hi_threshold(&mut self, threshold: f64) {
        self.hi_threshold = threshold;
    }
    /// Thresholds expressed in `unit`
    pub fn thresholds_in(&self, unit: EnergyUnit) -> (f64, f64) {
        let this = self.energy().unit();
        (
            this.convert(self.lo_threshold, unit),
            this.convert(self.hi_threshold, unit),
        )
    }

    /// Flags the bins fully inside the thresholds and of good quality
    pub fn safe_range_mask(&self) -> Vec<bool> {
        let energy = self.energy();
        energy
            .lower_bounds()
            .iter()
            .zip(energy.upper_bounds())
            .zip(&self.quality)
            .map(|((&lo, &hi), &bad)| {
                !bad && le_rtol(self.lo_threshold, lo) && le_rtol(hi, self.hi_threshold)
            })
            .collect()
    }
    /// Indices of the bins inside the safe range
    pub fn bins_in_safe_range(&self) -> Vec<usize> {
        self.safe_range_mask()
            .into_iter()
            .enumerate()
            .filter_map(|(i, safe)| safe.then_some(i))
            .collect()
    }
    /// Counts with the bins outside the safe range set to 0
    pub fn counts_in_safe_range(&self) -> Vec<f64> {
        self.data()
            .iter()
            .zip(self.safe_range_mask())
            .map(|(&n, safe)| if safe { n } else { 0f64 })
            .collect()
    }

    /// Source counts file name
    pub fn phafile(&self) -> String {
        format!("pha_obs{}.pkl", self.obs_id.file_tag())
    }
    /// Background counts file name
    pub fn bkgfile(&self) -> String {
        format!("bkg_obs{}.pkl", self.obs_id.file_tag())
    }
    /// Effective area file name
    pub fn arffile(&self) -> String {
        format!("arf_obs{}.pkl", self.obs_id.file_tag())
    }
    /// Energy dispersion file name
    pub fn rmffile(&self) -> String {
        format!("rmf_obs{}.pkl", self.obs_id.file_tag())
    }

    /// Returns the spectrum with its energy grid and thresholds expressed in `unit`
    pub fn to_energy_unit(&self, unit: EnergyUnit) -> Self {
        let (lo_threshold, hi_threshold) = self.thresholds_in(unit);
        Self {
            counts: self.counts.to_energy_unit(unit),
            lo_threshold,
            hi_threshold,
            ..self.clone()
        }
    }
}
