//! 1D spectral observation
//!
//! The ingredients of a region based spectral analysis: the on vector, the
//! optional off vector, the effective area and the optional energy dispersion.
//! The meta data are held by the on vector, following the OGIP convention.

use crate::{
    counts::{CountsSpectrum, SpectrumError},
    energy::{AreaUnit, EnergyBounds, EnergyUnit},
    irf::{EffectiveAreaTable, EnergyDispersion, IrfError},
    models::SpectralModel,
    pha::{ObsId, PhaCountsSpectrum},
    stacker::BACKSCAL_SENTINEL,
    stats::{SpectrumStats, StatsError},
};
use std::{fmt, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ObservationError {
    #[error("observation {0} has no off vector")]
    NoOffVector(ObsId),
    #[error("energy bin #{idx} is out of range ({nbins} bins)")]
    BinOutOfRange { idx: usize, nbins: usize },
    #[error("the {0} energy grid does not match")]
    Binning(&'static str),
    #[error("invalid backscal in bin #{idx}: on={a_on}, off={a_off}")]
    InvalidBackscal { idx: usize, a_on: f64, a_off: f64 },
    #[error("energy bin #{0} has no stacked off counts")]
    NoStackedOffCounts(usize),
    #[error("observation {0} has no energy bin in its safe range")]
    EmptySafeRange(ObsId),
    #[error("no valid statistics in bins #{0} to #{1}")]
    EmptyRange(usize, usize),
    #[error("true and reco energy grids differ and there is no energy dispersion")]
    NoEnergyDispersion,
    #[error("spectrum error")]
    Spectrum(#[from] SpectrumError),
    #[error("instrument response error")]
    Irf(#[from] IrfError),
    #[error("statistics error")]
    Stats(#[from] StatsError),
    #[error("failed to write the statistics table")]
    Csv(#[from] csv::Error),
}
type Result<T> = std::result::Result<T, ObservationError>;

/// 1D spectral analysis storage
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumObservation {
    on_vector: PhaCountsSpectrum,
    aeff: EffectiveAreaTable,
    off_vector: Option<PhaCountsSpectrum>,
    edisp: Option<EnergyDispersion>,
}
impl SpectrumObservation {
    /// Creates a new observation after checking the compatibility of the energy grids
    ///
    /// The off vector takes the observation id and thresholds of the on vector.
    pub fn new(
        on_vector: PhaCountsSpectrum,
        aeff: EffectiveAreaTable,
        off_vector: Option<PhaCountsSpectrum>,
        edisp: Option<EnergyDispersion>,
    ) -> Result<Self> {
        let mut this = Self {
            on_vector,
            aeff,
            off_vector,
            edisp,
        };
        this.check_binning()?;
        this.sync_off_vector();
        Ok(this)
    }
    /// Checks that the off vector, effective area and energy dispersion binnings are compatible
    pub fn check_binning(&self) -> Result<()> {
        if let Some(off_vector) = &self.off_vector {
            if !off_vector.energy().is_compatible(self.on_vector.energy()) {
                return Err(ObservationError::Binning("off vector"));
            }
        }
        if let Some(edisp) = &self.edisp {
            if !edisp.e_reco().is_compatible(self.on_vector.energy()) {
                return Err(ObservationError::Binning("energy dispersion reco"));
            }
            if !edisp.e_true().is_compatible(self.aeff.energy()) {
                return Err(ObservationError::Binning("energy dispersion true"));
            }
        }
        Ok(())
    }
    fn sync_off_vector(&mut self) {
        let obs_id = self.on_vector.obs_id().clone();
        let on_unit = self.on_vector.energy().unit();
        let (lo, hi) = (self.on_vector.lo_threshold(), self.on_vector.hi_threshold());
        if let Some(off_vector) = self.off_vector.as_mut() {
            let off_unit = off_vector.energy().unit();
            off_vector.set_obs_id(obs_id);
            off_vector.set_lo_threshold(on_unit.convert(lo, off_unit));
            off_vector.set_hi_threshold(on_unit.convert(hi, off_unit));
        }
    }

    pub fn on_vector(&self) -> &PhaCountsSpectrum {
        &self.on_vector
    }
    pub fn off_vector(&self) -> Option<&PhaCountsSpectrum> {
        self.off_vector.as_ref()
    }
    pub fn aeff(&self) -> &EffectiveAreaTable {
        &self.aeff
    }
    pub fn edisp(&self) -> Option<&EnergyDispersion> {
        self.edisp.as_ref()
    }
    /// Unique identifier
    pub fn obs_id(&self) -> &ObsId {
        self.on_vector.obs_id()
    }
    /// Sets the observation id of both on and off vectors
    pub fn set_obs_id<I: Into<ObsId>>(&mut self, obs_id: I) {
        self.on_vector.set_obs_id(obs_id);
        self.sync_off_vector();
    }
    /// Dead-time corrected observation time [s]
    pub fn livetime(&self) -> f64 {
        self.on_vector.livetime()
    }
    /// Reconstructed energy bins
    pub fn e_reco(&self) -> &EnergyBounds {
        self.on_vector.energy()
    }
    /// True energy bins
    pub fn e_true(&self) -> &EnergyBounds {
        self.aeff.energy()
    }
    /// Number of reconstructed energy bins
    pub fn nbins(&self) -> usize {
        self.on_vector.nbins()
    }
    /// Low energy threshold
    pub fn lo_threshold(&self) -> f64 {
        self.on_vector.lo_threshold()
    }
    /// Sets the low energy threshold of both on and off vectors
    pub fn set_lo_threshold(&mut self, threshold: f64) {
        self.on_vector.set_lo_threshold(threshold);
        self.sync_off_vector();
    }
    /// High energy threshold
    pub fn hi_threshold(&self) -> f64 {
        self.on_vector.hi_threshold()
    }
    /// Sets the high energy threshold of both on and off vectors
    pub fn set_hi_threshold(&mut self, threshold: f64) {
        self.on_vector.set_hi_threshold(threshold);
        self.sync_off_vector();
    }
    /// Sets both energy thresholds of on and off vectors
    pub fn set_thresholds(&mut self, lo_threshold: f64, hi_threshold: f64) {
        self.on_vector.set_lo_threshold(lo_threshold);
        self.on_vector.set_hi_threshold(hi_threshold);
        self.sync_off_vector();
    }

    fn off_vector_or_err(&self) -> Result<&PhaCountsSpectrum> {
        self.off_vector
            .as_ref()
            .ok_or_else(|| ObservationError::NoOffVector(self.obs_id().clone()))
    }
    /// Exposure ratio between signal and background regions, per bin
    pub fn alpha(&self) -> Result<Vec<f64>> {
        let off_vector = self.off_vector_or_err()?;
        Ok(self
            .on_vector
            .backscal_array()
            .into_iter()
            .zip(off_vector.backscal_array())
            .map(|(a_on, a_off)| a_on / a_off)
            .collect())
    }
    /// Background counts in the on region: `alpha * n_off`
    pub fn background_vector(&self) -> Result<CountsSpectrum> {
        let off_vector = self.off_vector_or_err()?;
        let data = off_vector
            .data()
            .iter()
            .zip(self.alpha()?)
            .map(|(n_off, alpha)| n_off * alpha)
            .collect();
        Ok(CountsSpectrum::new(data, off_vector.energy().clone())?)
    }

    /// Statistics of one energy bin
    pub fn stats(&self, idx: usize) -> Result<SpectrumStats> {
        let off_vector = self.off_vector_or_err()?;
        let (energy_min, energy_max) =
            self.e_reco()
                .bin(idx)
                .ok_or(ObservationError::BinOutOfRange {
                    idx,
                    nbins: self.nbins(),
                })?;
        let a_on = self.on_vector.backscal_array()[idx];
        let a_off = off_vector.backscal_array()[idx];
        if a_on == BACKSCAL_SENTINEL || a_off == BACKSCAL_SENTINEL {
            return Err(ObservationError::NoStackedOffCounts(idx));
        }
        if !a_on.is_finite() || !a_off.is_finite() || a_off == 0f64 {
            return Err(ObservationError::InvalidBackscal { idx, a_on, a_off });
        }
        Ok(SpectrumStats {
            energy_min,
            energy_max,
            n_on: self.on_vector.data()[idx],
            n_off: off_vector.data()[idx],
            a_on,
            a_off,
            obs_id: self.obs_id().clone(),
            livetime: self.livetime(),
        })
    }
    /// Stacked statistics of the energy bins from `bin_min` to `bin_max` included
    ///
    /// A bin which statistics cannot be computed is reported and left out.
    pub fn stats_in_range(&self, bin_min: usize, bin_max: usize) -> Result<SpectrumStats> {
        self.off_vector_or_err()?;
        let (energy_min, _) = self
            .e_reco()
            .bin(bin_min)
            .ok_or(ObservationError::BinOutOfRange {
                idx: bin_min,
                nbins: self.nbins(),
            })?;
        let (_, energy_max) = self
            .e_reco()
            .bin(bin_max)
            .ok_or(ObservationError::BinOutOfRange {
                idx: bin_max,
                nbins: self.nbins(),
            })?;
        let stats_list: Vec<_> = (bin_min..=bin_max)
            .filter_map(|idx| match self.stats(idx) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    log::warn!("Observation {}, bin #{}: {}", self.obs_id(), idx, e);
                    None
                }
            })
            .collect();
        if stats_list.is_empty() {
            return Err(ObservationError::EmptyRange(bin_min, bin_max));
        }
        let mut stacked_stats = SpectrumStats::stack(&stats_list)?;
        stacked_stats.livetime = self.livetime();
        stacked_stats.obs_id = self.obs_id().clone();
        stacked_stats.energy_min = energy_min;
        stacked_stats.energy_max = energy_max;
        Ok(stacked_stats)
    }
    /// Statistics over all the energy bins
    pub fn total_stats(&self) -> Result<SpectrumStats> {
        self.stats_in_range(0, self.nbins() - 1)
    }
    /// Statistics over the energy bins within the thresholds
    pub fn total_stats_safe_range(&self) -> Result<SpectrumStats> {
        let safe_bins = self.on_vector.bins_in_safe_range();
        match (safe_bins.first(), safe_bins.last()) {
            (Some(&first), Some(&last)) => self.stats_in_range(first, last),
            _ => Err(ObservationError::EmptySafeRange(self.obs_id().clone())),
        }
    }
    /// Statistics of each energy bin, the invalid bins are reported and left out
    pub fn stats_table(&self) -> Result<Vec<SpectrumStats>> {
        self.off_vector_or_err()?;
        Ok((0..self.nbins())
            .filter_map(|idx| match self.stats(idx) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    log::warn!("Observation {}, bin #{}: {}", self.obs_id(), idx, e);
                    None
                }
            })
            .collect())
    }
    /// Writes the statistics of each energy bin to a CSV file
    pub fn write_stats_table<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for stats in self.stats_table()? {
            wtr.serialize(stats.to_row())?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Predicted counts of a spectral model
    ///
    /// The model is integrated over each true energy bin, multiplied by the
    /// effective area and the livetime, and folded with the energy dispersion.
    pub fn predicted_counts<M: SpectralModel + ?Sized>(&self, model: &M) -> Result<CountsSpectrum> {
        let aeff = self.aeff.to_units(EnergyUnit::TeV, AreaUnit::SquareCentimeter);
        let livetime = self.livetime();
        let true_counts: Vec<f64> = aeff
            .energy()
            .lower_bounds()
            .iter()
            .zip(aeff.energy().upper_bounds())
            .zip(aeff.evaluate_fill_nan())
            .map(|((&lo, &hi), area)| model.integral(lo, hi) * area * livetime)
            .collect();
        let reco_counts = match &self.edisp {
            Some(edisp) => edisp.apply(&true_counts)?,
            None if self.e_true().is_compatible(self.e_reco()) => true_counts,
            None => return Err(ObservationError::NoEnergyDispersion),
        };
        Ok(CountsSpectrum::new(reco_counts, self.e_reco().clone())?)
    }
}
impl fmt::Display for SpectrumObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total_stats_safe_range() {
            Ok(stats) => write!(f, "{}", stats),
            Err(e) => write!(f, "Observation {}: {}", self.obs_id(), e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{models::PowerLaw, pha::Backscal};

    pub fn e_reco() -> EnergyBounds {
        EnergyBounds::new(vec![1., 2., 4., 8.], EnergyUnit::TeV).unwrap()
    }
    pub fn e_true() -> EnergyBounds {
        EnergyBounds::new(vec![0.5, 1., 2., 4., 8., 16.], EnergyUnit::TeV).unwrap()
    }
    /// Builds an observation with a diagonal energy dispersion
    pub fn observation(
        obs_id: u32,
        on: Vec<f64>,
        off: Vec<f64>,
        backscal_on: f64,
        livetime: f64,
    ) -> SpectrumObservation {
        let on_vector = PhaCountsSpectrum::new(on, e_reco())
            .unwrap()
            .with_obs_id(obs_id)
            .with_livetime(livetime)
            .with_backscal(Backscal::Scalar(backscal_on))
            .unwrap();
        let off_vector = PhaCountsSpectrum::new(off, e_reco())
            .unwrap()
            .with_livetime(livetime);
        let aeff = EffectiveAreaTable::new(
            e_true(),
            vec![1e4, 2e4, 4e4, 4e4, 4e4],
            AreaUnit::SquareMeter,
        )
        .unwrap();
        let edisp = EnergyDispersion::from_diagonal_response(e_true(), e_reco());
        SpectrumObservation::new(on_vector, aeff, Some(off_vector), Some(edisp)).unwrap()
    }

    #[test]
    fn synchronized_meta_data() {
        let mut obs = observation(23523, vec![10., 20., 30.], vec![5., 5., 5.], 0.1, 100.);
        assert_eq!(obs.off_vector().unwrap().obs_id(), &ObsId::Single(23523));
        obs.set_thresholds(2., 8.);
        obs.set_obs_id(42);
        let off = obs.off_vector().unwrap();
        assert_eq!(off.obs_id(), &ObsId::Single(42));
        assert_eq!((off.lo_threshold(), off.hi_threshold()), (2., 8.));
        assert_eq!(off.bins_in_safe_range(), vec![1, 2]);
    }

    #[test]
    fn alpha_and_background() {
        let obs = observation(1, vec![10., 20., 30.], vec![5., 10., 20.], 0.1, 100.);
        assert_eq!(obs.alpha().unwrap(), vec![0.1; 3]);
        let bkg = obs.background_vector().unwrap();
        assert!((bkg.data()[2] - 2.).abs() < 1e-12);
    }

    #[test]
    fn stats() {
        let mut obs = observation(1, vec![10., 20., 30.], vec![5., 10., 20.], 0.1, 100.);
        let s = obs.stats(1).unwrap();
        assert_eq!((s.n_on, s.n_off, s.energy_min, s.energy_max), (20., 10., 2., 4.));
        assert!(matches!(
            obs.stats(3),
            Err(ObservationError::BinOutOfRange { idx: 3, nbins: 3 })
        ));
        let total = obs.total_stats().unwrap();
        assert_eq!((total.n_on, total.n_off, total.livetime), (60., 35., 100.));
        assert_eq!((total.energy_min, total.energy_max), (1., 8.));
        obs.set_thresholds(2., 8.);
        let safe = obs.total_stats_safe_range().unwrap();
        assert_eq!((safe.n_on, safe.energy_min), (50., 2.));
        assert_eq!(obs.stats_table().unwrap().len(), 3);
    }

    #[test]
    fn invalid_bin_is_skipped() {
        let obs = observation(1, vec![10., 20., 30.], vec![5., 10., 20.], 0.1, 100.);
        let on_vector = obs
            .on_vector()
            .clone()
            .with_backscal(Backscal::PerBin(vec![0.1, f64::NAN, 0.1]))
            .unwrap();
        let obs = SpectrumObservation::new(
            on_vector,
            obs.aeff().clone(),
            obs.off_vector().cloned(),
            obs.edisp().cloned(),
        )
        .unwrap();
        assert!(matches!(
            obs.stats(1),
            Err(ObservationError::InvalidBackscal { idx: 1, .. })
        ));
        let total = obs.total_stats().unwrap();
        assert_eq!((total.n_on, total.n_off), (40., 25.));
        assert_eq!(obs.stats_table().unwrap().len(), 2);
    }

    #[test]
    fn stacked_bin_without_off_counts() {
        let a = observation(1, vec![10., 20., 30.], vec![0., 10., 20.], 0.1, 100.);
        let b = observation(2, vec![1., 2., 3.], vec![0., 4., 5.], 0.1, 50.);
        let stacked = crate::SpectrumObservationList::from(vec![a, b])
            .stack()
            .unwrap();
        assert_eq!(stacked.on_vector().backscal_array()[0], BACKSCAL_SENTINEL);
        assert!(matches!(
            stacked.stats(0),
            Err(ObservationError::NoStackedOffCounts(0))
        ));
        let table = stacked.stats_table().unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|s| s.alpha() > 0.));
        let total = stacked.total_stats().unwrap();
        assert_eq!((total.n_on, total.n_off), (55., 39.));
    }

    #[test]
    fn missing_off_vector() {
        let obs = observation(7, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 10.);
        let no_off =
            SpectrumObservation::new(obs.on_vector().clone(), obs.aeff().clone(), None, None)
                .unwrap();
        assert!(matches!(no_off.alpha(), Err(ObservationError::NoOffVector(_))));
        assert!(no_off.total_stats().is_err());
        assert!(no_off.to_string().contains("no off vector"));
    }

    #[test]
    fn binning_check() {
        let obs = observation(7, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 10.);
        let off = PhaCountsSpectrum::new(
            vec![1., 1.],
            EnergyBounds::new(vec![1., 2., 8.], EnergyUnit::TeV).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            SpectrumObservation::new(obs.on_vector().clone(), obs.aeff().clone(), Some(off), None),
            Err(ObservationError::Binning("off vector"))
        ));
    }

    #[test]
    fn deep_copy() {
        let obs = observation(7, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 10.);
        let mut copy = obs.clone();
        copy.set_lo_threshold(4.);
        assert_eq!(obs.lo_threshold(), 1.);
        assert_eq!(copy, {
            let mut other = obs.clone();
            other.set_lo_threshold(4.);
            other
        });
    }

    #[test]
    fn predicted_counts() {
        let obs = observation(7, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 100.);
        let pl = PowerLaw::default();
        let npred = obs.predicted_counts(&pl).unwrap();
        // reco bin 0 collects the true bin [1,2] only: 1e-11 * 0.5 * 2e8 cm2 * 100 s
        assert!((npred.data()[0] - 0.1).abs() < 1e-12);
        // no energy dispersion and identical grids
        let identity = SpectrumObservation::new(
            obs.on_vector().clone(),
            EffectiveAreaTable::new(e_reco(), vec![1., 1., 1.], AreaUnit::SquareMeter).unwrap(),
            None,
            None,
        )
        .unwrap();
        let npred = identity.predicted_counts(&pl).unwrap();
        assert!((npred.data()[0] - 1e-11 * 0.5 * 1e4 * 100.).abs() < 1e-15);
        let mismatch =
            SpectrumObservation::new(obs.on_vector().clone(), obs.aeff().clone(), None, None)
                .unwrap();
        assert!(matches!(
            mismatch.predicted_counts(&pl),
            Err(ObservationError::NoEnergyDispersion)
        ));
    }
}
