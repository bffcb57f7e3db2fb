//! Stacking of spectral observations
//!
//! With `j` the observation, `k` a reconstructed and `l` a true energy bin, and
//! `e_jk` = 1 if bin `k` is in the safe range of observation `j`, 0 otherwise:
//!
//! * `n_on_k = sum_j n_on_jk e_jk`, `n_off_k = sum_j n_off_jk e_jk`
//! * `backscal_k = sum_j backscal_jk (n_off_jk e_jk / n_off_k)`, or -1 if `n_off_k = 0`
//! * `t = sum_j t_j`
//! * `aeff_l = sum_j aeff_jl (t_j / t)`
//! * `edisp_lk = sum_j edisp_jlk e_jk (aeff_jl t_j / sum_i aeff_il t_i)`
//!
//! The weights are normalized before being applied, so a single observation
//! stacks into itself exactly.
//! Every sum over the observations is computed on its terms sorted by value, so
//! the stacked arrays do not depend on the order of the observations.

use crate::{
    counts::SpectrumError,
    energy::EnergyBounds,
    irf::{EffectiveAreaTable, EnergyDispersion, IrfError},
    observation::{ObservationError, SpectrumObservation},
    observation_list::SpectrumObservationList,
    pha::{Backscal, ObsId, PhaCountsSpectrum},
};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::{fmt, time::Instant};

/// Stacked backscal of the energy bins without any off counts
pub const BACKSCAL_SENTINEL: f64 = -1f64;

#[derive(thiserror::Error, Debug)]
pub enum StackerError {
    #[error("cannot stack an empty list of observations")]
    EmptyObservationList,
    #[error("observation {obs_id}: the {which} energy grid differs from the first observation")]
    GridMismatch { obs_id: ObsId, which: &'static str },
    #[error("observation {0} has no off vector")]
    MissingOffVector(ObsId),
    #[error("observation {0} has no energy dispersion")]
    MissingEnergyDispersion(ObsId),
    #[error("the {0} stacking stage has not been run")]
    StageNotRun(&'static str),
    #[error("spectrum error")]
    Spectrum(#[from] SpectrumError),
    #[error("instrument response error")]
    Irf(#[from] IrfError),
    #[error("observation error")]
    Observation(#[from] ObservationError),
}
type Result<T> = std::result::Result<T, StackerError>;

/// Sum of the terms in increasing order
pub(crate) fn ordered_sum<I: IntoIterator<Item = f64>>(terms: I) -> f64 {
    let mut terms: Vec<f64> = terms.into_iter().collect();
    terms.sort_unstable_by(f64::total_cmp);
    terms.into_iter().sum()
}
/// Normalized weight `weight/total`, 0 if `total` is not positive
fn normalized(weight: f64, total: f64) -> f64 {
    if total > 0f64 {
        weight / total
    } else {
        0f64
    }
}
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0f64
    }
}

/// Stacks a [SpectrumObservationList] into a single [SpectrumObservation]
///
/// The observations are only read, the stacked arrays are new allocations.
pub struct SpectrumObservationStacker<'a> {
    obs_list: &'a SpectrumObservationList,
    stacked_on_vector: Option<PhaCountsSpectrum>,
    stacked_off_vector: Option<PhaCountsSpectrum>,
    stacked_bkscal_on: Option<Vec<f64>>,
    stacked_bkscal_off: Option<Vec<f64>>,
    stacked_aeff: Option<EffectiveAreaTable>,
    stacked_edisp: Option<EnergyDispersion>,
    stacked_obs: Option<SpectrumObservation>,
    validated: bool,
}
impl<'a> SpectrumObservationStacker<'a> {
    pub fn new(obs_list: &'a SpectrumObservationList) -> Self {
        Self {
            obs_list,
            stacked_on_vector: None,
            stacked_off_vector: None,
            stacked_bkscal_on: None,
            stacked_bkscal_off: None,
            stacked_aeff: None,
            stacked_edisp: None,
            stacked_obs: None,
            validated: false,
        }
    }
    /// Runs all the stages in order
    pub fn run(&mut self) -> Result<()> {
        let now = Instant::now();
        log::info!("Stacking {} observations...", self.obs_list.len());
        self.ensure_valid()?;
        self.stack_counts_vectors()?;
        self.stack_aeff()?;
        self.stack_edisp()?;
        self.stack_obs()?;
        log::info!("... stacked in {}ms", now.elapsed().as_millis());
        Ok(())
    }

    fn template(&self) -> Result<&'a SpectrumObservation> {
        self.obs_list
            .first()
            .ok_or(StackerError::EmptyObservationList)
    }
    fn off_vectors(&self) -> Result<Vec<&'a PhaCountsSpectrum>> {
        self.obs_list
            .iter()
            .map(|o| {
                o.off_vector()
                    .ok_or_else(|| StackerError::MissingOffVector(o.obs_id().clone()))
            })
            .collect()
    }
    fn edisps(&self) -> Result<Vec<&'a EnergyDispersion>> {
        self.obs_list
            .iter()
            .map(|o| {
                o.edisp()
                    .ok_or_else(|| StackerError::MissingEnergyDispersion(o.obs_id().clone()))
            })
            .collect()
    }
    /// Checks that every observation is complete and shares the energy grids of the first one
    pub fn validate(&self) -> Result<()> {
        let template = self.template()?;
        let (e_reco, e_true) = (template.e_reco(), template.e_true());
        for (obs, (off_vector, edisp)) in self
            .obs_list
            .iter()
            .zip(self.off_vectors()?.into_iter().zip(self.edisps()?))
        {
            let grids: [(&EnergyBounds, &EnergyBounds, &'static str); 5] = [
                (obs.e_reco(), e_reco, "on vector reco"),
                (off_vector.energy(), e_reco, "off vector reco"),
                (edisp.e_reco(), e_reco, "energy dispersion reco"),
                (obs.e_true(), e_true, "effective area true"),
                (edisp.e_true(), e_true, "energy dispersion true"),
            ];
            if let Some((_, _, which)) = grids
                .into_iter()
                .find(|(this, that, _)| !this.is_compatible(that))
            {
                return Err(StackerError::GridMismatch {
                    obs_id: obs.obs_id().clone(),
                    which,
                });
            }
        }
        Ok(())
    }
    /// Validates the observations once, the list cannot change while borrowed
    fn ensure_valid(&mut self) -> Result<()> {
        if !self.validated {
            self.validate()?;
            self.validated = true;
        }
        Ok(())
    }

    /// Stacks on and off vectors and their backscal
    pub fn stack_counts_vectors(&mut self) -> Result<()> {
        self.stack_on_vector()?;
        self.stack_off_vector()?;
        self.stack_backscal()?;
        self.setup_counts_vectors()
    }
    pub fn stack_on_vector(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let e_reco = self.template()?.e_reco();
        let on_vectors: Vec<_> = self.obs_list.iter().map(|o| o.on_vector()).collect();
        self.stacked_on_vector = Some(Self::stack_counts_spectrum(&on_vectors, e_reco)?);
        Ok(())
    }
    pub fn stack_off_vector(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let e_reco = self.template()?.e_reco();
        let off_vectors = self.off_vectors()?;
        self.stacked_off_vector = Some(Self::stack_counts_spectrum(&off_vectors, e_reco)?);
        Ok(())
    }
    /// Sums the counts in the safe range of each spectrum
    ///
    /// A bin is flagged bad if it is bad in any of the spectra.
    pub fn stack_counts_spectrum(
        spectra: &[&PhaCountsSpectrum],
        energy: &EnergyBounds,
    ) -> Result<PhaCountsSpectrum> {
        if let Some(spectrum) = spectra.iter().find(|s| !s.energy().is_compatible(energy)) {
            return Err(StackerError::GridMismatch {
                obs_id: spectrum.obs_id().clone(),
                which: "counts spectrum reco",
            });
        }
        let nbins = energy.nbins();
        let safe_counts: Vec<Vec<f64>> = spectra.iter().map(|s| s.counts_in_safe_range()).collect();
        let data: Vec<f64> = (0..nbins)
            .into_par_iter()
            .map(|k| ordered_sum(safe_counts.iter().map(|counts| counts[k])))
            .collect();
        let quality: Vec<bool> = (0..nbins)
            .into_par_iter()
            .map(|k| spectra.iter().any(|s| s.quality()[k]))
            .collect();
        Ok(PhaCountsSpectrum::new(data, energy.clone())?.with_quality(quality)?)
    }
    /// Off counts weighted backscal of on and off vectors
    pub fn stack_backscal(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let stacked_off = self
            .stacked_off_vector
            .as_ref()
            .ok_or(StackerError::StageNotRun("off vector"))?;
        let terms: Vec<_> = self
            .obs_list
            .iter()
            .zip(self.off_vectors()?)
            .map(|(o, off_vector)| {
                (
                    o.on_vector().backscal_array(),
                    off_vector.backscal_array(),
                    off_vector.counts_in_safe_range(),
                )
            })
            .collect();
        let (bkscal_on, bkscal_off): (Vec<f64>, Vec<f64>) = stacked_off
            .data()
            .par_iter()
            .enumerate()
            .map(|(k, &n_off)| {
                if n_off == 0f64 {
                    (BACKSCAL_SENTINEL, BACKSCAL_SENTINEL)
                } else {
                    let weights: Vec<f64> = terms
                        .iter()
                        .map(|(_, _, counts)| normalized(counts[k], n_off))
                        .collect();
                    (
                        ordered_sum(terms.iter().zip(&weights).map(|((on, _, _), w)| on[k] * w)),
                        ordered_sum(terms.iter().zip(&weights).map(|((_, off, _), w)| off[k] * w)),
                    )
                }
            })
            .unzip();
        let n_sentinel = bkscal_on.iter().filter(|&&b| b == BACKSCAL_SENTINEL).count();
        if n_sentinel > 0 {
            log::info!(
                "{} energy bins without off counts, backscal set to {}",
                n_sentinel,
                BACKSCAL_SENTINEL
            );
        }
        self.stacked_bkscal_on = Some(bkscal_on);
        self.stacked_bkscal_off = Some(bkscal_off);
        Ok(())
    }
    /// Sets livetime, backscal, observation ids and thresholds of the stacked counts vectors
    pub fn setup_counts_vectors(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let template = self.template()?;
        let unit = template.e_reco().unit();
        let total_livetime = self.obs_list.total_livetime();
        let obs_id = ObsId::union(self.obs_list.iter().map(|o| o.obs_id()));
        let (lo_threshold, hi_threshold) = self
            .obs_list
            .iter()
            .map(|o| o.on_vector().thresholds_in(unit))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (l, h)| {
                (lo.min(l), hi.max(h))
            });
        let bkscal_on = self
            .stacked_bkscal_on
            .clone()
            .ok_or(StackerError::StageNotRun("backscal"))?;
        let bkscal_off = self
            .stacked_bkscal_off
            .clone()
            .ok_or(StackerError::StageNotRun("backscal"))?;
        for (vector, bkscal, name) in [
            (self.stacked_on_vector.as_mut(), bkscal_on, "on vector"),
            (self.stacked_off_vector.as_mut(), bkscal_off, "off vector"),
        ] {
            let vector = vector.ok_or(StackerError::StageNotRun(name))?;
            vector.set_livetime(total_livetime);
            vector.set_backscal(Backscal::PerBin(bkscal))?;
            vector.set_obs_id(obs_id.clone());
            vector.set_lo_threshold(lo_threshold);
            vector.set_hi_threshold(hi_threshold);
        }
        Ok(())
    }
    /// Livetime weighted effective area, NaN counting as 0
    pub fn stack_aeff(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let template = self.template()?;
        let (e_true, unit) = (template.e_true(), template.aeff().unit());
        let total_livetime = self.obs_list.total_livetime();
        let weighted: Vec<(Vec<f64>, f64)> = self
            .obs_list
            .iter()
            .map(|o| {
                (
                    o.aeff()
                        .to_units(o.e_true().unit(), unit)
                        .evaluate_fill_nan(),
                    normalized(o.livetime(), total_livetime),
                )
            })
            .collect();
        let data: Vec<f64> = (0..e_true.nbins())
            .into_par_iter()
            .map(|l| finite_or_zero(ordered_sum(weighted.iter().map(|(aeff, w)| aeff[l] * w))))
            .collect();
        self.stacked_aeff = Some(EffectiveAreaTable::new(e_true.clone(), data, unit)?);
        Ok(())
    }
    /// Exposure weighted energy dispersion restricted to the safe range of each observation
    pub fn stack_edisp(&mut self) -> Result<()> {
        self.ensure_valid()?;
        let template = self.template()?;
        let (e_true, e_reco) = (template.e_true(), template.e_reco());
        let unit = template.aeff().unit();
        let (n_true, n_reco) = (e_true.nbins(), e_reco.nbins());
        let aefft: Vec<Vec<f64>> = self
            .obs_list
            .iter()
            .map(|o| {
                let t = o.livetime();
                o.aeff()
                    .to_units(o.e_true().unit(), unit)
                    .evaluate_fill_nan()
                    .into_iter()
                    .map(|a| a * t)
                    .collect()
            })
            .collect();
        let pdfs: Vec<DMatrix<f64>> = self
            .obs_list
            .iter()
            .zip(self.edisps()?)
            .map(|(o, edisp)| edisp.pdf_in_safe_range(&o.on_vector().safe_range_mask()))
            .collect::<std::result::Result<_, IrfError>>()?;
        let rows: Vec<Vec<f64>> = (0..n_true)
            .into_par_iter()
            .map(|l| {
                let norm = ordered_sum(aefft.iter().map(|a| a[l]));
                let weights: Vec<f64> = aefft.iter().map(|a| normalized(a[l], norm)).collect();
                (0..n_reco)
                    .map(|k| {
                        finite_or_zero(ordered_sum(
                            pdfs.iter().zip(&weights).map(|(pdf, w)| pdf[(l, k)] * w),
                        ))
                    })
                    .collect()
            })
            .collect();
        let data = DMatrix::from_fn(n_true, n_reco, |l, k| rows[l][k]);
        self.stacked_edisp = Some(EnergyDispersion::new(
            e_true.clone(),
            e_reco.clone(),
            data,
        )?);
        Ok(())
    }
    /// Assembles the stacked observation
    pub fn stack_obs(&mut self) -> Result<()> {
        let on_vector = self
            .stacked_on_vector
            .clone()
            .ok_or(StackerError::StageNotRun("on vector"))?;
        let off_vector = self
            .stacked_off_vector
            .clone()
            .ok_or(StackerError::StageNotRun("off vector"))?;
        let aeff = self
            .stacked_aeff
            .clone()
            .ok_or(StackerError::StageNotRun("effective area"))?;
        let edisp = self
            .stacked_edisp
            .clone()
            .ok_or(StackerError::StageNotRun("energy dispersion"))?;
        self.stacked_obs = Some(SpectrumObservation::new(
            on_vector,
            aeff,
            Some(off_vector),
            Some(edisp),
        )?);
        Ok(())
    }

    pub fn obs_list(&self) -> &SpectrumObservationList {
        self.obs_list
    }
    pub fn stacked_on_vector(&self) -> Option<&PhaCountsSpectrum> {
        self.stacked_on_vector.as_ref()
    }
    pub fn stacked_off_vector(&self) -> Option<&PhaCountsSpectrum> {
        self.stacked_off_vector.as_ref()
    }
    pub fn stacked_bkscal_on(&self) -> Option<&[f64]> {
        self.stacked_bkscal_on.as_deref()
    }
    pub fn stacked_bkscal_off(&self) -> Option<&[f64]> {
        self.stacked_bkscal_off.as_deref()
    }
    pub fn stacked_aeff(&self) -> Option<&EffectiveAreaTable> {
        self.stacked_aeff.as_ref()
    }
    pub fn stacked_edisp(&self) -> Option<&EnergyDispersion> {
        self.stacked_edisp.as_ref()
    }
    pub fn stacked_obs(&self) -> Option<&SpectrumObservation> {
        self.stacked_obs.as_ref()
    }
    /// Consumes the stacker, returning the stacked observation
    pub fn into_stacked_obs(self) -> Option<SpectrumObservation> {
        self.stacked_obs
    }
}
impl<'a> fmt::Display for SpectrumObservationStacker<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SpectrumObservationStacker")?;
        write!(f, "{}", self.obs_list)
    }
}
