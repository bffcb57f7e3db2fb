//! On/Off counting statistics

use crate::pha::ObsId;
use serde::Serialize;
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error("cannot stack an empty list of statistics")]
    Empty,
}
type Result<T> = std::result::Result<T, StatsError>;

/// Li & Ma (1983) significance, eq. 17
///
/// Signed by the excess, 0 if undefined.
pub fn significance_on_off(n_on: f64, n_off: f64, alpha: f64) -> f64 {
    if !(alpha > 0f64) || !alpha.is_finite() || n_on + n_off <= 0f64 {
        return 0f64;
    }
    let n = n_on + n_off;
    let term = |k: f64, ratio: f64| if k > 0f64 { k * ratio.ln() } else { 0f64 };
    let ts = 2f64
        * (term(n_on, (1f64 + alpha) / alpha * n_on / n)
            + term(n_off, (1f64 + alpha) * n_off / n));
    (n_on - alpha * n_off).signum() * ts.max(0f64).sqrt()
}

/// Spectrum statistics of one or several energy bins
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumStats {
    pub energy_min: f64,
    pub energy_max: f64,
    pub n_on: f64,
    pub n_off: f64,
    /// on region backscal
    pub a_on: f64,
    /// off region backscal
    pub a_off: f64,
    pub obs_id: ObsId,
    /// [s]
    pub livetime: f64,
}
impl SpectrumStats {
    /// Exposure ratio between on and off regions
    pub fn alpha(&self) -> f64 {
        self.a_on / self.a_off
    }
    /// Background counts in the on region
    pub fn background(&self) -> f64 {
        self.alpha() * self.n_off
    }
    pub fn excess(&self) -> f64 {
        self.n_on - self.background()
    }
    pub fn excess_over_background(&self) -> f64 {
        self.excess() / self.background()
    }
    /// Excess rate [1/min]
    pub fn gamma_rate(&self) -> f64 {
        60f64 * self.excess() / self.livetime
    }
    /// Background rate [1/min]
    pub fn background_rate(&self) -> f64 {
        60f64 * self.background() / self.livetime
    }
    pub fn sigma(&self) -> f64 {
        significance_on_off(self.n_on, self.n_off, self.alpha())
    }
    /// Sums the counts and livetimes of a list of statistics
    ///
    /// The backscal values are averaged with the off counts as weights, or with the
    /// livetimes if there are no off counts at all.
    pub fn stack(stats_list: &[SpectrumStats]) -> Result<SpectrumStats> {
        let first = stats_list.first().ok_or(StatsError::Empty)?;
        let sum = |f: fn(&SpectrumStats) -> f64| stats_list.iter().map(f).sum::<f64>();
        let n_on = sum(|s| s.n_on);
        let n_off = sum(|s| s.n_off);
        let livetime = sum(|s| s.livetime);
        let (a_on, a_off) = if n_off > 0f64 {
            (
                sum(|s| s.a_on * s.n_off) / n_off,
                sum(|s| s.a_off * s.n_off) / n_off,
            )
        } else if livetime > 0f64 {
            (
                sum(|s| s.a_on * s.livetime) / livetime,
                sum(|s| s.a_off * s.livetime) / livetime,
            )
        } else {
            let n = stats_list.len() as f64;
            (sum(|s| s.a_on) / n, sum(|s| s.a_off) / n)
        };
        let energy_min = stats_list
            .iter()
            .map(|s| s.energy_min)
            .fold(f64::INFINITY, f64::min);
        let energy_max = stats_list
            .iter()
            .map(|s| s.energy_max)
            .fold(f64::NEG_INFINITY, f64::max);
        let obs_id = if stats_list.iter().all(|s| s.obs_id == first.obs_id) {
            first.obs_id.clone()
        } else {
            ObsId::union(stats_list.iter().map(|s| &s.obs_id))
        };
        Ok(SpectrumStats {
            energy_min,
            energy_max,
            n_on,
            n_off,
            a_on,
            a_off,
            obs_id,
            livetime,
        })
    }
    /// Flat record for tabular output
    pub fn to_row(&self) -> StatsRow {
        StatsRow {
            obs_id: self.obs_id.to_string(),
            energy_min: self.energy_min,
            energy_max: self.energy_max,
            livetime: self.livetime,
            n_on: self.n_on,
            n_off: self.n_off,
            a_on: self.a_on,
            a_off: self.a_off,
            alpha: self.alpha(),
            background: self.background(),
            excess: self.excess(),
            sigma: self.sigma(),
        }
    }
}
impl fmt::Display for SpectrumStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*** Observation summary report ***")?;
        writeln!(f, "Observation Id: {}", self.obs_id)?;
        writeln!(f, "Livetime: {:.3} h", self.livetime / 3600f64)?;
        writeln!(f, "On events: {}", self.n_on)?;
        writeln!(f, "Off events: {}", self.n_off)?;
        writeln!(f, "Alpha: {:.3}", self.alpha())?;
        writeln!(f, "Bkg events in On region: {:.2}", self.background())?;
        writeln!(f, "Excess: {:.2}", self.excess())?;
        writeln!(f, "Excess / Background: {:.2}", self.excess_over_background())?;
        writeln!(f, "Gamma rate: {:.2} 1 / min", self.gamma_rate())?;
        writeln!(f, "Bkg rate: {:.2} 1 / min", self.background_rate())?;
        writeln!(f, "Sigma: {:.2}", self.sigma())?;
        write!(
            f,
            "energy range: {:.2} - {:.2}",
            self.energy_min, self.energy_max
        )
    }
}

/// One row of a statistics table
#[derive(Debug, Serialize)]
pub struct StatsRow {
    pub obs_id: String,
    pub energy_min: f64,
    pub energy_max: f64,
    pub livetime: f64,
    pub n_on: f64,
    pub n_off: f64,
    pub a_on: f64,
    pub a_off: f64,
    pub alpha: f64,
    pub background: f64,
    pub excess: f64,
    pub sigma: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(n_on: f64, n_off: f64, a_on: f64, livetime: f64, obs_id: u32) -> SpectrumStats {
        SpectrumStats {
            energy_min: 1.,
            energy_max: 10.,
            n_on,
            n_off,
            a_on,
            a_off: 1.,
            obs_id: ObsId::Single(obs_id),
            livetime,
        }
    }

    #[test]
    fn derived() {
        let s = stats(279., 108., 0.037, 3164., 1);
        assert!((s.background() - 3.996).abs() < 1e-9);
        assert!((s.excess() - 275.004).abs() < 1e-9);
        assert!(s.sigma() > 30.);
        assert_eq!(stats(0., 0., 0.1, 1., 1).sigma(), 0.);
        assert!(stats(0., 100., 0.1, 1., 1).sigma() < 0.);
    }

    #[test]
    fn li_ma_reference() {
        let sigma = significance_on_off(498., 2411., 0.1764);
        assert!((sigma - 3.1506).abs() < 1e-3, "sigma: {}", sigma);
        let sigma = significance_on_off(279., 108., 0.037);
        assert!((sigma - 37.543).abs() < 1e-2, "sigma: {}", sigma);
    }

    #[test]
    fn stack_weighting() {
        let stacked = SpectrumStats::stack(&[
            stats(10., 5., 0.1, 100., 1),
            stats(30., 15., 0.3, 200., 2),
        ])
        .unwrap();
        assert_eq!(stacked.n_on, 40.);
        assert_eq!(stacked.n_off, 20.);
        assert_eq!(stacked.livetime, 300.);
        assert!((stacked.a_on - (0.1 * 5. + 0.3 * 15.) / 20.).abs() < 1e-12);
        assert_eq!(stacked.obs_id, ObsId::Stacked(vec![1, 2]));
    }

    #[test]
    fn stack_without_off_counts() {
        let stacked = SpectrumStats::stack(&[
            stats(10., 0., 0.1, 100., 1),
            stats(30., 0., 0.4, 300., 1),
        ])
        .unwrap();
        assert!((stacked.a_on - (0.1 * 100. + 0.4 * 300.) / 400.).abs() < 1e-12);
        assert_eq!(stacked.obs_id, ObsId::Single(1));
        assert!(SpectrumStats::stack(&[]).is_err());
    }
}
