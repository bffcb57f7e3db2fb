//! Spectral models
//!
//! Differential fluxes are in cm^-2 s^-1 TeV^-1 for energies in TeV.

/// Number of log-spaced steps of the default flux integration
const INTEGRAL_STEPS: usize = 100;

/// Differential flux model
pub trait SpectralModel {
    /// Differential flux at `energy` [TeV]
    fn evaluate(&self, energy: f64) -> f64;
    /// Integral flux between `emin` and `emax` [TeV]
    ///
    /// Trapezoidal rule in log energy
    fn integral(&self, emin: f64, emax: f64) -> f64 {
        let (log_min, log_max) = (emin.ln(), emax.ln());
        let step = (log_max - log_min) / INTEGRAL_STEPS as f64;
        let f = |i: usize| {
            let e = (log_min + step * i as f64).exp();
            self.evaluate(e) * e
        };
        let inner: f64 = (1..INTEGRAL_STEPS).map(f).sum();
        step * (0.5 * (f(0) + f(INTEGRAL_STEPS)) + inner)
    }
}
impl<F> SpectralModel for F
where
    F: Fn(f64) -> f64,
{
    fn evaluate(&self, energy: f64) -> f64 {
        self(energy)
    }
}

/// Power law: `amplitude * (energy / reference)^-index`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLaw {
    pub index: f64,
    /// [cm^-2 s^-1 TeV^-1]
    pub amplitude: f64,
    /// [TeV]
    pub reference: f64,
}
impl Default for PowerLaw {
    fn default() -> Self {
        Self {
            index: 2f64,
            amplitude: 1e-11,
            reference: 1f64,
        }
    }
}
impl SpectralModel for PowerLaw {
    fn evaluate(&self, energy: f64) -> f64 {
        self.amplitude * (energy / self.reference).powf(-self.index)
    }
    fn integral(&self, emin: f64, emax: f64) -> f64 {
        if (self.index - 1f64).abs() < 1e-12 {
            self.amplitude * self.reference * (emax / emin).ln()
        } else {
            let p = 1f64 - self.index;
            self.amplitude * self.reference / p
                * ((emax / self.reference).powf(p) - (emin / self.reference).powf(p))
        }
    }
}
