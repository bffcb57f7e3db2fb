//! SVG rendering of spectral observations
//!
//! Energies are displayed as `log10(E)`.

use crate::{counts::CountsSpectrum, irf::EffectiveAreaTable, observation::SpectrumObservation};
use plotters::{coord::Shift, prelude::*};
use std::{error::Error, path::Path};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

/// Step line of a binned quantity
fn steps(lo: &[f64], hi: &[f64], values: &[f64]) -> Vec<(f64, f64)> {
    lo.iter()
        .zip(hi)
        .zip(values)
        .flat_map(|((&lo, &hi), &v)| [(lo.log10(), v), (hi.log10(), v)])
        .collect()
}

/// Plots counts spectra as histograms
///
/// The thresholds, if any, are in the energy unit of the first spectrum.
pub fn plot_counts<DB>(
    area: &DrawingArea<DB, Shift>,
    spectra: &[(&str, &CountsSpectrum)],
    thresholds: Option<(f64, f64)>,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (_, first) = spectra.first().ok_or("no spectrum to plot")?;
    let energy = first.energy();
    let unit = energy.unit();
    let ymax = spectra
        .iter()
        .flat_map(|(_, s)| s.data().iter().cloned())
        .fold(1f64, f64::max)
        * 1.1;
    let mut chart = ChartBuilder::on(area)
        .caption("Counts", ("sans-serif", 20))
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(10)
        .build_cartesian_2d(energy.min().log10()..energy.max().log10(), 0f64..ymax)?;
    chart
        .configure_mesh()
        .x_desc(format!("log10(E [{}])", unit))
        .y_desc("Counts")
        .draw()?;

    for ((label, spectrum), color) in spectra.iter().zip(colorous::TABLEAU10.iter().cycle()) {
        let rgb = RGBColor(color.r, color.g, color.b);
        let energy = spectrum.energy().to_unit(unit);
        chart
            .draw_series(LineSeries::new(
                steps(energy.lower_bounds(), energy.upper_bounds(), spectrum.data()),
                &rgb,
            ))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &rgb));
    }
    if let Some((lo, hi)) = thresholds {
        for e in [lo, hi] {
            chart.draw_series(LineSeries::new(
                [(e.log10(), 0f64), (e.log10(), ymax)],
                &BLACK.mix(0.5),
            ))?;
        }
    }
    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;
    Ok(())
}

/// Plots an effective area table
pub fn plot_effective_area<DB>(
    area: &DrawingArea<DB, Shift>,
    aeff: &EffectiveAreaTable,
    thresholds: Option<(f64, f64)>,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let energy = aeff.energy();
    let ymax = match aeff.max_area() {
        max if max > 0f64 => max * 1.1,
        _ => 1f64,
    };
    let mut chart = ChartBuilder::on(area)
        .caption("Effective area", ("sans-serif", 20))
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(10)
        .build_cartesian_2d(energy.min().log10()..energy.max().log10(), 0f64..ymax)?;
    chart
        .configure_mesh()
        .x_desc(format!("log10(E [{}])", energy.unit()))
        .y_desc(format!("Effective area [{}]", aeff.unit()))
        .draw()?;
    let color = colorous::TABLEAU10[0];
    chart.draw_series(LineSeries::new(
        steps(
            energy.lower_bounds(),
            energy.upper_bounds(),
            &aeff.evaluate_fill_nan(),
        ),
        &RGBColor(color.r, color.g, color.b),
    ))?;
    if let Some((lo, hi)) = thresholds {
        for e in [lo, hi] {
            chart.draw_series(LineSeries::new(
                [(e.log10(), 0f64), (e.log10(), ymax)],
                &BLACK.mix(0.5),
            ))?;
        }
    }
    Ok(())
}

impl SpectrumObservation {
    /// Quick-look SVG with the counts on the left and the effective area on the right
    pub fn peek<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let root = SVGBackend::new(path, (1024, 512)).into_drawing_area();
        root.fill(&WHITE)?;
        let (left, right) = root.split_horizontally(512);

        let background = self.background_vector().ok();
        let mut spectra = vec![("on", self.on_vector().counts())];
        if let Some(background) = &background {
            spectra.push(("background", background));
        }
        plot_counts(
            &left,
            &spectra,
            Some((self.lo_threshold(), self.hi_threshold())),
        )?;
        plot_effective_area(
            &right,
            self.aeff(),
            Some(self.on_vector().thresholds_in(self.e_true().unit())),
        )?;
        root.present()?;
        log::info!("Observation {} peek written to {:?}", self.obs_id(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::tests::observation;

    #[test]
    fn peek() -> std::result::Result<(), Box<dyn Error>> {
        let obs = observation(11, vec![10., 20., 30.], vec![5., 7., 9.], 0.1, 100.);
        let path = std::env::temp_dir().join(format!("gamma-spectrum-peek-{}.svg", std::process::id()));
        obs.peek(&path)?;
        let svg = std::fs::read_to_string(&path)?;
        assert!(svg.contains("<svg"));
        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn step_line() {
        let points = steps(&[1., 10.], &[10., 100.], &[3., 4.]);
        let expected = [(0., 3.), (1., 3.), (1., 4.), (2., 4.)];
        assert_eq!(points.len(), expected.len());
        points
            .iter()
            .zip(expected)
            .for_each(|(&(x, y), (ex, ey))| assert!((x - ex).abs() < 1e-12 && y == ey));
    }
}
