use super::IrfError;
use crate::energy::{le_rtol, EnergyBounds, EnergyUnit};
use nalgebra::{DMatrix, DVector};

type Result<T> = std::result::Result<T, IrfError>;

/// Energy dispersion
///
/// Probability for an event of a given true energy bin (row) to be reconstructed
/// in a given reco energy bin (column).
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyDispersion {
    e_true: EnergyBounds,
    e_reco: EnergyBounds,
    data: DMatrix<f64>,
}
impl EnergyDispersion {
    pub fn new(e_true: EnergyBounds, e_reco: EnergyBounds, data: DMatrix<f64>) -> Result<Self> {
        let expected = (e_true.nbins(), e_reco.nbins());
        if data.shape() != expected {
            return Err(IrfError::EdispShape {
                found: data.shape(),
                expected,
            });
        }
        Ok(Self {
            e_true,
            e_reco,
            data,
        })
    }
    /// Perfect energy resolution
    ///
    /// Each true energy bin is entirely redistributed into the reco bin
    /// holding its log center.
    pub fn from_diagonal_response(e_true: EnergyBounds, e_reco: EnergyBounds) -> Self {
        let reco = e_reco.to_unit(e_true.unit());
        let mut data = DMatrix::<f64>::zeros(e_true.nbins(), e_reco.nbins());
        e_true
            .log_centers()
            .into_iter()
            .enumerate()
            .filter_map(|(i, e)| reco.find_bin(e).map(|j| (i, j)))
            .for_each(|(i, j)| data[(i, j)] = 1f64);
        Self {
            e_true,
            e_reco,
            data,
        }
    }
    pub fn e_true(&self) -> &EnergyBounds {
        &self.e_true
    }
    pub fn e_reco(&self) -> &EnergyBounds {
        &self.e_reco
    }
    /// The probability matrix (true x reco)
    pub fn pdf_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }
    /// Probability matrix with the reco energy bins flagged `false` set to 0
    pub fn pdf_in_safe_range(&self, safe: &[bool]) -> Result<DMatrix<f64>> {
        if safe.len() != self.e_reco.nbins() {
            return Err(IrfError::MaskShape {
                found: safe.len(),
                expected: self.e_reco.nbins(),
            });
        }
        Ok(self.masked(safe))
    }
    /// Probability matrix with the reco energy bins not fully inside `[lo,hi]` set to 0
    pub fn pdf_in_energy_range(&self, lo: f64, hi: f64) -> DMatrix<f64> {
        let safe: Vec<_> = self
            .e_reco
            .lower_bounds()
            .iter()
            .zip(self.e_reco.upper_bounds())
            .map(|(&e_lo, &e_hi)| le_rtol(lo, e_lo) && le_rtol(e_hi, hi))
            .collect();
        self.masked(&safe)
    }
    fn masked(&self, safe: &[bool]) -> DMatrix<f64> {
        let mut data = self.data.clone();
        safe.iter()
            .enumerate()
            .filter(|(_, safe)| !**safe)
            .for_each(|(j, _)| data.column_mut(j).fill(0f64));
        data
    }
    /// Redistributes a true energy vector into reco energy bins
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.e_true.nbins() {
            return Err(IrfError::FoldShape {
                found: values.len(),
                expected: self.e_true.nbins(),
            });
        }
        let v = DVector::from_column_slice(values);
        Ok(self.data.tr_mul(&v).iter().cloned().collect())
    }
    /// Returns the dispersion with both energy axis expressed in `unit`
    pub fn to_energy_unit(&self, unit: EnergyUnit) -> Self {
        Self {
            e_true: self.e_true.to_unit(unit),
            e_reco: self.e_reco.to_unit(unit),
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grids() -> (EnergyBounds, EnergyBounds) {
        (
            EnergyBounds::new(vec![1., 2., 4., 8.], EnergyUnit::TeV).unwrap(),
            EnergyBounds::new(vec![1., 4., 8.], EnergyUnit::TeV).unwrap(),
        )
    }

    #[test]
    fn diagonal() {
        let (e_true, e_reco) = grids();
        let edisp = EnergyDispersion::from_diagonal_response(e_true, e_reco);
        let expected = DMatrix::from_row_slice(3, 2, &[1., 0., 1., 0., 0., 1.]);
        assert_eq!(edisp.pdf_matrix(), &expected);
        assert_eq!(edisp.apply(&[1., 2., 3.]).unwrap(), vec![3., 3.]);
        assert!(edisp.apply(&[1., 2.]).is_err());
    }

    #[test]
    fn safe_range() {
        let (e_true, e_reco) = grids();
        let edisp = EnergyDispersion::from_diagonal_response(e_true, e_reco);
        let pdf = edisp.pdf_in_safe_range(&[false, true]).unwrap();
        assert_eq!(pdf.column(0).sum(), 0.);
        assert_eq!(pdf.column(1).sum(), 1.);
        assert_eq!(edisp.pdf_in_energy_range(1., 5.), edisp.pdf_in_safe_range(&[true, false]).unwrap());
        assert!(edisp.pdf_in_safe_range(&[true]).is_err());
    }

    #[test]
    fn shape() {
        let (e_true, e_reco) = grids();
        assert!(matches!(
            EnergyDispersion::new(e_true, e_reco, DMatrix::zeros(2, 3)),
            Err(IrfError::EdispShape {
                found: (2, 3),
                expected: (3, 2)
            })
        ));
    }
}
