//! OGIP spectral file family
//!
//! An observation is saved as four files named after its id:
//!  * `pha_obs{id}.pkl`: the on counts,
//!  * `bkg_obs{id}.pkl`: the off counts,
//!  * `arf_obs{id}.pkl`: the effective area,
//!  * `rmf_obs{id}.pkl`: the energy dispersion.
//!
//! The header of the PHA file links the three other files.
//! Each file is a pickled header and table pair.

use crate::{
    counts::SpectrumError,
    energy::{AreaUnit, EnergyBounds, EnergyError, EnergyUnit},
    irf::{EffectiveAreaTable, EnergyDispersion, IrfError},
    observation::{ObservationError, SpectrumObservation},
    pha::{Backscal, ObsId, PhaCountsSpectrum},
};
use nalgebra::DMatrix;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    time::Instant,
};

/// HDUCLAS of a source spectrum
pub const HDUCLAS_SOURCE: &str = "TOTAL";
/// HDUCLAS of a background spectrum
pub const HDUCLAS_BACKGROUND: &str = "BKG";

#[derive(thiserror::Error, Debug)]
pub enum OgipError {
    #[error("cannot access {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("pickle encoding failed")]
    Pickle(#[from] serde_pickle::Error),
    #[error("{0:?} already exists")]
    FileExists(PathBuf),
    #[error("{path:?} is a {found} spectrum, expected {expected}")]
    HduClass {
        path: PathBuf,
        found: String,
        expected: &'static str,
    },
    #[error("{0:?} does not link an effective area file")]
    MissingArf(PathBuf),
    #[error("invalid unit")]
    Unit(#[from] strum::ParseError),
    #[error("energy grid error")]
    Energy(#[from] EnergyError),
    #[error("spectrum error")]
    Spectrum(#[from] SpectrumError),
    #[error("instrument response error")]
    Irf(#[from] IrfError),
    #[error("observation error")]
    Observation(#[from] ObservationError),
}
type Result<T> = std::result::Result<T, OgipError>;

/// Units written to the files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitConvention {
    /// The units of the in-memory objects
    #[default]
    Native,
    /// keV and cm2
    Sherpa,
}
impl UnitConvention {
    fn energy_unit(&self, native: EnergyUnit) -> EnergyUnit {
        match self {
            UnitConvention::Native => native,
            UnitConvention::Sherpa => EnergyUnit::KeV,
        }
    }
    fn area_unit(&self, native: AreaUnit) -> AreaUnit {
        match self {
            UnitConvention::Native => native,
            UnitConvention::Sherpa => AreaUnit::SquareCentimeter,
        }
    }
}

/// Writing options of the OGIP files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    convention: UnitConvention,
    overwrite: bool,
}
impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            convention: UnitConvention::Native,
            overwrite: true,
        }
    }
}
impl WriteOptions {
    pub fn convention(self, convention: UnitConvention) -> Self {
        Self { convention, ..self }
    }
    pub fn overwrite(self, overwrite: bool) -> Self {
        Self { overwrite, ..self }
    }
}

/// Writes `value` into `path`, failing if `path` exists and `overwrite` is false
fn write_pickle<T: Serialize>(value: &T, path: &Path, overwrite: bool) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .create_new(!overwrite)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => OgipError::FileExists(path.to_path_buf()),
            _ => OgipError::Io(e, path.to_path_buf()),
        })?;
    serde_pickle::to_writer(&mut file, value, Default::default())?;
    Ok(())
}
fn read_pickle<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut file = File::open(path).map_err(|e| OgipError::Io(e, path.to_path_buf()))?;
    Ok(serde_pickle::from_reader(&mut file, Default::default())?)
}
/// Bin edges from lower and upper bounds
fn edges(lo: &[f64], hi: &[f64]) -> Vec<f64> {
    lo.iter().chain(hi.last()).cloned().collect()
}

/// PHA header keywords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaHeader {
    pub hduclas: String,
    pub obs_id: ObsId,
    /// livetime [s]
    pub exposure: f64,
    pub backscal: Backscal,
    pub lo_threshold: f64,
    pub hi_threshold: f64,
    pub energy_unit: String,
    pub backfile: Option<String>,
    pub ancrfile: Option<String>,
    pub respfile: Option<String>,
}
/// PHA channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaRecord {
    pub channel: usize,
    pub counts: f64,
    /// 0 for good channels
    pub quality: u8,
    pub e_min: f64,
    pub e_max: f64,
}
/// PHA or BKG file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaFile {
    pub header: PhaHeader,
    pub records: Vec<PhaRecord>,
}
impl PhaFile {
    /// Builds the file of a counts spectrum, without links to other files
    pub fn new(spectrum: &PhaCountsSpectrum, hduclas: &str, convention: UnitConvention) -> Self {
        let unit = convention.energy_unit(spectrum.energy().unit());
        let spectrum = spectrum.to_energy_unit(unit);
        let records = spectrum
            .bins()
            .zip(spectrum.quality())
            .enumerate()
            .map(|(channel, ((e_min, e_max, counts), &bad))| PhaRecord {
                channel,
                counts,
                quality: bad as u8,
                e_min,
                e_max,
            })
            .collect();
        Self {
            header: PhaHeader {
                hduclas: hduclas.to_string(),
                obs_id: spectrum.obs_id().clone(),
                exposure: spectrum.livetime(),
                backscal: spectrum.backscal().clone(),
                lo_threshold: spectrum.lo_threshold(),
                hi_threshold: spectrum.hi_threshold(),
                energy_unit: unit.to_string(),
                backfile: None,
                ancrfile: None,
                respfile: None,
            },
            records,
        }
    }
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_pickle(path.as_ref())
    }
    pub fn write<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        write_pickle(self, path.as_ref(), overwrite)
    }
    /// Converts the file back into a counts spectrum
    pub fn into_spectrum(self) -> Result<PhaCountsSpectrum> {
        let (e_min, e_max): (Vec<f64>, Vec<f64>) =
            self.records.iter().map(|r| (r.e_min, r.e_max)).unzip();
        let energy = EnergyBounds::new(edges(&e_min, &e_max), self.header.energy_unit.parse()?)?;
        let (data, quality): (Vec<f64>, Vec<bool>) = self
            .records
            .into_iter()
            .map(|r| (r.counts, r.quality > 0))
            .unzip();
        let header = self.header;
        Ok(PhaCountsSpectrum::new(data, energy)?
            .with_obs_id(header.obs_id)
            .with_livetime(header.exposure)
            .with_backscal(header.backscal)?
            .with_quality(quality)?
            .with_thresholds(header.lo_threshold, header.hi_threshold))
    }
}

/// ARF file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArfFile {
    pub energy_unit: String,
    pub area_unit: String,
    pub energ_lo: Vec<f64>,
    pub energ_hi: Vec<f64>,
    pub specresp: Vec<f64>,
}
impl ArfFile {
    pub fn new(aeff: &EffectiveAreaTable, convention: UnitConvention) -> Self {
        let energy_unit = convention.energy_unit(aeff.energy().unit());
        let area_unit = convention.area_unit(aeff.unit());
        let aeff = aeff.to_units(energy_unit, area_unit);
        Self {
            energy_unit: energy_unit.to_string(),
            area_unit: area_unit.to_string(),
            energ_lo: aeff.energy().lower_bounds().to_vec(),
            energ_hi: aeff.energy().upper_bounds().to_vec(),
            specresp: aeff.evaluate().to_vec(),
        }
    }
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_pickle(path.as_ref())
    }
    pub fn write<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        write_pickle(self, path.as_ref(), overwrite)
    }
    pub fn into_aeff(self) -> Result<EffectiveAreaTable> {
        let energy = EnergyBounds::new(
            edges(&self.energ_lo, &self.energ_hi),
            self.energy_unit.parse()?,
        )?;
        Ok(EffectiveAreaTable::new(
            energy,
            self.specresp,
            self.area_unit.parse()?,
        )?)
    }
}

/// RMF file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmfFile {
    pub energy_unit: String,
    /// true energy bins
    pub energ_lo: Vec<f64>,
    pub energ_hi: Vec<f64>,
    /// reco energy bins
    pub e_min: Vec<f64>,
    pub e_max: Vec<f64>,
    /// one row per true energy bin
    pub matrix: Vec<Vec<f64>>,
}
impl RmfFile {
    pub fn new(edisp: &EnergyDispersion, convention: UnitConvention) -> Self {
        let unit = convention.energy_unit(edisp.e_true().unit());
        let edisp = edisp.to_energy_unit(unit);
        Self {
            energy_unit: unit.to_string(),
            energ_lo: edisp.e_true().lower_bounds().to_vec(),
            energ_hi: edisp.e_true().upper_bounds().to_vec(),
            e_min: edisp.e_reco().lower_bounds().to_vec(),
            e_max: edisp.e_reco().upper_bounds().to_vec(),
            matrix: edisp
                .pdf_matrix()
                .row_iter()
                .map(|row| row.iter().cloned().collect())
                .collect(),
        }
    }
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_pickle(path.as_ref())
    }
    pub fn write<P: AsRef<Path>>(&self, path: P, overwrite: bool) -> Result<()> {
        write_pickle(self, path.as_ref(), overwrite)
    }
    pub fn into_edisp(self) -> Result<EnergyDispersion> {
        let unit: EnergyUnit = self.energy_unit.parse()?;
        let e_true = EnergyBounds::new(edges(&self.energ_lo, &self.energ_hi), unit)?;
        let e_reco = EnergyBounds::new(edges(&self.e_min, &self.e_max), unit)?;
        let (n_true, n_reco) = (e_true.nbins(), e_reco.nbins());
        if let Some(row) = self.matrix.iter().find(|row| row.len() != n_reco) {
            return Err(IrfError::EdispShape {
                found: (self.matrix.len(), row.len()),
                expected: (n_true, n_reco),
            }
            .into());
        }
        if self.matrix.len() != n_true {
            return Err(IrfError::EdispShape {
                found: (self.matrix.len(), n_reco),
                expected: (n_true, n_reco),
            }
            .into());
        }
        let flat: Vec<f64> = self.matrix.into_iter().flatten().collect();
        Ok(EnergyDispersion::new(
            e_true,
            e_reco,
            DMatrix::from_row_slice(n_true, n_reco, &flat),
        )?)
    }
}

impl SpectrumObservation {
    /// Loads an observation from its PHA file
    ///
    /// The linked files are looked for in the directory of the PHA file.
    /// A missing background or response file is reported and left out.
    pub fn read<P: AsRef<Path>>(phafile: P) -> Result<Self> {
        let phafile = phafile.as_ref();
        log::info!("Loading {:?}...", phafile);
        let now = Instant::now();
        let dir = phafile.parent().unwrap_or_else(|| Path::new(""));
        let pha = PhaFile::read(phafile)?;
        if pha.header.hduclas != HDUCLAS_SOURCE {
            return Err(OgipError::HduClass {
                path: phafile.to_path_buf(),
                found: pha.header.hduclas,
                expected: HDUCLAS_SOURCE,
            });
        }
        let header = pha.header.clone();
        let on_vector = pha.into_spectrum()?;
        let aeff = header
            .ancrfile
            .map(|file| ArfFile::read(dir.join(file)))
            .ok_or_else(|| OgipError::MissingArf(phafile.to_path_buf()))??
            .into_aeff()?;
        let off_vector = match header.backfile.map(|file| dir.join(file)) {
            Some(path) if path.exists() => Some(PhaFile::read(path)?.into_spectrum()?),
            Some(path) => {
                log::warn!("Background file {:?} not found", path);
                None
            }
            None => {
                log::warn!("No background file linked in {:?}", phafile);
                None
            }
        };
        let edisp = match header.respfile.map(|file| dir.join(file)) {
            Some(path) if path.exists() => Some(RmfFile::read(path)?.into_edisp()?),
            Some(path) => {
                log::warn!("Response file {:?} not found", path);
                None
            }
            None => {
                log::warn!("No response file linked in {:?}", phafile);
                None
            }
        };
        let obs = SpectrumObservation::new(on_vector, aeff, off_vector, edisp)?;
        log::info!("... loaded in {:}ms", now.elapsed().as_millis());
        Ok(obs)
    }
    /// Writes the OGIP files of the observation into `outdir`
    ///
    /// `outdir` is created if needed.
    /// Without overwrite, nothing is written if any of the files already exists.
    pub fn write<P: AsRef<Path>>(&self, outdir: P, options: &WriteOptions) -> Result<()> {
        let outdir = outdir.as_ref();
        fs::create_dir_all(outdir).map_err(|e| OgipError::Io(e, outdir.to_path_buf()))?;
        let on_vector = self.on_vector();
        if !options.overwrite {
            let targets = [
                Some(on_vector.phafile()),
                Some(on_vector.arffile()),
                self.off_vector().map(|_| on_vector.bkgfile()),
                self.edisp().map(|_| on_vector.rmffile()),
            ];
            if let Some(path) = targets
                .into_iter()
                .flatten()
                .map(|file| outdir.join(file))
                .find(|path| path.exists())
            {
                return Err(OgipError::FileExists(path));
            }
        }
        let mut pha = PhaFile::new(on_vector, HDUCLAS_SOURCE, options.convention);
        pha.header.ancrfile = Some(on_vector.arffile());
        if let Some(off_vector) = self.off_vector() {
            pha.header.backfile = Some(on_vector.bkgfile());
            PhaFile::new(off_vector, HDUCLAS_BACKGROUND, options.convention)
                .write(outdir.join(on_vector.bkgfile()), options.overwrite)?;
        }
        if let Some(edisp) = self.edisp() {
            pha.header.respfile = Some(on_vector.rmffile());
            RmfFile::new(edisp, options.convention)
                .write(outdir.join(on_vector.rmffile()), options.overwrite)?;
        }
        ArfFile::new(self.aeff(), options.convention)
            .write(outdir.join(on_vector.arffile()), options.overwrite)?;
        pha.write(outdir.join(on_vector.phafile()), options.overwrite)?;
        log::info!("Observation {} written to {:?}", self.obs_id(), outdir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::tests::observation;
    use std::error::Error;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gamma-spectrum-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        a.iter()
            .zip(b)
            .for_each(|(x, y)| assert!((x - y).abs() <= 1e-9 * x.abs().max(y.abs()), "{} != {}", x, y));
    }

    #[test]
    fn round_trip() -> std::result::Result<(), Box<dyn Error>> {
        let dir = temp_dir("round-trip");
        let mut obs = observation(23523, vec![10., 20., 30.], vec![5., 7., 9.], 0.1, 100.);
        obs.set_thresholds(2., 8.);
        obs.write(&dir, &WriteOptions::default())?;
        for file in ["pha_obs23523.pkl", "bkg_obs23523.pkl", "arf_obs23523.pkl", "rmf_obs23523.pkl"] {
            assert!(dir.join(file).exists(), "{} is missing", file);
        }
        let copy = SpectrumObservation::read(dir.join("pha_obs23523.pkl"))?;
        assert_eq!(copy, obs);
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn sherpa_convention() -> std::result::Result<(), Box<dyn Error>> {
        let dir = temp_dir("sherpa");
        let obs = observation(7, vec![10., 20., 30.], vec![5., 7., 9.], 0.1, 100.);
        obs.write(
            &dir,
            &WriteOptions::default().convention(UnitConvention::Sherpa),
        )?;
        let arf = ArfFile::read(dir.join("arf_obs7.pkl"))?;
        assert_eq!((arf.energy_unit.as_str(), arf.area_unit.as_str()), ("keV", "cm2"));
        assert_eq!(arf.energ_lo[1], 1e9);
        assert_eq!(arf.specresp[0], 1e8);
        let pha = PhaFile::read(dir.join("pha_obs7.pkl"))?;
        assert_eq!(pha.header.energy_unit, "keV");
        assert_eq!(pha.header.backfile.as_deref(), Some("bkg_obs7.pkl"));
        let copy = SpectrumObservation::read(dir.join("pha_obs7.pkl"))?;
        assert_eq!(copy.e_reco().unit(), EnergyUnit::KeV);
        assert!(copy.e_reco().is_compatible(obs.e_reco()));
        assert_close(copy.on_vector().data(), obs.on_vector().data());
        assert_close(
            copy.aeff().to_units(EnergyUnit::TeV, AreaUnit::SquareMeter).evaluate(),
            obs.aeff().evaluate(),
        );
        assert_eq!(copy.on_vector().thresholds_in(EnergyUnit::TeV), (1., 8.));
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn no_overwrite() -> std::result::Result<(), Box<dyn Error>> {
        let dir = temp_dir("no-overwrite");
        let obs = observation(1, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 10.);
        obs.write(&dir, &WriteOptions::default())?;
        assert!(matches!(
            obs.write(&dir, &WriteOptions::default().overwrite(false)),
            Err(OgipError::FileExists(_))
        ));
        obs.write(&dir, &WriteOptions::default())?;
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn no_partial_write() -> std::result::Result<(), Box<dyn Error>> {
        let dir = temp_dir("partial");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("pha_obs5.pkl"), b"previous")?;
        let obs = observation(5, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 10.);
        assert!(matches!(
            obs.write(&dir, &WriteOptions::default().overwrite(false)),
            Err(OgipError::FileExists(path)) if path == dir.join("pha_obs5.pkl")
        ));
        let files: Vec<_> = fs::read_dir(&dir)?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(files, vec![std::ffi::OsString::from("pha_obs5.pkl")]);
        assert_eq!(fs::read(dir.join("pha_obs5.pkl"))?, b"previous");
        // a fresh file is still created without overwrite
        fs::remove_file(dir.join("pha_obs5.pkl"))?;
        obs.write(&dir, &WriteOptions::default().overwrite(false))?;
        assert_eq!(fs::read_dir(&dir)?.count(), 4);
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn missing_companions() -> std::result::Result<(), Box<dyn Error>> {
        let dir = temp_dir("missing");
        let obs = observation(3, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 10.);
        obs.write(&dir, &WriteOptions::default())?;
        fs::remove_file(dir.join("bkg_obs3.pkl"))?;
        fs::remove_file(dir.join("rmf_obs3.pkl"))?;
        let copy = SpectrumObservation::read(dir.join("pha_obs3.pkl"))?;
        assert!(copy.off_vector().is_none());
        assert!(copy.edisp().is_none());
        assert_eq!(copy.on_vector(), obs.on_vector());
        fs::remove_file(dir.join("arf_obs3.pkl"))?;
        assert!(matches!(
            SpectrumObservation::read(dir.join("pha_obs3.pkl")),
            Err(OgipError::Io(..))
        ));
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn ragged_matrix() {
        let obs = observation(3, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, 10.);
        let mut rmf = RmfFile::new(obs.edisp().unwrap(), UnitConvention::Native);
        rmf.matrix[2].pop();
        assert!(matches!(
            rmf.into_edisp(),
            Err(OgipError::Irf(IrfError::EdispShape { .. }))
        ));
    }
}
