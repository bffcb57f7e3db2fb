use crate::{
    ogip::{OgipError, WriteOptions},
    observation::SpectrumObservation,
    pha::ObsId,
    stacker::{ordered_sum, SpectrumObservationStacker, StackerError},
};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::{
    env::{self, VarError},
    fmt,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum ObservationListError {
    #[error(r#""SPECTRUM_DATA" env var is not set"#)]
    Env(#[from] VarError),
    #[error("invalid file pattern")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to list the PHA files")]
    Glob(#[from] glob::GlobError),
    #[error("no PHA file found in {0:?}")]
    Empty(PathBuf),
    #[error("OGIP file error")]
    Ogip(#[from] OgipError),
}
type Result<T> = std::result::Result<T, ObservationListError>;

/// A list of [SpectrumObservation]s
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumObservationList(Vec<SpectrumObservation>);
impl Deref for SpectrumObservationList {
    type Target = Vec<SpectrumObservation>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl DerefMut for SpectrumObservationList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
impl From<Vec<SpectrumObservation>> for SpectrumObservationList {
    fn from(observations: Vec<SpectrumObservation>) -> Self {
        Self(observations)
    }
}
impl FromIterator<SpectrumObservation> for SpectrumObservationList {
    fn from_iter<T: IntoIterator<Item = SpectrumObservation>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
impl IntoIterator for SpectrumObservationList {
    type Item = SpectrumObservation;
    type IntoIter = std::vec::IntoIter<SpectrumObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
impl<'a> IntoIterator for &'a SpectrumObservationList {
    type Item = &'a SpectrumObservation;
    type IntoIter = std::slice::Iter<'a, SpectrumObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
impl SpectrumObservationList {
    /// Loads all the observations of a directory
    ///
    /// Every `pha_obs*.pkl` file is loaded, in the order of the file names.
    pub fn read<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let pattern =
            Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join("pha_obs*.pkl");
        let mut paths = glob::glob(&pattern.to_string_lossy())?
            .collect::<std::result::Result<Vec<PathBuf>, glob::GlobError>>()?;
        if paths.is_empty() {
            return Err(ObservationListError::Empty(dir.to_path_buf()));
        }
        paths.sort();
        let pb = ProgressBar::new(paths.len() as u64);
        let observations = paths
            .par_iter()
            .progress_with(pb)
            .map(SpectrumObservation::read)
            .collect::<std::result::Result<Vec<_>, OgipError>>()?;
        Ok(Self(observations))
    }
    /// Loads the observations of the directory given by the env variable `SPECTRUM_DATA`
    pub fn from_env() -> Result<Self> {
        let dir = env::var("SPECTRUM_DATA")?;
        Self::read(dir)
    }
    /// Writes the OGIP files of all the observations into `outdir`
    pub fn write<P: AsRef<Path>>(&self, outdir: P, options: &WriteOptions) -> Result<()> {
        let outdir = outdir.as_ref();
        self.iter()
            .try_for_each(|obs| obs.write(outdir, options))?;
        Ok(())
    }
    /// First observation with the given id
    pub fn obs(&self, obs_id: u32) -> Option<&SpectrumObservation> {
        self.iter().find(|obs| obs.obs_id().contains(obs_id))
    }
    pub fn obs_ids(&self) -> Vec<ObsId> {
        self.iter().map(|obs| obs.obs_id().clone()).collect()
    }
    /// Sum of the livetimes [s], independent of the order of the observations
    pub fn total_livetime(&self) -> f64 {
        ordered_sum(self.iter().map(|obs| obs.livetime()))
    }
    /// Stacks all the observations into one
    pub fn stack(&self) -> std::result::Result<SpectrumObservation, StackerError> {
        let mut stacker = SpectrumObservationStacker::new(self);
        stacker.run()?;
        stacker
            .into_stacked_obs()
            .ok_or(StackerError::StageNotRun("observation"))
    }
}
impl fmt::Display for SpectrumObservationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SpectrumObservationList")?;
        writeln!(f, "Number of observations: {}", self.len())?;
        for obs in self.iter() {
            writeln!(f, "{}", obs)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::tests::observation;
    use std::{error::Error, fs};

    fn obs_list() -> SpectrumObservationList {
        [(23592, 200.), (23523, 100.), (23559, 50.)]
            .into_iter()
            .map(|(id, livetime)| {
                observation(id, vec![10., 20., 30.], vec![5., 7., 9.], 0.1, livetime)
            })
            .collect()
    }

    #[test]
    fn lookup() {
        let obs_list = obs_list();
        assert_eq!(obs_list.len(), 3);
        assert_eq!(obs_list.obs(23523).map(|o| o.livetime()), Some(100.));
        assert!(obs_list.obs(1).is_none());
        assert_eq!(
            obs_list.obs_ids(),
            vec![
                ObsId::Single(23592),
                ObsId::Single(23523),
                ObsId::Single(23559)
            ]
        );
        assert_eq!(obs_list.total_livetime(), 350.);
        let stacked = obs_list.stack().unwrap();
        assert_eq!(stacked.livetime(), 350.);
        assert_eq!(stacked.obs_id().ids(), vec![23523, 23559, 23592]);
        assert!(obs_list.to_string().contains("Number of observations: 3"));
    }

    #[test]
    fn read_write() -> std::result::Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join(format!(
            "gamma-spectrum-list-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let obs_list = obs_list();
        obs_list.write(&dir, &WriteOptions::default())?;
        let copy = SpectrumObservationList::read(&dir)?;
        assert_eq!(
            copy.obs_ids(),
            vec![
                ObsId::Single(23523),
                ObsId::Single(23559),
                ObsId::Single(23592)
            ]
        );
        assert_eq!(copy.obs(23559), obs_list.obs(23559));
        fs::remove_dir_all(&dir)?;
        assert!(matches!(
            SpectrumObservationList::read(&dir),
            Err(ObservationListError::Empty(_))
        ));
        Ok(())
    }

    #[test]
    fn read_special_dir() -> std::result::Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join(format!(
            "gamma-spectrum-[list]*-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let obs_list = obs_list();
        obs_list.write(&dir, &WriteOptions::default())?;
        let copy = SpectrumObservationList::read(&dir)?;
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.obs(23592), obs_list.obs(23592));
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn total_livetime_order() {
        let livetimes = [0.1, 0.7, 0.2, 1e16, 1.0, 3.3];
        let obs_list: SpectrumObservationList = livetimes
            .iter()
            .enumerate()
            .map(|(i, &t)| observation(i as u32, vec![1., 2., 3.], vec![1., 1., 1.], 0.1, t))
            .collect();
        let mut sorted = livetimes.to_vec();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(obs_list.total_livetime(), sorted.iter().sum::<f64>());
        let mut reversed = obs_list.clone();
        reversed.reverse();
        assert_eq!(reversed.total_livetime(), obs_list.total_livetime());
    }
}
