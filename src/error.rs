use crate::{
    counts::SpectrumError, energy::EnergyError, irf::IrfError, observation::ObservationError,
    observation_list::ObservationListError, ogip::OgipError, stacker::StackerError,
    stats::StatsError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `energy` module")]
    Energy(#[from] EnergyError),
    #[error("Error in the `counts` module")]
    Spectrum(#[from] SpectrumError),
    #[error("Error in the `irf` module")]
    Irf(#[from] IrfError),
    #[error("Error in the `stats` module")]
    Stats(#[from] StatsError),
    #[error("Error in the `observation` module")]
    Observation(#[from] ObservationError),
    #[error("Error in the `observation_list` module")]
    ObservationList(#[from] ObservationListError),
    #[error("Error in the `stacker` module")]
    Stacker(#[from] StackerError),
    #[error("Error in the `ogip` module")]
    Ogip(#[from] OgipError),
}
