use gamma_spectrum::{SpectrumObservationList, UnitConvention, WriteOptions};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "spectrum-stack", about = "Stacking gamma-ray spectral observations")]
struct Opt {
    /// Path to the OGIP files repository, the `SPECTRUM_DATA` env variable otherwise
    #[structopt(long, parse(from_os_str))]
    path: Option<PathBuf>,
    /// Output directory of the stacked observation OGIP files
    #[structopt(long, parse(from_os_str))]
    outdir: Option<PathBuf>,
    /// Write the files in keV and cm2
    #[structopt(long)]
    sherpa: bool,
    /// Fail instead of overwriting existing files
    #[structopt(long)]
    no_overwrite: bool,
    /// CSV file of the stacked observation statistics per energy bin
    #[structopt(long, parse(from_os_str))]
    stats: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let obs_list = match opt.path {
        Some(path) => SpectrumObservationList::read(path)?,
        None => SpectrumObservationList::from_env()?,
    };
    for obs in obs_list.iter() {
        println!("{}\n", obs);
    }

    let stacked = obs_list.stack()?;
    println!("Stacked observation:\n{}", stacked);

    if let Some(outdir) = opt.outdir {
        let mut options = WriteOptions::default().overwrite(!opt.no_overwrite);
        if opt.sherpa {
            options = options.convention(UnitConvention::Sherpa);
        }
        stacked.write(outdir, &options)?;
    }
    if let Some(path) = opt.stats {
        stacked.write_stats_table(path)?;
    }

    Ok(())
}
