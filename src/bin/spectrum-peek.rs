use gamma_spectrum::SpectrumObservation;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "spectrum-peek", about = "Quick-look plot of a spectral observation")]
struct Opt {
    /// PHA file of the observation
    #[structopt(parse(from_os_str))]
    phafile: PathBuf,
    /// SVG output file
    #[structopt(short, long, parse(from_os_str), default_value = "peek.svg")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let obs = SpectrumObservation::read(&opt.phafile)?;
    println!("{}", obs);
    obs.peek(&opt.output)
        .map_err(|e| anyhow::anyhow!("failed to plot {:?}: {}", opt.output, e))?;

    Ok(())
}
