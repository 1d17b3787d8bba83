use std::path::Path;

use anyhow::Result;
use log::info;
use phonon_boundary::output;
use phonon_boundary::settings;
use phonon_boundary::transport::Simulation;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = settings::load_config()?;
    info!("{}", settings);

    let mut simulation = Simulation::new(settings)?;
    simulation.run()?;
    println!("{}", simulation.tally);

    let summary = output::write_summary(
        Path::new(&simulation.settings.output_dir),
        &simulation.settings,
        simulation.seed,
        &simulation.tally,
    )?;
    info!("Summary written to {:?}", summary);
    Ok(())
}
