use anyhow::{anyhow, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::decay::AnharmonicDecay;
use crate::geom::SolidSpec;
use crate::lattice::LatticeSpec;
use crate::mode::Mode;
use crate::phonon::Euler;
use crate::surface::{MaterialPair, SurfaceProperty};


/// Names of the materials on either side of the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Materials {
    pub incident: String,
    pub transmitted: String,
}

impl Materials {
    pub fn pair(&self) -> MaterialPair {
        MaterialPair::new(&self.incident, &self.transmitted)
    }
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub num_phonons: usize,
    pub seed: Option<u64>,
    /// Initial phonon energy in meV.
    pub energy: f64,
    /// Initial polarization mode. Drawn uniformly per phonon when unset.
    pub mode: Option<Mode>,
    /// Phase velocity used to turn frequency into a wavenumber, in m/s.
    #[serde(default = "default_sound_speed")]
    pub sound_speed: f64,
    pub lattice: LatticeSpec,
    pub solid: SolidSpec,
    #[serde(default)]
    pub orientation: Euler,
    /// Global position of the solid's local origin, in mm.
    #[serde(default)]
    pub position: [f64; 3],
    pub materials: Materials,
    #[serde(default)]
    pub surface: SurfaceProperty,
    #[serde(default)]
    pub decay: AnharmonicDecay,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_sound_speed() -> f64 {
    5000.0
}

fn default_output_dir() -> String {
    "output".to_string()
}

/// Reads one configuration file without environment or CLI overrides.
pub fn load_config_file(path: PathBuf) -> Result<Settings> {
    let config: Settings = Config::builder()
        .add_source(File::from(path.clone()).required(true))
        .build()
        .with_context(|| format!("loading configuration {:?}", path))?
        .try_deserialize()
        .context("deserializing configuration")?;
    Ok(config)
}

/// Loads `config/default.toml` from the project root.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let config = load_config_file(root.join("config/default.toml"))?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads the layered configuration: file, then `PHONON_*` environment
/// variables, then command-line overrides.
pub fn load_config() -> Result<Settings> {
    let args = CliArgs::parse();
    load_config_with(&args)
}

pub fn load_config_with(args: &CliArgs) -> Result<Settings> {
    let config_file = match &args.config {
        Some(path) => PathBuf::from(path),
        None => {
            let root = retrieve_project_root()?;
            let default_config_file = root.join("config/default.toml");
            let local_config = root.join("config/local.toml");

            // Check if local config exists, if not use default
            if local_config.exists() {
                local_config
            } else {
                default_config_file
            }
        }
    };
    info!("Using configuration: {:?}", config_file);

    let settings: Config = Config::builder()
        .add_source(File::from(config_file.clone()).required(true))
        .add_source(Environment::with_prefix("phonon"))
        .build()
        .with_context(|| format!("loading configuration {:?}", config_file))?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("deserializing configuration")?;

    apply_overrides(&mut config, args);
    validate_config(&config)?;

    Ok(config)
}

fn apply_overrides(config: &mut Settings, args: &CliArgs) {
    if let Some(num) = args.num {
        config.num_phonons = num;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(energy) = args.energy {
        config.energy = energy;
    }
    if let Some(mode) = args.mode {
        config.mode = Some(mode);
    }
    if let Some(out) = &args.out {
        config.output_dir = out.clone();
    }
}

/// Retrieve the project root directory.
///
/// Tries `CARGO_MANIFEST_DIR`, then `PHONON_ROOT_DIR`, then the nearest
/// ancestor of the executable that has a `config` subdirectory.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("PHONON_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("locating the current executable")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(|dir| dir.to_path_buf())
        .ok_or_else(|| anyhow!("could not find project root directory"))
}

pub fn validate_config(config: &Settings) -> Result<()> {
    if config.num_phonons == 0 {
        return Err(anyhow!("number of phonons must be greater than 0"));
    }
    if !(config.energy > 0.0) {
        return Err(anyhow!("phonon energy must be greater than 0"));
    }
    if !(config.sound_speed > 0.0) {
        return Err(anyhow!("sound speed must be greater than 0"));
    }
    if config.output_dir.is_empty() {
        return Err(anyhow!("output directory must not be empty"));
    }
    config.surface.validate().context("invalid surface property")?;
    config.decay.validate().context("invalid decay parameters")?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "Phonon boundary reflection in anisotropic crystals")]
pub struct CliArgs {
    /// Configuration file. Defaults to config/local.toml, or config/default.toml.
    #[arg(short, long)]
    config: Option<String>,

    /// Number of phonons to launch.
    #[arg(short, long)]
    num: Option<usize>,

    /// Random seed for the simulation.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Initial phonon energy in meV.
    #[arg(short, long)]
    energy: Option<f64>,

    /// Initial polarization mode: l, st or ft.
    #[arg(short, long)]
    mode: Option<Mode>,

    /// Output directory.
    #[arg(short, long)]
    out: Option<String>,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = self
            .mode
            .map_or_else(|| "random".to_string(), |m| m.to_string());
        write!(
            f,
            "Settings:
  - Phonons: {}
  - Seed: {:?}
  - Energy: {:.6} meV
  - Mode: {}
  - Sound Speed: {:.1} m/s
  - Lattice: {:?}
  - Solid: {:?}
  - Boundary: {}
  - Output: {}
  ",
            self.num_phonons,
            self.seed,
            self.energy,
            mode,
            self.sound_speed,
            self.lattice,
            self.solid,
            self.materials.pair(),
            self.output_dir,
        )
    }
}
