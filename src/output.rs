use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::settings::Settings;
use crate::tally::Tally;


pub const SUMMARY_FILE: &str = "summary.json";
pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Serialize)]
struct Summary<'a> {
    timestamp: DateTime<Local>,
    seed: u64,
    settings: &'a Settings,
    tally: &'a Tally,
}

/// Writes the run summary as JSON and the resolved settings as TOML into
/// `dir`, creating it if needed. Returns the path of the summary.
pub fn write_summary(dir: &Path, settings: &Settings, seed: u64, tally: &Tally) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {:?}", dir))?;

    let summary_path = dir.join(SUMMARY_FILE);
    let file = File::create(&summary_path)
        .with_context(|| format!("creating {:?}", summary_path))?;
    let mut writer = BufWriter::new(file);
    let summary = Summary {
        timestamp: Local::now(),
        seed,
        settings,
        tally,
    };
    serde_json::to_writer_pretty(&mut writer, &summary)?;
    writeln!(writer)?;
    writer.flush()?;

    // the settings file can be fed back in with --config to repeat the run
    let mut resolved = settings.clone();
    resolved.seed = Some(seed);
    let settings_path = dir.join(SETTINGS_FILE);
    fs::write(&settings_path, toml::to_string(&resolved)?)
        .with_context(|| format!("writing {:?}", settings_path))?;

    Ok(summary_path)
}
