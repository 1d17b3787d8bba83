use std::fmt;

use serde::{Deserialize, Serialize};

/// Acoustic polarization branch of a phonon.
///
/// The lattice is the only collaborator that branches on the mode; everything
/// else carries it through for the inward check and for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Longitudinal,
    SlowTransverse,
    FastTransverse,
}

impl Mode {
    pub const ALL: [Mode; 3] = [
        Mode::Longitudinal,
        Mode::SlowTransverse,
        Mode::FastTransverse,
    ];

    /// Short label used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Longitudinal => "L",
            Mode::SlowTransverse => "ST",
            Mode::FastTransverse => "FT",
        }
    }

    pub fn is_transverse(&self) -> bool {
        !matches!(self, Mode::Longitudinal)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l" | "longitudinal" => Ok(Mode::Longitudinal),
            "st" | "slow_transverse" => Ok(Mode::SlowTransverse),
            "ft" | "fast_transverse" => Ok(Mode::FastTransverse),
            _ => Err(format!("unknown phonon mode '{}'", s)),
        }
    }
}
