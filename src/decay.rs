//! Anharmonic decay of a phonon into two daughters at a boundary.

use anyhow::{anyhow, Result};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::phonon::Phonon;


/// Splits a phonon into two daughters. Directions of the daughters are chosen by
/// the caller, so implementations only need to get modes and energies right.
pub trait Decay: Send + Sync {
    fn decay(&self, parent: &Phonon, rng: &mut dyn RngCore) -> [Phonon; 2];
}

/// Simple anharmonic down-conversion with a uniform energy split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnharmonicDecay {
    /// Smallest energy fraction a daughter may carry.
    pub min_fraction: f64,
    /// Probability that a longitudinal parent goes to L + T rather than T + T.
    pub lt_fraction: f64,
}

impl Default for AnharmonicDecay {
    fn default() -> Self {
        Self {
            min_fraction: 0.05,
            lt_fraction: 0.26,
        }
    }
}

impl AnharmonicDecay {
    pub fn new(min_fraction: f64, lt_fraction: f64) -> Result<Self> {
        let decay = Self {
            min_fraction,
            lt_fraction,
        };
        decay.validate()?;
        Ok(decay)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.min_fraction) {
            return Err(anyhow!("decay min_fraction must lie in [0, 0.5)"));
        }
        if !(0.0..=1.0).contains(&self.lt_fraction) {
            return Err(anyhow!("decay lt_fraction must lie in [0, 1]"));
        }
        Ok(())
    }

    fn random_transverse(rng: &mut dyn RngCore) -> Mode {
        if rng.random::<bool>() {
            Mode::SlowTransverse
        } else {
            Mode::FastTransverse
        }
    }
}

impl Decay for AnharmonicDecay {
    fn decay(&self, parent: &Phonon, rng: &mut dyn RngCore) -> [Phonon; 2] {
        let modes = match parent.mode {
            Mode::Longitudinal if rng.random::<f64>() < self.lt_fraction => {
                [Mode::Longitudinal, Self::random_transverse(rng)]
            }
            _ => [Self::random_transverse(rng), Self::random_transverse(rng)],
        };

        let x = rng.random_range(self.min_fraction..=1.0 - self.min_fraction);
        let fractions = [x, 1.0 - x];

        [0, 1].map(|i| {
            Phonon::new(
                modes[i],
                parent.wavevector * fractions[i],
                parent.energy * fractions[i],
            )
        })
    }
}
