//! Counters for boundary events over a run.
//!
//! A [`Tally`] is filled per phonon track and the per-track tallies are summed
//! with `+` when the parallel run reduces. Alongside the event counts it keeps
//! a histogram of `cos(theta)` between each diffuse direction and the inward
//! normal, which for an isotropic medium should follow `p(c) = 2c`.

use std::{fmt, ops::*};

use ndarray::Array1;
use serde::Serialize;

use crate::boundary::{BoundaryError, Outcome};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;

    #[test]
    fn histogram_bins() {
        let mut tally = Tally::new();
        tally.record_diffuse_cosine(0.0);
        tally.record_diffuse_cosine(0.05);
        tally.record_diffuse_cosine(0.95);
        tally.record_diffuse_cosine(1.0);
        tally.record_diffuse_cosine(-0.2); // outward, clamped into the first bin
        assert_eq!(tally.diffuse_cosines[0], 3);
        assert_eq!(tally.diffuse_cosines[COSINE_BINS - 1], 2);
        assert_eq!(tally.diffuse_cosines.sum(), 5);
    }

    #[test]
    fn failures_are_split_by_kind() {
        let mut tally = Tally::new();
        tally.record_failure(&BoundaryError::Convergence {
            mode: Mode::Longitudinal,
            attempts: 1000,
        });
        tally.record_failure(&BoundaryError::InvalidPostCondition {
            kind: crate::boundary::OutcomeKind::Diffuse,
            mode: Mode::FastTransverse,
        });
        assert_eq!(tally.convergence_failures, 1);
        assert_eq!(tally.post_condition_failures, 1);
        assert_eq!(tally.absorbed, 2);
    }

    #[test]
    fn sum_of_tallies() {
        let mut a = Tally::new();
        a.phonons = 2;
        a.specular = 3;
        a.record_diffuse_cosine(0.5);
        let mut b = Tally::new();
        b.phonons = 1;
        b.diffuse = 4;
        b.record_diffuse_cosine(0.55);

        let total = a.clone() + b.clone();
        assert_eq!(total.phonons, 3);
        assert_eq!(total.specular, 3);
        assert_eq!(total.diffuse, 4);
        assert_eq!(total.diffuse_cosines[5], 2);

        a += b;
        assert_eq!(a, total);
    }
}

/// Number of equal-width `cos(theta)` bins on [0, 1].
pub const COSINE_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tally {
    pub phonons: usize,                  // primaries launched
    pub daughters: usize,                // secondaries from decay
    pub hits: usize,                     // boundary collisions
    pub absorbed: usize,                 // tracks killed at a boundary, any cause
    pub specular: usize,                 // specular reflections
    pub walked: usize,                   // specular reflections moved by a surface walk
    pub diffuse: usize,                  // diffuse reflections
    pub decays: usize,                   // anharmonic decays
    pub convergence_failures: usize,     // surface walks that gave up
    pub post_condition_failures: usize,  // outward results caught by the final check
    pub reflection_limit: usize,         // tracks killed at max reflections
    pub diffuse_cosines: Array1<usize>,  // cos(theta) histogram of diffuse draws
}

impl Default for Tally {
    fn default() -> Self {
        Self::new()
    }
}

impl Tally {
    pub fn new() -> Self {
        Self {
            phonons: 0,
            daughters: 0,
            hits: 0,
            absorbed: 0,
            specular: 0,
            walked: 0,
            diffuse: 0,
            decays: 0,
            convergence_failures: 0,
            post_condition_failures: 0,
            reflection_limit: 0,
            diffuse_cosines: Array1::zeros(COSINE_BINS),
        }
    }

    /// Counts a successful engine outcome.
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Absorbed => self.absorbed += 1,
            Outcome::DecayedInto(daughters) => {
                self.decays += 1;
                self.daughters += daughters.len();
            }
            Outcome::ReflectedSpecular { .. } => self.specular += 1,
            Outcome::ReflectedDiffuse { .. } => self.diffuse += 1,
        }
    }

    /// Counts a non-fatal engine failure. The track is terminated.
    pub fn record_failure(&mut self, err: &BoundaryError) {
        match err {
            BoundaryError::Convergence { .. } => self.convergence_failures += 1,
            BoundaryError::InvalidPostCondition { .. } => self.post_condition_failures += 1,
            _ => {}
        }
        self.absorbed += 1;
    }

    pub fn record_diffuse_cosine(&mut self, cos_theta: f64) {
        let bin = (cos_theta.clamp(0.0, 1.0) * COSINE_BINS as f64) as usize;
        self.diffuse_cosines[bin.min(COSINE_BINS - 1)] += 1;
    }

    /// Fraction of boundary hits that ended a track.
    pub fn absorbed_fraction(&self) -> f64 {
        if self.hits == 0 {
            0.0
        } else {
            self.absorbed as f64 / self.hits as f64
        }
    }
}

impl Add for Tally {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, other: Self) {
        self.phonons += other.phonons;
        self.daughters += other.daughters;
        self.hits += other.hits;
        self.absorbed += other.absorbed;
        self.specular += other.specular;
        self.walked += other.walked;
        self.diffuse += other.diffuse;
        self.decays += other.decays;
        self.convergence_failures += other.convergence_failures;
        self.post_condition_failures += other.post_condition_failures;
        self.reflection_limit += other.reflection_limit;
        self.diffuse_cosines += &other.diffuse_cosines;
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tally:")?;
        writeln!(f, "  Phonons:          {}", self.phonons)?;
        writeln!(f, "  Daughters:        {}", self.daughters)?;
        writeln!(f, "  Boundary hits:    {}", self.hits)?;
        writeln!(f, "  Absorbed:         {} ({:.4})", self.absorbed, self.absorbed_fraction())?;
        writeln!(f, "  Specular:         {}", self.specular)?;
        writeln!(f, "  Walked:           {}", self.walked)?;
        writeln!(f, "  Diffuse:          {}", self.diffuse)?;
        writeln!(f, "  Decays:           {}", self.decays)?;
        writeln!(f, "  Walk failures:    {}", self.convergence_failures)?;
        writeln!(f, "  Outward results:  {}", self.post_condition_failures)?;
        writeln!(f, "  Reflection limit: {}", self.reflection_limit)?;
        write!(f, "  cos(theta) bins:  {}", self.diffuse_cosines)
    }
}
