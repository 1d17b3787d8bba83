//! Lambertian (cosine-weighted) diffuse reflection.

use log::debug;
use nalgebra::Vector3;
use rand::RngCore;
use rand_distr::{Distribution, UnitDisc};

use crate::config::MAX_LAMBERT_TRIES;
use crate::lattice::Lattice;
use crate::mode::Mode;


/// Draws a unit vector from a cosine-weighted distribution about the inward
/// direction `-normal` (Malley's method: uniform disc lifted onto the hemisphere).
pub fn lambert_reflection(normal: &Vector3<f64>, rng: &mut dyn RngCore) -> Vector3<f64> {
    let n = -normal.normalize();
    let arbitrary = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let tangent = n.cross(&arbitrary).normalize();
    let bitangent = n.cross(&tangent);

    let [x, y]: [f64; 2] = UnitDisc.sample(rng);
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();

    (tangent * x + bitangent * y + n * z).normalize()
}

/// Result of a diffuse draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lambertian {
    pub direction: Vector3<f64>,
    pub tries: usize,
    pub inward: bool,
}

/// Rejection sampler for diffuse reflection that honours the lattice's group velocity.
pub struct DiffuseSampler<'a> {
    lattice: &'a dyn Lattice,
}

impl<'a> DiffuseSampler<'a> {
    pub fn new(lattice: &'a dyn Lattice) -> Self {
        Self { lattice }
    }

    /// Draws Lambertian directions until one has an inward group velocity, up to
    /// [`MAX_LAMBERT_TRIES`]. If none passes, the last draw is returned with
    /// `inward` unset; the caller decides what to do with it.
    pub fn sample(&self, normal: &Vector3<f64>, mode: Mode, rng: &mut dyn RngCore) -> Lambertian {
        let mut direction = lambert_reflection(normal, rng);
        let mut tries = 1;
        let mut inward = self.lattice.velocity_is_inward(mode, &direction, normal);

        while !inward && tries < MAX_LAMBERT_TRIES {
            direction = lambert_reflection(normal, rng);
            tries += 1;
            inward = self.lattice.velocity_is_inward(mode, &direction, normal);
        }

        if !inward {
            debug!(
                "no inward Lambertian direction for mode {} after {} tries",
                mode, tries
            );
        }

        Lambertian {
            direction,
            tries,
            inward,
        }
    }
}
