//! Specular reflection corrected for anisotropic dispersion.
//!
//! The naive law of reflection flips the wavevector's component along the
//! surface normal. In an anisotropic crystal the group velocity of that
//! reflected wavevector can still point out through the wall. Physically the
//! phonon then runs along the surface as a surface wave until it reaches a
//! point where an inward-propagating solution exists.
//!
//! [`SpecularSolver`] models this by walking the reflection point along the
//! surface in small steps, following the local normal and rotating the
//! tangential part of the wavevector with it, while holding the perpendicular
//! magnitude fixed. Walks that step off a facet edge are handed to
//! [`edge::correct`].

use log::debug;
use nalgebra::{Point3, Vector3};
use thiserror::Error;

use crate::config::{EDGE_THRESHOLD, MAX_WALK_ATTEMPTS, WALK_STEP};
use crate::edge;
use crate::geom::Surface;
use crate::lattice::Lattice;
use crate::mode::Mode;
use crate::phonon::Collision;
use crate::vector;


/// Why a surface walk stopped without an inward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStop {
    /// Used up all attempts.
    Exhausted,
    /// No tangential direction to walk in, or an edge without a usable neighbour.
    Degenerate,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("surface walk stopped ({reason:?}) after {attempts} attempts")]
pub struct WalkFailure {
    pub reason: WalkStop,
    pub attempts: usize,
    pub direction: Vector3<f64>, // last candidate, global frame
}

/// A reflected direction whose group velocity points into the crystal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecularReflection {
    pub direction: Vector3<f64>, // unit wavevector direction, global frame
    pub point: Point3<f64>,      // reflection point, global frame
    pub normal: Vector3<f64>,    // outward normal at `point`, global frame
    pub attempts: usize,         // surface-walk steps taken
}

/// Law of reflection applied to the unit wavevector.
pub fn naive_reflection(k: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    vector::reflect(&k.normalize(), normal)
}

/// Running state of one surface walk, all in the solid's local frame.
struct Walk {
    position: Point3<f64>,
    normal: Vector3<f64>,
    perp: f64,               // fixed perpendicular magnitude, <= 0 for inward
    tangent: Vector3<f64>,   // tangential component, magnitude preserved
    direction: Vector3<f64>, // tangent + perp * normal
}

impl Walk {
    fn new(position: Point3<f64>, direction: Vector3<f64>, normal: Vector3<f64>) -> Self {
        let (perp, tangent) = vector::decompose(&direction, &normal);
        Self {
            position,
            normal,
            perp,
            tangent,
            direction,
        }
    }

    /// Takes one step along the tangent and re-aligns the candidate with the
    /// surface there. Returns `None` if the step cannot be taken.
    fn advance(&mut self, surface: &dyn Surface) -> Option<()> {
        let step_dir = vector::unit(&self.tangent)?;
        self.position += WALK_STEP * step_dir; // now off the surface

        let old_normal = self.normal;
        let new_normal = surface.normal(&self.position);
        let adjust = surface.distance_to_in(&self.position, &-new_normal);

        if adjust > EDGE_THRESHOLD {
            let corrected = edge::correct(surface, &self.position, &self.direction)?;
            let (_, tangent) = vector::decompose(&corrected.direction, &corrected.normal);
            self.tangent = vector::unit(&tangent)? * self.tangent.norm();
            self.position = corrected.position;
            self.normal = corrected.normal;
        } else {
            self.position -= adjust * new_normal;
            let axis = (self.perp * old_normal).cross(&self.tangent);
            let phi = vector::azim_angle(&old_normal, &new_normal, &axis);
            self.tangent = vector::rotate(&self.tangent, &axis, phi);
            self.normal = new_normal;
        }

        self.direction = self.tangent + self.perp * self.normal;
        Some(())
    }
}

/// Computes specular reflections that honour the inward group-velocity constraint.
pub struct SpecularSolver<'a> {
    lattice: &'a dyn Lattice,
    surface: &'a dyn Surface,
}

impl<'a> SpecularSolver<'a> {
    pub fn new(lattice: &'a dyn Lattice, surface: &'a dyn Surface) -> Self {
        Self { lattice, surface }
    }

    /// Reflects the incident wavevector `k` at `collision`.
    ///
    /// Returns the naive mirror direction at the original point when it is
    /// already inward. Otherwise walks the reflection point along the surface
    /// for at most [`MAX_WALK_ATTEMPTS`] steps.
    pub fn solve(
        &self,
        k: &Vector3<f64>,
        collision: &Collision,
        mode: Mode,
    ) -> Result<SpecularReflection, WalkFailure> {
        let reflected = naive_reflection(k, &collision.normal);
        if self
            .lattice
            .velocity_is_inward(mode, &reflected, &collision.normal)
        {
            return Ok(SpecularReflection {
                direction: reflected,
                point: collision.point,
                normal: collision.normal,
                attempts: 0,
            });
        }

        let frame = &collision.frame;
        let mut walk = Walk::new(
            collision.local_point(),
            frame.to_local_dir(&reflected),
            collision.local_normal(),
        );
        debug!(
            "naive reflection of mode {} leaks outward; walking from {:?} with k_perp {:.4}",
            mode,
            collision.point.coords.as_slice(),
            walk.perp
        );

        let mut attempts = 0;
        while !self.lattice.velocity_is_inward(
            mode,
            &frame.to_global_dir(&walk.direction),
            &frame.to_global_dir(&walk.normal),
        ) {
            let reason = if attempts >= MAX_WALK_ATTEMPTS {
                Some(WalkStop::Exhausted)
            } else if walk.advance(self.surface).is_none() {
                Some(WalkStop::Degenerate)
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(WalkFailure {
                    reason,
                    attempts,
                    direction: frame.to_global_dir(&walk.direction),
                });
            }
            attempts += 1;
        }

        debug!(
            "surface walk converged after {} attempts at local {:?}",
            attempts,
            walk.position.coords.as_slice()
        );

        Ok(SpecularReflection {
            direction: frame.to_global_dir(&walk.direction).normalize(),
            point: frame.to_global_point(&walk.position),
            normal: frame.to_global_dir(&walk.normal),
            attempts,
        })
    }
}
