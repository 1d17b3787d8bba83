//! Phonon state and the per-collision context handed to the boundary engine.
//!
//! A [`Phonon`] is owned by the transport loop; the engine only reads it. A
//! [`Collision`] is built fresh for every boundary hit and carries the global
//! collision point and outward normal together with the [`Frame`] needed to
//! query the solid, which lives in its own local coordinates.

use nalgebra::{Isometry3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::H_PLANCK;
use crate::mode::Mode;
use crate::surface::MaterialPair;


/// A phonon as seen by the boundary engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Phonon {
    pub mode: Mode,
    pub wavevector: Vector3<f64>, // crystal momentum, global frame
    pub energy: f64,              // kinetic energy in meV
}

impl Phonon {
    pub fn new(mode: Mode, wavevector: Vector3<f64>, energy: f64) -> Self {
        Self {
            mode,
            wavevector,
            energy,
        }
    }

    /// Frequency in THz, from `E = h f`.
    pub fn frequency(&self) -> f64 {
        self.energy / H_PLANCK
    }

    /// Replaces the wavevector direction, keeping its magnitude.
    pub fn with_direction(&self, dir: &Vector3<f64>) -> Self {
        let magnitude = self.wavevector.norm();
        Self {
            wavevector: dir.normalize() * magnitude,
            ..self.clone()
        }
    }
}

/// Euler angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Euler {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Euler {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    /// Rotation matrix for the z-y-z convention.
    pub fn rotation(&self) -> Rotation3<f64> {
        let rz1 = Rotation3::from_axis_angle(&Vector3::z_axis(), self.alpha.to_radians());
        let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), self.beta.to_radians());
        let rz2 = Rotation3::from_axis_angle(&Vector3::z_axis(), self.gamma.to_radians());
        rz1 * ry * rz2
    }
}

impl Default for Euler {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Rigid transform from a solid's local coordinates to the global frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    local_to_global: Isometry3<f64>,
}

impl Frame {
    pub fn identity() -> Self {
        Self {
            local_to_global: Isometry3::identity(),
        }
    }

    pub fn from_euler(euler: &Euler, translation: Vector3<f64>) -> Self {
        let rotation = UnitQuaternion::from_rotation_matrix(&euler.rotation());
        Self {
            local_to_global: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    pub fn to_global_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.local_to_global.transform_point(p)
    }

    pub fn to_local_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.local_to_global.inverse_transform_point(p)
    }

    pub fn to_global_dir(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.local_to_global.transform_vector(v)
    }

    pub fn to_local_dir(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.local_to_global.inverse_transform_vector(v)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::identity()
    }
}

/// Everything the engine needs to know about one boundary hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub point: Point3<f64>,   // global collision point
    pub normal: Vector3<f64>, // global outward normal, unit length
    pub frame: Frame,         // local frame of the solid being left
    pub materials: MaterialPair,
}

impl Collision {
    pub fn new(
        point: Point3<f64>,
        normal: Vector3<f64>,
        frame: Frame,
        materials: MaterialPair,
    ) -> Self {
        Self {
            point,
            normal: normal.normalize(),
            frame,
            materials,
        }
    }

    pub fn local_point(&self) -> Point3<f64> {
        self.frame.to_local_point(&self.point)
    }

    pub fn local_normal(&self) -> Vector3<f64> {
        self.frame.to_local_dir(&self.normal)
    }
}
