//! Lattice dispersion oracles.
//!
//! The boundary engine never looks inside the dispersion relation. It asks a
//! [`Lattice`] for the group-velocity direction that belongs to a wavevector
//! and uses that to decide whether a candidate reflection carries energy back
//! into the crystal.
//!
//! Two lattices are provided:
//! - [`IsotropicLattice`]: group velocity parallel to the wavevector
//! - [`TensorLattice`]: quadratic dispersion `w^2 = k^T M k` per mode, which
//!   gives `v_g` along `M k` and is enough to reproduce the focusing that
//!   breaks the naive law of reflection

use anyhow::{anyhow, Result};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::vector;


/// Maps wavevectors to group-velocity directions for each polarization mode.
///
/// Implementations must be safe to share between transport workers.
pub trait Lattice: Send + Sync {
    /// Unit group-velocity direction for `k`.
    fn group_velocity_dir(&self, mode: Mode, k: &Vector3<f64>) -> Vector3<f64>;

    /// True if the group velocity of `k` points against the outward `normal`,
    /// i.e. back into the crystal.
    fn velocity_is_inward(&self, mode: Mode, k: &Vector3<f64>, normal: &Vector3<f64>) -> bool {
        self.group_velocity_dir(mode, k).dot(normal) < 0.0
    }
}

/// Group velocity always parallel to the wavevector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IsotropicLattice;

impl Lattice for IsotropicLattice {
    fn group_velocity_dir(&self, _mode: Mode, k: &Vector3<f64>) -> Vector3<f64> {
        vector::unit(k).unwrap_or_else(Vector3::zeros)
    }
}

/// Anisotropic lattice with a symmetric positive-definite tensor per mode.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorLattice {
    longitudinal: Matrix3<f64>,
    slow_transverse: Matrix3<f64>,
    fast_transverse: Matrix3<f64>,
}

impl TensorLattice {
    pub fn new(
        longitudinal: Matrix3<f64>,
        slow_transverse: Matrix3<f64>,
        fast_transverse: Matrix3<f64>,
    ) -> Result<Self> {
        for (mode, m) in Mode::ALL
            .iter()
            .zip([&longitudinal, &slow_transverse, &fast_transverse])
        {
            validate_tensor(m).map_err(|e| anyhow!("tensor for mode {}: {}", mode, e))?;
        }
        Ok(Self {
            longitudinal,
            slow_transverse,
            fast_transverse,
        })
    }

    /// Same tensor for all three modes.
    pub fn uniform(m: Matrix3<f64>) -> Result<Self> {
        Self::new(m, m, m)
    }

    fn tensor(&self, mode: Mode) -> &Matrix3<f64> {
        match mode {
            Mode::Longitudinal => &self.longitudinal,
            Mode::SlowTransverse => &self.slow_transverse,
            Mode::FastTransverse => &self.fast_transverse,
        }
    }
}

impl Lattice for TensorLattice {
    fn group_velocity_dir(&self, mode: Mode, k: &Vector3<f64>) -> Vector3<f64> {
        vector::unit(&(self.tensor(mode) * k)).unwrap_or_else(Vector3::zeros)
    }
}

fn validate_tensor(m: &Matrix3<f64>) -> Result<()> {
    if (m - m.transpose()).amax() > 1e-9 {
        return Err(anyhow!("tensor is not symmetric"));
    }
    if m.cholesky().is_none() {
        return Err(anyhow!("tensor is not positive definite"));
    }
    Ok(())
}

/// Lattice selection as it appears in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LatticeSpec {
    Isotropic,
    Tensor {
        longitudinal: [[f64; 3]; 3],
        slow_transverse: [[f64; 3]; 3],
        fast_transverse: [[f64; 3]; 3],
    },
}

impl LatticeSpec {
    pub fn build(&self) -> Result<Box<dyn Lattice>> {
        match self {
            LatticeSpec::Isotropic => Ok(Box::new(IsotropicLattice)),
            LatticeSpec::Tensor {
                longitudinal,
                slow_transverse,
                fast_transverse,
            } => Ok(Box::new(TensorLattice::new(
                rows_to_matrix(longitudinal),
                rows_to_matrix(slow_transverse),
                rows_to_matrix(fast_transverse),
            )?)),
        }
    }
}

fn rows_to_matrix(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| rows[i][j])
}
