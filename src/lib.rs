//! Phonon collisions with crystal boundaries.
//!
//! The boundary engine lives in [`boundary`], with the specular surface walk in
//! [`specular`], its facet-edge step in [`edge`] and Lambertian sampling in
//! [`diffuse`]. The dispersion relation, the solid and the surface tables are
//! collaborators behind the [`lattice::Lattice`], [`geom::Surface`] and
//! [`surface::ProbabilitySource`] traits. [`transport`] runs a parallel
//! Monte Carlo over many phonons on top of the engine.

pub mod boundary;
pub mod config;
pub mod decay;
pub mod diffuse;
pub mod edge;
pub mod geom;
pub mod lattice;
pub mod mode;
pub mod output;
pub mod phonon;
pub mod settings;
pub mod specular;
pub mod surface;
pub mod tally;
pub mod transport;
pub mod vector;
