//! Boundary interaction engine.
//!
//! [`BoundaryProcess`] decides what happens to a phonon that reaches a boundary
//! and has not been absorbed by the upstream [`absorbs`] test: anharmonic decay,
//! specular reflection or diffuse reflection. The channel probabilities come
//! from a [`ProbabilitySource`], are normalized, and a single uniform draw picks
//! the channel by cumulative bands (decay, then specular, then diffuse).
//!
//! Every direction handed back has an inward group velocity. When no such
//! direction can be found the call fails with a [`BoundaryError`];
//! [`BoundaryProcess::resolve`] turns the non-fatal failures into
//! [`Outcome::Absorbed`] after logging a diagnostic.

use std::fmt;

use log::{debug, warn};
use nalgebra::{Point3, Vector3};
use rand::{Rng, RngCore};
use serde::Serialize;
use thiserror::Error;

use crate::decay::Decay;
use crate::diffuse::DiffuseSampler;
use crate::geom::Surface;
use crate::lattice::Lattice;
use crate::mode::Mode;
use crate::phonon::{Collision, Phonon};
use crate::specular::SpecularSolver;
use crate::surface::{MaterialPair, ProbabilitySource, ReflectionProbs, SurfaceProperty};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decay::AnharmonicDecay;
    use crate::geom::Polyhedron;
    use crate::lattice::IsotropicLattice;
    use crate::phonon::Frame;
    use anyhow::Result;
    use rand::{rngs::StdRng, SeedableRng};

    struct Fixed(ReflectionProbs);

    impl ProbabilitySource for Fixed {
        fn probabilities(&self, _pair: &MaterialPair, _freq: f64) -> Result<ReflectionProbs> {
            Ok(self.0)
        }
    }

    struct AlwaysOutward;

    impl Lattice for AlwaysOutward {
        fn group_velocity_dir(&self, _mode: Mode, _k: &Vector3<f64>) -> Vector3<f64> {
            Vector3::z()
        }
    }

    /// Group velocity fixed at (-1, 0, 1): inward through an x facet, outward through the top.
    struct Sideways;

    impl Lattice for Sideways {
        fn group_velocity_dir(&self, _mode: Mode, _k: &Vector3<f64>) -> Vector3<f64> {
            Vector3::new(-1.0, 0.0, 1.0).normalize()
        }
    }

    /// Isotropic for one mode; every other mode runs straight out along +z.
    struct OnlyMode(Mode);

    impl Lattice for OnlyMode {
        fn group_velocity_dir(&self, mode: Mode, k: &Vector3<f64>) -> Vector3<f64> {
            if mode == self.0 {
                k.normalize()
            } else {
                Vector3::z()
            }
        }
    }

    fn hit() -> Collision {
        Collision::new(
            Point3::new(0.5, -1.0, 10.0),
            Vector3::z(),
            Frame::identity(),
            MaterialPair::new("Ge", "Vacuum"),
        )
    }

    fn incident() -> Phonon {
        Phonon::new(Mode::SlowTransverse, Vector3::new(2.0, 0.0, 2.0), 1.5)
    }

    #[test]
    fn equal_specular_and_diffuse_at_0_4_is_specular() {
        let probs = ReflectionProbs::new(0.3, 0.3, 0.0).normalized().unwrap();
        assert_eq!(select_outcome(&probs, 0.4), OutcomeKind::Specular);
        assert_eq!(select_outcome(&probs, 0.0), OutcomeKind::Specular);
        assert_eq!(select_outcome(&probs, 0.5), OutcomeKind::Diffuse);
    }

    #[test]
    fn bands_partition_unit_interval() {
        let probs = ReflectionProbs::new(0.4, 1.0, 0.6).normalized().unwrap();
        // decay [0, 0.3), specular [0.3, 0.5), diffuse [0.5, 1)
        let n = 10_000;
        let mut counts = [0usize; 3];
        for i in 0..n {
            let r = i as f64 / n as f64;
            counts[select_outcome(&probs, r) as usize] += 1;
        }
        assert_eq!(counts.iter().sum::<usize>(), n);
        assert!((counts[0] as f64 / n as f64 - 0.3).abs() < 1e-3);
        assert!((counts[1] as f64 / n as f64 - 0.2).abs() < 1e-3);
        assert!((counts[2] as f64 / n as f64 - 0.5).abs() < 1e-3);

        assert_eq!(select_outcome(&probs, 0.3 - 1e-12), OutcomeKind::Decay);
        assert_eq!(select_outcome(&probs, 0.3 + 1e-12), OutcomeKind::Specular);
        assert_eq!(select_outcome(&probs, 1.0 - 1e-12), OutcomeKind::Diffuse);
    }

    #[test]
    fn zero_probability_sum_is_fatal() {
        let lattice = IsotropicLattice;
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let source = Fixed(ReflectionProbs::new(0.0, 0.0, 0.0));
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(0);

        let err = process.reflect(&incident(), &hit(), &mut rng).unwrap_err();
        assert!(matches!(err, BoundaryError::Configuration { sum, .. } if sum == 0.0));
        assert!(err.is_fatal());
        assert_eq!(err.kind(), None);
        assert!(process.resolve(&incident(), &hit(), &mut rng).is_err());
    }

    #[test]
    fn missing_surface_property_is_fatal() {
        struct Empty;
        impl ProbabilitySource for Empty {
            fn probabilities(&self, pair: &MaterialPair, _freq: f64) -> Result<ReflectionProbs> {
                Err(anyhow::anyhow!("no surface property for boundary {}", pair))
            }
        }
        let lattice = IsotropicLattice;
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &Empty, &decay);
        let mut rng = StdRng::seed_from_u64(0);
        let err = process.resolve(&incident(), &hit(), &mut rng).unwrap_err();
        assert!(matches!(err, BoundaryError::Probability(_)));
    }

    #[test]
    fn specular_keeps_magnitude_and_point() {
        let lattice = IsotropicLattice;
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let source = Fixed(ReflectionProbs::new(1.0, 0.0, 0.0));
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(5);

        match process.reflect(&incident(), &hit(), &mut rng).unwrap() {
            Outcome::ReflectedSpecular {
                wavevector,
                point,
                normal,
            } => {
                assert!((wavevector - Vector3::new(2.0, 0.0, -2.0)).norm() < 1e-12);
                assert_eq!(point, hit().point);
                assert_eq!(normal, hit().normal);
            }
            other => panic!("expected specular, got {:?}", other),
        }
    }

    #[test]
    fn diffuse_is_inward() {
        let lattice = IsotropicLattice;
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let source = Fixed(ReflectionProbs::new(0.0, 2.0, 0.0));
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(9);

        for _ in 0..100 {
            match process.reflect(&incident(), &hit(), &mut rng).unwrap() {
                Outcome::ReflectedDiffuse { wavevector } => {
                    assert!((wavevector.norm() - incident().wavevector.norm()).abs() < 1e-12);
                    assert!(wavevector.z <= 0.0);
                }
                other => panic!("expected diffuse, got {:?}", other),
            }
        }
    }

    #[test]
    fn decay_daughters_leave_inward() {
        let lattice = IsotropicLattice;
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let source = Fixed(ReflectionProbs::new(0.0, 0.0, 0.1));
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(13);
        let parent = incident();

        match process.reflect(&parent, &hit(), &mut rng).unwrap() {
            Outcome::DecayedInto([a, b]) => {
                assert!((a.energy + b.energy - parent.energy).abs() < 1e-12);
                assert!(a.wavevector.z <= 0.0 && b.wavevector.z <= 0.0);
                assert!(a.mode.is_transverse() && b.mode.is_transverse());
            }
            other => panic!("expected decay, got {:?}", other),
        }
    }

    #[test]
    fn decay_daughters_are_checked_with_the_parent_mode() {
        let lattice = OnlyMode(Mode::Longitudinal);
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let source = Fixed(ReflectionProbs::new(0.0, 0.0, 1.0));
        // longitudinal parents always go to two transverse daughters
        let decay = AnharmonicDecay::new(0.05, 0.0).unwrap();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(31);
        let parent = Phonon::new(Mode::Longitudinal, Vector3::new(1.0, 0.0, 2.0), 2.0);

        for _ in 0..20 {
            match process.reflect(&parent, &hit(), &mut rng).unwrap() {
                Outcome::DecayedInto(daughters) => {
                    for daughter in &daughters {
                        assert!(daughter.mode.is_transverse());
                        assert!(daughter.wavevector.z < 0.0);
                        // the daughter's own mode would have been rejected
                        assert!(!lattice.velocity_is_inward(
                            daughter.mode,
                            &daughter.wavevector,
                            &hit().normal
                        ));
                    }
                }
                other => panic!("expected decay, got {:?}", other),
            }
        }
    }

    #[test]
    fn walked_specular_must_leave_the_hit_face() {
        let lattice = Sideways;
        let solid = Polyhedron::cuboid([100.0, 100.0, 100.0]);
        let source = Fixed(ReflectionProbs::new(1.0, 0.0, 0.0));
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(4);
        let hit = Collision::new(
            Point3::new(99.5, 0.0, 100.0),
            Vector3::z(),
            Frame::identity(),
            MaterialPair::new("Ge", "Vacuum"),
        );
        let phonon = Phonon::new(Mode::Longitudinal, Vector3::new(1.0, 0.0, 0.3), 1.0);

        // the walk reaches the x facet, where the direction is inward
        let walked = SpecularSolver::new(&lattice, &solid)
            .solve(&phonon.wavevector, &hit, phonon.mode)
            .unwrap();
        assert!(walked.attempts > 0);
        assert!((walked.normal - Vector3::x()).norm() < 1e-9);

        // but it still points out through the top face that was hit
        let err = process.reflect(&phonon, &hit, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            BoundaryError::InvalidPostCondition {
                kind: OutcomeKind::Specular,
                mode: Mode::Longitudinal
            }
        ));
        assert_eq!(
            process.resolve(&phonon, &hit, &mut rng).unwrap(),
            Outcome::Absorbed
        );
    }

    #[test]
    fn outward_diffuse_is_absorbed_on_resolve() {
        let lattice = AlwaysOutward;
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let source = Fixed(ReflectionProbs::new(0.0, 1.0, 0.0));
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(21);

        let err = process.reflect(&incident(), &hit(), &mut rng).unwrap_err();
        assert!(matches!(
            err,
            BoundaryError::InvalidPostCondition {
                kind: OutcomeKind::Diffuse,
                mode: Mode::SlowTransverse
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(err.kind(), Some(OutcomeKind::Diffuse));
        assert_eq!(
            process.resolve(&incident(), &hit(), &mut rng).unwrap(),
            Outcome::Absorbed
        );
    }

    #[test]
    fn failed_specular_walk_is_absorbed_on_resolve() {
        let lattice = AlwaysOutward;
        let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
        let source = Fixed(ReflectionProbs::new(1.0, 0.0, 0.0));
        let decay = AnharmonicDecay::default();
        let process = BoundaryProcess::new(&lattice, &solid, &source, &decay);
        let mut rng = StdRng::seed_from_u64(2);

        let err = process.reflect(&incident(), &hit(), &mut rng).unwrap_err();
        assert_eq!(err.kind(), Some(OutcomeKind::Specular));
        assert!(matches!(err, BoundaryError::Convergence { .. }));
        assert_eq!(
            process.resolve(&incident(), &hit(), &mut rng).unwrap(),
            Outcome::Absorbed
        );
    }

    #[test]
    fn absorption_threshold() {
        let mut rng = StdRng::seed_from_u64(1);
        let property = SurfaceProperty {
            absorption_prob: 1.0,
            absorption_min_k: 0.5,
            ..SurfaceProperty::default()
        };
        let normal = Vector3::z();
        assert!(absorbs(&property, &Vector3::new(0.1, 0.0, 1.0), &normal, &mut rng));
        assert!(!absorbs(&property, &Vector3::new(1.0, 0.0, 0.1), &normal, &mut rng));

        let never = SurfaceProperty::default();
        assert!(!absorbs(&never, &Vector3::new(0.0, 0.0, 9.0), &normal, &mut rng));
    }
}

/// Reflection channel picked for one boundary hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Decay = 0,
    Specular = 1,
    Diffuse = 2,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeKind::Decay => "decay",
            OutcomeKind::Specular => "specular",
            OutcomeKind::Diffuse => "diffuse",
        };
        write!(f, "{}", name)
    }
}

/// What the transport loop should do with the phonon.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Absorbed,
    /// Two daughters starting at the collision point; the parent is killed.
    DecayedInto([Phonon; 2]),
    /// New wavevector and the (possibly walked) global reflection point,
    /// with the outward normal there.
    ReflectedSpecular {
        wavevector: Vector3<f64>,
        point: Point3<f64>,
        normal: Vector3<f64>,
    },
    ReflectedDiffuse {
        wavevector: Vector3<f64>,
    },
}

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("reflection probabilities for {pair} sum to {sum}")]
    Configuration { pair: MaterialPair, sum: f64 },
    #[error(transparent)]
    Probability(#[from] anyhow::Error),
    #[error("specular surface walk for mode {mode} failed after {attempts} attempts")]
    Convergence { mode: Mode, attempts: usize },
    #[error("{kind} reflection of mode {mode} has no inward group velocity")]
    InvalidPostCondition { kind: OutcomeKind, mode: Mode },
}

impl BoundaryError {
    /// Fatal errors come from bad configuration and should stop the run.
    /// The rest only terminate the phonon concerned.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BoundaryError::Configuration { .. } | BoundaryError::Probability(_)
        )
    }

    /// Channel that failed, for the errors that terminate a single phonon.
    /// Fatal errors arise before a channel is picked and have none.
    pub fn kind(&self) -> Option<OutcomeKind> {
        match self {
            BoundaryError::InvalidPostCondition { kind, .. } => Some(*kind),
            BoundaryError::Convergence { .. } => Some(OutcomeKind::Specular),
            BoundaryError::Configuration { .. } | BoundaryError::Probability(_) => None,
        }
    }
}

/// Picks a channel from normalized probabilities and a uniform `r` in [0, 1).
pub fn select_outcome(probs: &ReflectionProbs, r: f64) -> OutcomeKind {
    if r < probs.decay {
        OutcomeKind::Decay
    } else if r < probs.decay + probs.specular {
        OutcomeKind::Specular
    } else {
        OutcomeKind::Diffuse
    }
}

/// Upstream absorption test at a boundary.
pub fn absorbs(
    property: &SurfaceProperty,
    k: &Vector3<f64>,
    normal: &Vector3<f64>,
    rng: &mut dyn RngCore,
) -> bool {
    rng.random::<f64>() < property.absorption_prob && k.dot(normal).abs() > property.absorption_min_k
}

/// The boundary engine, wired to its collaborators.
pub struct BoundaryProcess<'a> {
    lattice: &'a dyn Lattice,
    surface: &'a dyn Surface,
    probabilities: &'a dyn ProbabilitySource,
    decay: &'a dyn Decay,
}

impl<'a> BoundaryProcess<'a> {
    pub fn new(
        lattice: &'a dyn Lattice,
        surface: &'a dyn Surface,
        probabilities: &'a dyn ProbabilitySource,
        decay: &'a dyn Decay,
    ) -> Self {
        Self {
            lattice,
            surface,
            probabilities,
            decay,
        }
    }

    /// Normalized channel probabilities for this boundary at the phonon's frequency.
    pub fn probabilities(
        &self,
        phonon: &Phonon,
        pair: &MaterialPair,
    ) -> Result<ReflectionProbs, BoundaryError> {
        self.probabilities
            .probabilities(pair, phonon.frequency())?
            .normalized()
            .map_err(|sum| BoundaryError::Configuration {
                pair: pair.clone(),
                sum,
            })
    }

    /// Resolves one boundary hit. Errors are returned as-is; see [`Self::resolve`].
    pub fn reflect(
        &self,
        phonon: &Phonon,
        collision: &Collision,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, BoundaryError> {
        let probs = self.probabilities(phonon, &collision.materials)?;
        let kind = select_outcome(&probs, rng.random::<f64>());
        debug!(
            "mode {} at {:.3} THz on {}: {}",
            phonon.mode,
            phonon.frequency(),
            collision.materials,
            kind
        );

        match kind {
            OutcomeKind::Decay => self.decay_into(phonon, collision, rng),
            OutcomeKind::Specular => self.specular(phonon, collision),
            OutcomeKind::Diffuse => self.diffuse(phonon, collision, rng),
        }
    }

    /// Like [`Self::reflect`], but a failed reflection terminates the phonon
    /// instead of erroring. Only fatal errors are returned.
    pub fn resolve(
        &self,
        phonon: &Phonon,
        collision: &Collision,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, BoundaryError> {
        self.reflect(phonon, collision, rng)
            .or_else(|err| terminate(err, phonon.mode))
    }

    fn specular(&self, phonon: &Phonon, collision: &Collision) -> Result<Outcome, BoundaryError> {
        let solver = SpecularSolver::new(self.lattice, self.surface);
        let reflection = solver
            .solve(&phonon.wavevector, collision, phonon.mode)
            .map_err(|failure| BoundaryError::Convergence {
                mode: phonon.mode,
                attempts: failure.attempts,
            })?;

        // the walked direction must also leave the face that was hit
        self.check_inward(
            OutcomeKind::Specular,
            phonon.mode,
            &reflection.direction,
            &collision.normal,
        )?;
        Ok(Outcome::ReflectedSpecular {
            wavevector: reflection.direction * phonon.wavevector.norm(),
            point: reflection.point,
            normal: reflection.normal,
        })
    }

    fn diffuse(
        &self,
        phonon: &Phonon,
        collision: &Collision,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, BoundaryError> {
        let draw = DiffuseSampler::new(self.lattice).sample(&collision.normal, phonon.mode, rng);
        self.check_inward(
            OutcomeKind::Diffuse,
            phonon.mode,
            &draw.direction,
            &collision.normal,
        )?;
        Ok(Outcome::ReflectedDiffuse {
            wavevector: draw.direction * phonon.wavevector.norm(),
        })
    }

    /// Daughters get independent Lambertian directions, checked against the
    /// parent's mode.
    fn decay_into(
        &self,
        phonon: &Phonon,
        collision: &Collision,
        rng: &mut dyn RngCore,
    ) -> Result<Outcome, BoundaryError> {
        let daughters = self.decay.decay(phonon, rng);
        let sampler = DiffuseSampler::new(self.lattice);

        let mut out = daughters.clone();
        for (slot, daughter) in out.iter_mut().zip(daughters.iter()) {
            let draw = sampler.sample(&collision.normal, phonon.mode, rng);
            self.check_inward(
                OutcomeKind::Decay,
                phonon.mode,
                &draw.direction,
                &collision.normal,
            )?;
            *slot = daughter.with_direction(&draw.direction);
        }
        Ok(Outcome::DecayedInto(out))
    }

    fn check_inward(
        &self,
        kind: OutcomeKind,
        mode: Mode,
        direction: &Vector3<f64>,
        normal: &Vector3<f64>,
    ) -> Result<(), BoundaryError> {
        if self.lattice.velocity_is_inward(mode, direction, normal) {
            Ok(())
        } else {
            Err(BoundaryError::InvalidPostCondition { kind, mode })
        }
    }
}

/// Turns a non-fatal engine error into an absorbed phonon, with a diagnostic.
pub fn terminate(err: BoundaryError, mode: Mode) -> Result<Outcome, BoundaryError> {
    let Some(kind) = err.kind() else {
        return Err(err);
    };
    warn!(
        "Phonon {} reflection failed; mode at time of death: {}",
        kind,
        mode.label()
    );
    debug!("{}", err);
    Ok(Outcome::Absorbed)
}
