use nalgebra::{Matrix3, Point3, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

use phonon_boundary::{
    boundary::{select_outcome, BoundaryError, BoundaryProcess, Outcome, OutcomeKind},
    decay::AnharmonicDecay,
    geom::{Cylinder, Polyhedron, Surface},
    lattice::{IsotropicLattice, Lattice, TensorLattice},
    mode::Mode,
    phonon::{Collision, Frame, Phonon},
    settings,
    specular::{naive_reflection, SpecularSolver},
    surface::{MaterialPair, ProbabilityCurve, ReflectionProbs, SurfaceProperty, SurfaceTable},
    transport::Simulation,
};

fn pair() -> MaterialPair {
    MaterialPair::new("Ge", "Vacuum")
}

fn table(specular: f64, diffuse: f64, decay: f64) -> SurfaceTable {
    let mut table = SurfaceTable::new();
    table
        .insert(
            pair(),
            SurfaceProperty {
                specular: ProbabilityCurve::Constant(specular),
                diffuse: ProbabilityCurve::Constant(diffuse),
                decay: ProbabilityCurve::Constant(decay),
                ..SurfaceProperty::default()
            },
        )
        .unwrap();
    table
}

fn skewed_lattice() -> TensorLattice {
    let l = Matrix3::new(1.0, 0.0, 0.2, 0.0, 1.0, 0.0, 0.2, 0.0, 1.0);
    let st = Matrix3::new(1.0, 0.0, 0.8, 0.0, 1.0, 0.0, 0.8, 0.0, 1.0);
    let ft = Matrix3::new(1.0, 0.3, 0.0, 0.3, 1.0, 0.0, 0.0, 0.0, 1.0);
    TensorLattice::new(l, st, ft).unwrap()
}

#[test]
fn mirror_reflection_at_45_degrees() {
    let lattice = IsotropicLattice;
    let solid = Polyhedron::cuboid([10.0, 10.0, 10.0]);
    let solver = SpecularSolver::new(&lattice, &solid);
    let hit = Collision::new(
        Point3::new(0.0, 0.0, 10.0),
        Vector3::z(),
        Frame::identity(),
        pair(),
    );
    let k = Vector3::new(1.0, 0.0, 1.0).normalize();

    let expected = Vector3::new(1.0, 0.0, -1.0).normalize();
    assert!((naive_reflection(&k, &hit.normal) - expected).norm() < 1e-12);

    let result = solver.solve(&k, &hit, Mode::Longitudinal).unwrap();
    assert!((result.direction - expected).norm() < 1e-12);
    assert_eq!(result.attempts, 0);
    assert!(lattice.velocity_is_inward(Mode::Longitudinal, &result.direction, &hit.normal));
}

#[test]
fn equal_specular_and_diffuse_split() {
    let probs = ReflectionProbs::new(0.3, 0.3, 0.0).normalized().unwrap();
    assert!((probs.specular - 0.5).abs() < 1e-12);
    assert!((probs.diffuse - 0.5).abs() < 1e-12);
    assert_eq!(probs.decay, 0.0);
    assert_eq!(select_outcome(&probs, 0.4), OutcomeKind::Specular);
}

#[test]
fn zero_probabilities_are_a_configuration_error() {
    let lattice = IsotropicLattice;
    let solid = Polyhedron::cuboid([1.0, 1.0, 1.0]);
    let probs = table(0.0, 0.0, 0.0);
    let decay = AnharmonicDecay::default();
    let process = BoundaryProcess::new(&lattice, &solid, &probs, &decay);
    let hit = Collision::new(Point3::new(0.0, 0.0, 1.0), Vector3::z(), Frame::identity(), pair());
    let phonon = Phonon::new(Mode::Longitudinal, Vector3::new(0.0, 1.0, 1.0), 1.0);
    let mut rng = StdRng::seed_from_u64(0);

    let err = process.resolve(&phonon, &hit, &mut rng).unwrap_err();
    assert!(matches!(err, BoundaryError::Configuration { .. }));
    assert!(err.to_string().contains("Ge -> Vacuum"));
}

#[test]
fn anisotropic_specular_never_leaks_outward() {
    let lattice = skewed_lattice();
    let solid = Cylinder::new(10.0, 2.0);
    let probs = table(1.0, 0.0, 0.0);
    let decay = AnharmonicDecay::default();
    let process = BoundaryProcess::new(&lattice, &solid, &probs, &decay);
    let mut rng = StdRng::seed_from_u64(17);

    let mut walked = 0;
    for _ in 0..300 {
        // close enough to the rim for some walks to reach it
        let r = rng.random_range(9.0..9.9);
        let phi = rng.random_range(0.0..std::f64::consts::TAU);
        let point = Point3::new(r * phi.cos(), r * phi.sin(), 2.0);
        let hit = Collision::new(point, Vector3::z(), Frame::identity(), pair());

        let mode = Mode::ALL[rng.random_range(0..3)];
        let k = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(0.05..1.0),
        );
        let phonon = Phonon::new(mode, k * 100.0, 1.0);

        match process.reflect(&phonon, &hit, &mut rng) {
            Ok(Outcome::ReflectedSpecular {
                wavevector,
                point,
                normal,
            }) => {
                assert!((wavevector.norm() - phonon.wavevector.norm()).abs() < 1e-9);
                assert!(solid.contains(&point));
                assert!(lattice.velocity_is_inward(mode, &wavevector, &normal));
                assert!(lattice.velocity_is_inward(mode, &wavevector, &hit.normal));
                if point != hit.point {
                    walked += 1;
                }
            }
            Ok(other) => panic!("unexpected outcome {:?}", other),
            Err(err) => {
                assert!(!err.is_fatal());
                assert_eq!(err.kind(), Some(OutcomeKind::Specular));
            }
        }
    }
    assert!(walked > 0);
}

#[test]
fn default_configuration_runs_end_to_end() {
    let mut settings = settings::load_default_config().unwrap();
    settings.num_phonons = 50;
    settings.seed = Some(2024);

    let mut simulation = Simulation::new(settings).unwrap();
    simulation.run().unwrap();
    let tally = &simulation.tally;

    assert_eq!(tally.phonons, 50);
    assert!(tally.hits >= tally.phonons);
    // every track ends either absorbed or by decaying into two daughters
    assert_eq!(tally.phonons + tally.daughters, tally.absorbed + tally.decays);
    assert_eq!(tally.daughters, 2 * tally.decays);
}
