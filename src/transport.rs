//! A small transport loop that drives the boundary engine.
//!
//! Each primary phonon starts at the solid's local origin with an isotropic
//! wavevector and flies along its group velocity to the boundary. At every hit
//! the absorption test runs first, then [`BoundaryProcess::reflect`] decides
//! what happens next. Decay daughters are queued and tracked from the
//! collision point with the parent's reflection count.
//!
//! Phonons are independent, so the run is split across rayon workers. Every
//! primary gets its own [`StdRng`] seeded from the run seed and its index,
//! which keeps a run reproducible regardless of thread scheduling.

use std::f64::consts::PI;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use nalgebra::{Point3, Vector3};
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, UnitSphere};
use rayon::prelude::*;

use crate::boundary::{absorbs, terminate, BoundaryError, BoundaryProcess, Outcome};
use crate::config::{H_PLANCK, MAX_TRACK_HITS};
use crate::geom::Surface;
use crate::lattice::Lattice;
use crate::mode::Mode;
use crate::phonon::{Collision, Frame, Phonon};
use crate::settings::{validate_config, Settings};
use crate::surface::{MaterialPair, SurfaceTable};
use crate::tally::Tally;


/// Wavenumber in 1/mm for a frequency in THz and a phase velocity in m/s.
pub fn wavenumber(frequency: f64, sound_speed: f64) -> f64 {
    2.0 * PI * frequency * 1e9 / sound_speed
}

/// A configured run: solid, lattice, boundary table and accumulated tally.
pub struct Simulation {
    pub settings: Settings,
    pub seed: u64,
    pub tally: Tally,
    lattice: Box<dyn Lattice>,
    solid: Box<dyn Surface>,
    table: SurfaceTable,
    frame: Frame,
    pair: MaterialPair,
}

impl Simulation {
    pub fn new(settings: Settings) -> Result<Self> {
        validate_config(&settings)?;
        let lattice = settings.lattice.build().context("building lattice")?;
        let solid = settings.solid.build().context("building solid")?;
        let pair = settings.materials.pair();
        let mut table = SurfaceTable::new();
        table.insert(pair.clone(), settings.surface.clone())?;
        let frame = Frame::from_euler(&settings.orientation, Vector3::from(settings.position));
        let seed = settings.seed.unwrap_or_else(|| rand::rng().random());

        Ok(Self {
            settings,
            seed,
            tally: Tally::new(),
            lattice,
            solid,
            table,
            frame,
            pair,
        })
    }

    /// Tracks every primary phonon in parallel and sums the per-track tallies.
    /// Fatal boundary errors abort the run.
    pub fn run(&mut self) -> Result<()> {
        let start = Instant::now();
        let n = self.settings.num_phonons;
        info!("Launching {} phonons with seed {}", n, self.seed);

        let pb = ProgressBar::new(n as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>7}/{len:7} {msg} ETA: {eta_precise}",
            )?
            .progress_chars("█▇▆▅▄▃▂▁"),
        );
        pb.set_message("phonons");

        let this = &*self;
        let tally = (0..n)
            .into_par_iter()
            .map(|index| {
                let tally = this.track(index);
                pb.inc(1);
                tally
            })
            .try_reduce(Tally::new, |acc, item| Ok(acc + item));
        pb.finish_and_clear();

        self.tally = tally?;
        info!("Time taken: {:.2?}", start.elapsed());
        Ok(())
    }

    fn process(&self) -> BoundaryProcess<'_> {
        BoundaryProcess::new(
            self.lattice.as_ref(),
            self.solid.as_ref(),
            &self.table,
            &self.settings.decay,
        )
    }

    /// Tracks one primary and all of its decay products.
    fn track(&self, index: usize) -> Result<Tally, BoundaryError> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
        let process = self.process();
        let mut tally = Tally::new();
        tally.phonons = 1;

        let origin = self.frame.to_global_point(&Point3::origin());
        let mut queue = vec![(self.launch(&mut rng), origin, 0)];
        while let Some((phonon, position, reflections)) = queue.pop() {
            self.propagate(
                &process,
                phonon,
                position,
                reflections,
                &mut queue,
                &mut tally,
                &mut rng,
            )?;
        }
        Ok(tally)
    }

    fn launch(&self, rng: &mut dyn RngCore) -> Phonon {
        let mode = self
            .settings
            .mode
            .unwrap_or_else(|| Mode::ALL[rng.random_range(0..Mode::ALL.len())]);
        let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
        let k = wavenumber(self.settings.energy / H_PLANCK, self.settings.sound_speed);
        Phonon::new(mode, Vector3::new(x, y, z) * k, self.settings.energy)
    }

    /// Moves a phonon from boundary to boundary until its track ends.
    #[allow(clippy::too_many_arguments)]
    fn propagate(
        &self,
        process: &BoundaryProcess<'_>,
        mut phonon: Phonon,
        mut position: Point3<f64>,
        mut reflections: usize,
        queue: &mut Vec<(Phonon, Point3<f64>, usize)>,
        tally: &mut Tally,
        rng: &mut dyn RngCore,
    ) -> Result<(), BoundaryError> {
        let limit = self
            .settings
            .surface
            .max_reflections
            .unwrap_or(MAX_TRACK_HITS);

        loop {
            let Some(collision) = self.next_collision(&phonon, &position) else {
                warn!(
                    "Phonon of mode {} found no boundary from {:?}",
                    phonon.mode.label(),
                    position.coords.as_slice()
                );
                tally.absorbed += 1;
                return Ok(());
            };
            tally.hits += 1;

            if absorbs(&self.settings.surface, &phonon.wavevector, &collision.normal, rng) {
                tally.absorbed += 1;
                return Ok(());
            }
            if reflections >= limit {
                debug!("track reached {} reflections", reflections);
                tally.reflection_limit += 1;
                tally.absorbed += 1;
                return Ok(());
            }

            let outcome = match process.reflect(&phonon, &collision, rng) {
                Ok(outcome) => outcome,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tally.record_failure(&err);
                    terminate(err, phonon.mode)?;
                    return Ok(());
                }
            };
            tally.record(&outcome);
            reflections += 1;

            match outcome {
                Outcome::Absorbed => return Ok(()),
                Outcome::DecayedInto(daughters) => {
                    queue.extend(
                        daughters
                            .into_iter()
                            .map(|daughter| (daughter, collision.point, reflections)),
                    );
                    return Ok(());
                }
                Outcome::ReflectedSpecular { wavevector, point, .. } => {
                    if point != collision.point {
                        tally.walked += 1;
                    }
                    phonon.wavevector = wavevector;
                    position = point;
                }
                Outcome::ReflectedDiffuse { wavevector } => {
                    tally.record_diffuse_cosine(-wavevector.normalize().dot(&collision.normal));
                    phonon.wavevector = wavevector;
                    position = collision.point;
                }
            }
        }
    }

    /// Next boundary hit along the group velocity, in global coordinates.
    fn next_collision(&self, phonon: &Phonon, position: &Point3<f64>) -> Option<Collision> {
        let velocity = self
            .lattice
            .group_velocity_dir(phonon.mode, &phonon.wavevector);
        let local = self.frame.to_local_point(position);
        let direction = self.frame.to_local_dir(&velocity);

        let distance = self.solid.distance_to_out(&local, &direction);
        if !distance.is_finite() {
            return None;
        }
        let hit = local + distance * direction;
        let normal = self.solid.normal(&hit);

        Some(Collision::new(
            self.frame.to_global_point(&hit),
            self.frame.to_global_dir(&normal),
            self.frame,
            self.pair.clone(),
        ))
    }
}
