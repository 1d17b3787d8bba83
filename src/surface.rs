//! Boundary surface properties and reflection probabilities.
//!
//! Each pair of materials meeting at a boundary has a [`SurfaceProperty`]: an
//! absorption model plus three frequency-dependent probability curves for
//! specular reflection, diffuse reflection and anharmonic decay. The curves
//! come from empirical fits and need not sum to one at a given frequency, so
//! callers normalize them with [`ReflectionProbs::normalized`] before use.
//!
//! # Curves
//!
//! - [`ProbabilityCurve::Constant`]: frequency independent
//! - [`ProbabilityCurve::Polynomial`]: ascending-power polynomial in THz, zero
//!   at and above a cutoff frequency
//! - [`ProbabilityCurve::Table`]: linear interpolation of measured points

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use itertools::Itertools;
use ndarray::{Array1, Ix1, OwnedRepr};
use ndarray_interp::interp1d::{Interp1D, Interp1DBuilder, Linear};
use serde::{Deserialize, Serialize};


/// Name of a material on one side of a boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub String);

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered pair of materials: the phonon travels in `incident` and meets `transmitted`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialPair {
    pub incident: MaterialId,
    pub transmitted: MaterialId,
}

impl MaterialPair {
    pub fn new(incident: &str, transmitted: &str) -> Self {
        Self {
            incident: MaterialId(incident.to_string()),
            transmitted: MaterialId(transmitted.to_string()),
        }
    }
}

impl fmt::Display for MaterialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.incident, self.transmitted)
    }
}

/// Probability of each reflection channel at one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReflectionProbs {
    pub specular: f64,
    pub diffuse: f64,
    pub decay: f64,
}

impl ReflectionProbs {
    pub fn new(specular: f64, diffuse: f64, decay: f64) -> Self {
        Self {
            specular,
            diffuse,
            decay,
        }
    }

    pub fn sum(&self) -> f64 {
        self.specular + self.diffuse + self.decay
    }

    /// Divides each channel by the total. Returns the offending sum as the
    /// error if it is not positive (or not finite), or a channel is negative.
    pub fn normalized(&self) -> std::result::Result<Self, f64> {
        let norm = self.sum();
        let negative = [self.specular, self.diffuse, self.decay]
            .iter()
            .any(|&p| p < 0.0);
        if !(norm > 0.0) || !norm.is_finite() || negative {
            return Err(norm);
        }
        Ok(Self {
            specular: self.specular / norm,
            diffuse: self.diffuse / norm,
            decay: self.decay / norm,
        })
    }
}

/// A probability as a function of phonon frequency in THz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityCurve {
    Constant(f64),
    Polynomial { coeffs: Vec<f64>, cutoff: f64 },
    Table(ProbabilityTable),
}

impl ProbabilityCurve {
    pub fn eval(&self, freq: f64) -> Result<f64> {
        match self {
            ProbabilityCurve::Constant(p) => Ok(*p),
            ProbabilityCurve::Polynomial { coeffs, cutoff } => {
                if freq >= *cutoff {
                    return Ok(0.0);
                }
                // Horner's scheme, coefficients in ascending powers
                Ok(coeffs.iter().rev().fold(0.0, |acc, c| acc * freq + c))
            }
            ProbabilityCurve::Table(table) => table.eval(freq),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ProbabilityCurve::Constant(p) if *p < 0.0 => {
                Err(anyhow!("constant probability must be non-negative"))
            }
            ProbabilityCurve::Polynomial { coeffs, .. } if coeffs.is_empty() => {
                Err(anyhow!("polynomial needs at least one coefficient"))
            }
            // tables are checked when they are built
            _ => Ok(()),
        }
    }
}

type LinearInterp = Interp1D<OwnedRepr<f64>, OwnedRepr<f64>, Ix1, Linear>;

/// Measured probabilities at strictly increasing frequencies. Lookups outside
/// the measured range are clamped to the end points.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "TableSpec", into = "TableSpec")]
pub struct ProbabilityTable {
    frequencies: Vec<f64>,
    values: Vec<f64>,
    interp: Arc<LinearInterp>,
}

#[derive(Serialize, Deserialize)]
struct TableSpec {
    frequencies: Vec<f64>,
    values: Vec<f64>,
}

impl ProbabilityTable {
    pub fn new(frequencies: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if frequencies.len() < 2 || frequencies.len() != values.len() {
            return Err(anyhow!(
                "table needs matching frequency and value lists of length >= 2"
            ));
        }
        if !frequencies.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(anyhow!("table frequencies must be strictly increasing"));
        }
        if values.iter().any(|v| !(*v >= 0.0) || !v.is_finite()) {
            return Err(anyhow!("table values must be finite and non-negative"));
        }

        let interp = Interp1DBuilder::new(Array1::from(values.clone()))
            .x(Array1::from(frequencies.clone()))
            .strategy(Linear::new())
            .build()
            .map_err(|e| anyhow!("invalid probability table: {}", e))?;

        Ok(Self {
            frequencies,
            values,
            interp: Arc::new(interp),
        })
    }

    pub fn eval(&self, freq: f64) -> Result<f64> {
        let (Some(&lo), Some(&hi)) = (self.frequencies.first(), self.frequencies.last()) else {
            return Err(anyhow!("empty probability table"));
        };
        self.interp
            .interp_scalar(freq.clamp(lo, hi))
            .map_err(|e| anyhow!("probability table lookup at {} THz: {}", freq, e))
    }
}

impl TryFrom<TableSpec> for ProbabilityTable {
    type Error = anyhow::Error;

    fn try_from(spec: TableSpec) -> Result<Self> {
        Self::new(spec.frequencies, spec.values)
    }
}

impl From<ProbabilityTable> for TableSpec {
    fn from(table: ProbabilityTable) -> Self {
        Self {
            frequencies: table.frequencies,
            values: table.values,
        }
    }
}

impl PartialEq for ProbabilityTable {
    fn eq(&self, other: &Self) -> bool {
        self.frequencies == other.frequencies && self.values == other.values
    }
}

impl fmt::Debug for ProbabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbabilityTable")
            .field("frequencies", &self.frequencies)
            .field("values", &self.values)
            .finish()
    }
}

/// Boundary behaviour for one material pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceProperty {
    /// Probability that a phonon meeting the boundary is a candidate for absorption.
    pub absorption_prob: f64,
    /// Candidates are only absorbed if `|k . n|` exceeds this (1/mm).
    pub absorption_min_k: f64,
    pub specular: ProbabilityCurve,
    pub diffuse: ProbabilityCurve,
    pub decay: ProbabilityCurve,
    /// Boundary hits after which the transport loop kills a track.
    pub max_reflections: Option<usize>,
}

impl Default for SurfaceProperty {
    fn default() -> Self {
        Self {
            absorption_prob: 0.0,
            absorption_min_k: 0.0,
            specular: ProbabilityCurve::Constant(1.0),
            diffuse: ProbabilityCurve::Constant(0.0),
            decay: ProbabilityCurve::Constant(0.0),
            max_reflections: None,
        }
    }
}

impl SurfaceProperty {
    /// Un-normalized channel probabilities at `freq`.
    pub fn probabilities(&self, freq: f64) -> Result<ReflectionProbs> {
        Ok(ReflectionProbs::new(
            self.specular.eval(freq)?,
            self.diffuse.eval(freq)?,
            self.decay.eval(freq)?,
        ))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.absorption_prob) {
            return Err(anyhow!("absorption probability must lie in [0, 1]"));
        }
        if self.absorption_min_k < 0.0 {
            return Err(anyhow!("absorption threshold must be non-negative"));
        }
        self.specular.validate()?;
        self.diffuse.validate()?;
        self.decay.validate()
    }
}

/// Source of reflection probabilities for a material pair at a frequency.
pub trait ProbabilitySource: Send + Sync {
    fn probabilities(&self, pair: &MaterialPair, freq: f64) -> Result<ReflectionProbs>;
}

/// Surface properties keyed by material pair, with an optional fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceTable {
    properties: HashMap<MaterialPair, SurfaceProperty>,
    default: Option<SurfaceProperty>,
}

impl SurfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: MaterialPair, property: SurfaceProperty) -> Result<()> {
        property.validate()?;
        self.properties.insert(pair, property);
        Ok(())
    }

    pub fn with_default(mut self, property: SurfaceProperty) -> Self {
        self.default = Some(property);
        self
    }

    pub fn property(&self, pair: &MaterialPair) -> Option<&SurfaceProperty> {
        self.properties.get(pair).or(self.default.as_ref())
    }
}

impl ProbabilitySource for SurfaceTable {
    fn probabilities(&self, pair: &MaterialPair, freq: f64) -> Result<ReflectionProbs> {
        self.property(pair)
            .ok_or_else(|| anyhow!("no surface property for boundary {}", pair))?
            .probabilities(freq)
    }
}
