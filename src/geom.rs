use std::path::Path;

use anyhow::{anyhow, Context, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::{SURFACE_TOLERANCE, VEC_LENGTH_THRESHOLD};


/// Geometric queries on a solid, in the solid's local frame.
///
/// Mirrors the navigation interface of a detector solid: the engine only ever
/// asks for an outward normal near a point and for distances along a ray.
pub trait Surface: Send + Sync {
    /// Outward unit normal of the surface nearest to `p`.
    fn normal(&self, p: &Point3<f64>) -> Vector3<f64>;

    /// Distance from `p` along unit `v` until the solid is entered. Zero if
    /// `p` already lies on or inside the solid, infinite if the ray misses.
    fn distance_to_in(&self, p: &Point3<f64>, v: &Vector3<f64>) -> f64;

    /// Distance from an interior point `p` along unit `v` to the boundary.
    fn distance_to_out(&self, p: &Point3<f64>, v: &Vector3<f64>) -> f64;

    /// True if `p` is inside or on the surface.
    fn contains(&self, p: &Point3<f64>) -> bool;
}

/// Represents a plane, defined by a normal and an offset value.
/// The plane is `n.x + d = 0` and the normal points out of the solid.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub offset: f64,
}

impl Plane {
    pub fn new(normal: Vector3<f64>, point: &Point3<f64>) -> Self {
        let normal = normal.normalize();
        Self {
            offset: -normal.dot(&point.coords),
            normal,
        }
    }

    /// Positive outside the solid, negative inside.
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.offset
    }

    fn coincides(&self, other: &Plane) -> bool {
        self.normal.dot(&other.normal) > 1.0 - 1e-9 && (self.offset - other.offset).abs() < 1e-9
    }
}

/// A convex solid bounded by planes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyhedron {
    planes: Vec<Plane>,
}

impl Polyhedron {
    pub fn new(planes: Vec<Plane>) -> Result<Self> {
        if planes.len() < 4 {
            return Err(anyhow!(
                "a closed convex solid needs at least 4 planes, got {}",
                planes.len()
            ));
        }
        Ok(Self { planes })
    }

    /// Axis-aligned box centred on the origin.
    pub fn cuboid(half_extents: [f64; 3]) -> Self {
        let [hx, hy, hz] = half_extents;
        let planes = [
            (Vector3::x(), hx),
            (-Vector3::x(), hx),
            (Vector3::y(), hy),
            (-Vector3::y(), hy),
            (Vector3::z(), hz),
            (-Vector3::z(), hz),
        ]
        .into_iter()
        .map(|(normal, half)| Plane {
            normal,
            offset: -half,
        })
        .collect();
        Self { planes }
    }

    /// Loads a convex solid from a Wavefront OBJ file. Coplanar facets are merged
    /// into one plane and normals are oriented away from the vertex centroid.
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let filename = filename.as_ref();
        let (models, _) = tobj::load_obj(filename, &tobj::LoadOptions::default())
            .with_context(|| format!("failed to load OBJ file {}", filename.display()))?;

        let mut vertices = Vec::new();
        let mut faces: Vec<Vec<usize>> = Vec::new();

        for m in models.iter() {
            let mesh = &m.mesh;
            let base = vertices.len();
            for vtx in 0..mesh.positions.len() / 3 {
                vertices.push(Point3::new(
                    mesh.positions[3 * vtx] as f64,
                    mesh.positions[3 * vtx + 1] as f64,
                    mesh.positions[3 * vtx + 2] as f64,
                ));
            }

            // triangulated meshes come without arities
            let arities: Vec<usize> = if mesh.face_arities.is_empty() {
                vec![3; mesh.indices.len() / 3]
            } else {
                mesh.face_arities.iter().map(|&a| a as usize).collect()
            };

            let mut next_face = 0;
            for arity in arities {
                let end = next_face + arity;
                let face_indices = mesh
                    .indices
                    .get(next_face..end)
                    .ok_or_else(|| anyhow!("face indices out of range in {}", filename.display()))?;
                faces.push(face_indices.iter().map(|&i| base + i as usize).collect());
                next_face = end;
            }
        }

        if vertices.is_empty() {
            return Err(anyhow!("no vertices found in {}", filename.display()));
        }
        let centroid = vertices
            .iter()
            .fold(Vector3::zeros(), |acc, v| acc + v.coords)
            / vertices.len() as f64;

        let mut planes: Vec<Plane> = Vec::new();
        for face in faces {
            let plane = face_plane(&vertices, &face, &centroid)
                .with_context(|| format!("degenerate face in {}", filename.display()))?;
            if !planes.iter().any(|p| p.coincides(&plane)) {
                planes.push(plane);
            }
        }

        Self::new(planes)
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }
}

/// Plane through a face, with the normal computed from the first three vertices.
fn face_plane(vertices: &[Point3<f64>], face: &[usize], centroid: &Vector3<f64>) -> Result<Plane> {
    if face.len() < 3 {
        return Err(anyhow!("face has {} vertices", face.len()));
    }
    let v1 = vertices[face[0]];
    let v2 = vertices[face[1]];
    let v3 = vertices[face[2]];

    let u = v2 - v1;
    let v = v3 - v1;
    let normal = u
        .cross(&v)
        .try_normalize(VEC_LENGTH_THRESHOLD)
        .ok_or_else(|| anyhow!("zero cross product"))?;

    let mut plane = Plane::new(normal, &v1);
    if plane.signed_distance(&Point3::from(*centroid)) > 0.0 {
        plane = Plane::new(-normal, &v1);
    }
    Ok(plane)
}

impl Surface for Polyhedron {
    fn normal(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.planes
            .iter()
            .max_by(|a, b| a.signed_distance(p).total_cmp(&b.signed_distance(p)))
            .map(|plane| plane.normal)
            .unwrap_or_else(Vector3::z)
    }

    fn distance_to_in(&self, p: &Point3<f64>, v: &Vector3<f64>) -> f64 {
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;

        for plane in &self.planes {
            let s = plane.signed_distance(p);
            let vn = v.dot(&plane.normal);
            if vn.abs() < VEC_LENGTH_THRESHOLD {
                if s > SURFACE_TOLERANCE {
                    return f64::INFINITY; // parallel and outside this plane
                }
            } else if vn < 0.0 {
                t_enter = t_enter.max(s / -vn);
            } else {
                t_exit = t_exit.min(-s / vn);
            }
        }

        if t_enter > t_exit + SURFACE_TOLERANCE || t_exit < -SURFACE_TOLERANCE {
            f64::INFINITY
        } else {
            t_enter.max(0.0)
        }
    }

    fn distance_to_out(&self, p: &Point3<f64>, v: &Vector3<f64>) -> f64 {
        self.planes
            .iter()
            .filter_map(|plane| {
                let vn = v.dot(&plane.normal);
                (vn > VEC_LENGTH_THRESHOLD).then(|| (-plane.signed_distance(p) / vn).max(0.0))
            })
            .fold(f64::INFINITY, f64::min)
    }

    fn contains(&self, p: &Point3<f64>) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(p) <= SURFACE_TOLERANCE)
    }
}

/// A right circular cylinder about the local z axis, centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cylinder {
    pub radius: f64,
    pub half_height: f64,
}

impl Cylinder {
    pub fn new(radius: f64, half_height: f64) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    /// Parameter interval along the ray that lies within the solid, if any.
    fn ray_interval(&self, p: &Point3<f64>, v: &Vector3<f64>) -> Option<(f64, f64)> {
        let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);

        // caps
        if v.z.abs() < VEC_LENGTH_THRESHOLD {
            if p.z.abs() > self.half_height + SURFACE_TOLERANCE {
                return None;
            }
        } else {
            let t1 = (-self.half_height - p.z) / v.z;
            let t2 = (self.half_height - p.z) / v.z;
            lo = lo.max(t1.min(t2));
            hi = hi.min(t1.max(t2));
        }

        // side: |p_xy + t v_xy|^2 = r^2
        let a = v.x * v.x + v.y * v.y;
        let c = p.x * p.x + p.y * p.y - self.radius * self.radius;
        if a < VEC_LENGTH_THRESHOLD {
            if c > SURFACE_TOLERANCE * self.radius {
                return None;
            }
        } else {
            let b = p.x * v.x + p.y * v.y;
            let disc = b * b - a * c;
            if disc < 0.0 {
                return None;
            }
            let root = disc.sqrt();
            lo = lo.max((-b - root) / a);
            hi = hi.min((-b + root) / a);
        }

        (lo <= hi + SURFACE_TOLERANCE).then_some((lo, hi))
    }
}

impl Surface for Cylinder {
    fn normal(&self, p: &Point3<f64>) -> Vector3<f64> {
        let rho = (p.x * p.x + p.y * p.y).sqrt();
        let side = (rho - self.radius).abs();
        let top = (p.z - self.half_height).abs();
        let bottom = (p.z + self.half_height).abs();

        if side < top && side < bottom && rho > VEC_LENGTH_THRESHOLD {
            Vector3::new(p.x / rho, p.y / rho, 0.0)
        } else if top <= bottom {
            Vector3::z()
        } else {
            -Vector3::z()
        }
    }

    fn distance_to_in(&self, p: &Point3<f64>, v: &Vector3<f64>) -> f64 {
        match self.ray_interval(p, v) {
            Some((_, hi)) if hi < -SURFACE_TOLERANCE => f64::INFINITY,
            Some((lo, _)) => lo.max(0.0),
            None => f64::INFINITY,
        }
    }

    fn distance_to_out(&self, p: &Point3<f64>, v: &Vector3<f64>) -> f64 {
        self.ray_interval(p, v).map_or(0.0, |(_, hi)| hi.max(0.0))
    }

    fn contains(&self, p: &Point3<f64>) -> bool {
        let rho = (p.x * p.x + p.y * p.y).sqrt();
        rho <= self.radius + SURFACE_TOLERANCE && p.z.abs() <= self.half_height + SURFACE_TOLERANCE
    }
}

/// Solid selection as it appears in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolidSpec {
    Cuboid { half_extents: [f64; 3] },
    Cylinder { radius: f64, half_height: f64 },
    Obj { path: String },
}

impl SolidSpec {
    pub fn build(&self) -> Result<Box<dyn Surface>> {
        match self {
            SolidSpec::Cuboid { half_extents } => {
                if half_extents.iter().any(|&h| h <= 0.0) {
                    return Err(anyhow!("cuboid half extents must be positive"));
                }
                Ok(Box::new(Polyhedron::cuboid(*half_extents)))
            }
            SolidSpec::Cylinder {
                radius,
                half_height,
            } => {
                if *radius <= 0.0 || *half_height <= 0.0 {
                    return Err(anyhow!("cylinder dimensions must be positive"));
                }
                Ok(Box::new(Cylinder::new(*radius, *half_height)))
            }
            SolidSpec::Obj { path } => Ok(Box::new(Polyhedron::from_file(path)?)),
        }
    }
}
