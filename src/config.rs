// Lengths are in millimetres, energies in meV and frequencies in THz.

/// Planck constant in meV per THz, so that `f = E / H_PLANCK`.
pub const H_PLANCK: f64 = 4.135_667_696;
/// Distance stepped along the surface per correction attempt (1 um).
pub const WALK_STEP: f64 = 1e-3;
/// Distance stepped into the solid to land on the neighbouring facet of an edge (1 mm).
pub const EDGE_STEP: f64 = 1.0;
/// Pull-back distances larger than this mean the walk went past a facet edge.
pub const EDGE_THRESHOLD: f64 = 1.0;
/// Maximum number of surface-walk steps before the specular solver gives up.
pub const MAX_WALK_ATTEMPTS: usize = 1000;
/// Maximum number of Lambertian draws before the diffuse sampler returns its last draw.
pub const MAX_LAMBERT_TRIES: usize = 1000;
/// Points closer than this to a surface are considered on it.
pub const SURFACE_TOLERANCE: f64 = 1e-9;
/// Minimum vector length to be considered non-degenerate.
pub const VEC_LENGTH_THRESHOLD: f64 = 1e-12;
/// Boundary hits after which a track is killed when the surface sets no reflection limit.
pub const MAX_TRACK_HITS: usize = 100_000;
