use nalgebra::{Point3, Vector3};

use crate::config::EDGE_STEP;
use crate::geom::Surface;
use crate::vector;


/// Outcome of stepping the surface walk across a facet edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCorrection {
    pub position: Point3<f64>,  // on the neighbouring facet, local frame
    pub direction: Vector3<f64>, // reflected against the neighbouring facet, unit
    pub normal: Vector3<f64>,    // outward normal of the neighbouring facet
}

/// Moves a walk that has stepped past the current facet onto the neighbouring
/// facet and reflects `direction` against the neighbour's normal.
///
/// Returns `None` when no distinct neighbouring facet can be found, or the
/// neighbour cannot be reached along the tangential direction.
pub fn correct(
    surface: &dyn Surface,
    position: &Point3<f64>,
    direction: &Vector3<f64>,
) -> Option<EdgeCorrection> {
    let current = surface.normal(position);
    let (_, tangential) = vector::decompose(direction, &current);
    let tangent = vector::unit(&tangential)?;

    // one edge step inward puts the point beside the neighbouring facet
    let inner = position - EDGE_STEP * current;
    let neighbour = surface.normal(&inner);
    if neighbour.dot(&current) > 1.0 - 1e-9 {
        return None;
    }

    let back = surface.distance_to_in(&inner, &-tangent);
    if !back.is_finite() {
        return None;
    }
    let position = inner - back * tangent + EDGE_STEP * current;

    Some(EdgeCorrection {
        position,
        direction: vector::reflect(direction, &neighbour),
        normal: neighbour,
    })
}
