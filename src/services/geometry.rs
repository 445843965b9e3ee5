//! Geometry engine - containment tests and boundary distance
//!
//! Pure functions; safe to call concurrently from any number of callers.
//!
//! Circles use great-circle (haversine) distance on the mean-radius sphere.
//! Polygons are tested in the lon/lat plane, so rings must not cross the
//! antimeridian. Points exactly on a boundary count as inside for both.

use crate::domain::error::{EngineError, Result};
use crate::domain::fence::FenceShape;
use crate::domain::types::Coordinate;
use geo::{
    Area, Closest, ClosestPoint, HaversineDistance, Intersects, LineString, Point, Polygon,
};
use rustc_hash::FxHashSet;

/// Minimum distinct vertices in a polygon ring
const MIN_POLYGON_VERTICES: usize = 3;

#[inline]
fn to_point(c: &Coordinate) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

/// Great-circle distance between two coordinates in metres
#[inline]
pub fn haversine_m(a: &Coordinate, b: &Coordinate) -> f64 {
    to_point(a).haversine_distance(&to_point(b))
}

/// Check that a shape can be evaluated
pub fn validate_shape(shape: &FenceShape) -> Result<()> {
    match shape {
        FenceShape::Circle { center, radius_m } => {
            if !center.is_valid() {
                return Err(EngineError::InvalidShape(format!(
                    "circle center out of range: ({}, {})",
                    center.latitude, center.longitude
                )));
            }
            if !radius_m.is_finite() || *radius_m <= 0.0 {
                return Err(EngineError::InvalidShape(format!("circle radius {radius_m} m")));
            }
            Ok(())
        }
        FenceShape::Polygon { vertices } => ring(vertices).map(|_| ()),
    }
}

/// Build the closed exterior ring, rejecting degenerate input
fn ring(vertices: &[Coordinate]) -> Result<LineString<f64>> {
    if let Some(bad) = vertices.iter().find(|v| !v.is_valid()) {
        return Err(EngineError::InvalidShape(format!(
            "polygon vertex out of range: ({}, {})",
            bad.latitude, bad.longitude
        )));
    }

    let mut ordered: Vec<Coordinate> = Vec::with_capacity(vertices.len());
    for v in vertices {
        if ordered.last() != Some(v) {
            ordered.push(*v);
        }
    }
    // Explicit closing vertex
    if ordered.len() > 1 && ordered.first() == ordered.last() {
        ordered.pop();
    }

    // Adding 0.0 folds -0.0 into 0.0 so both hash the same
    let distinct: FxHashSet<(u64, u64)> = ordered
        .iter()
        .map(|c| ((c.longitude + 0.0).to_bits(), (c.latitude + 0.0).to_bits()))
        .collect();
    if distinct.len() < MIN_POLYGON_VERTICES {
        return Err(EngineError::InvalidShape(format!(
            "polygon has {} distinct vertices, need at least {MIN_POLYGON_VERTICES}",
            distinct.len()
        )));
    }

    let exterior: LineString<f64> =
        ordered.iter().map(|c| (c.longitude, c.latitude)).collect::<Vec<_>>().into();
    if Polygon::new(exterior.clone(), vec![]).unsigned_area() == 0.0 {
        return Err(EngineError::InvalidShape("polygon has zero area".to_string()));
    }

    // LineString -> Polygon closes the ring
    Ok(exterior)
}

/// Whether `coordinate` lies within `shape` (boundary inclusive)
pub fn contains(shape: &FenceShape, coordinate: &Coordinate) -> Result<bool> {
    validate_shape(shape)?;
    match shape {
        FenceShape::Circle { center, radius_m } => Ok(haversine_m(center, coordinate) <= *radius_m),
        FenceShape::Polygon { vertices } => {
            let polygon = Polygon::new(ring(vertices)?, vec![]);
            Ok(polygon.intersects(&to_point(coordinate)))
        }
    }
}

/// Signed distance to the shape boundary in metres
///
/// Positive inside, negative outside, zero on the boundary.
pub fn distance_to_boundary(shape: &FenceShape, coordinate: &Coordinate) -> Result<f64> {
    validate_shape(shape)?;
    match shape {
        FenceShape::Circle { center, radius_m } => Ok(radius_m - haversine_m(center, coordinate)),
        FenceShape::Polygon { vertices } => {
            let exterior = ring(vertices)?;
            let point = to_point(coordinate);
            let nearest = match exterior.closest_point(&point) {
                Closest::Intersection(_) => return Ok(0.0),
                Closest::SinglePoint(p) => p,
                Closest::Indeterminate => {
                    return Err(EngineError::InvalidShape(
                        "polygon boundary has no closest point".to_string(),
                    ))
                }
            };
            let distance = point.haversine_distance(&nearest);
            let polygon = Polygon::new(exterior, vec![]);
            if polygon.intersects(&point) {
                Ok(distance)
            } else {
                Ok(-distance)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// Metres per degree of latitude on the mean-radius sphere
    const M_PER_DEG: f64 = 111_195.08;

    fn circle(radius_m: f64) -> FenceShape {
        FenceShape::Circle { center: Coordinate::new(0.0, 0.0), radius_m }
    }

    fn square() -> FenceShape {
        FenceShape::Polygon {
            vertices: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 1.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(1.0, 0.0),
            ],
        }
    }

    #[test]
    fn test_circle_center_inside() {
        assert!(contains(&circle(100.0), &Coordinate::new(0.0, 0.0)).unwrap());
    }

    #[test]
    fn test_circle_far_point_outside() {
        let far = Coordinate::new(1000.0 / M_PER_DEG, 0.0);
        assert!(!contains(&circle(100.0), &far).unwrap());
    }

    #[test]
    fn test_circle_boundary_counts_as_inside() {
        let edge = Coordinate::new(50.0 / M_PER_DEG, 0.0);
        let radius = haversine_m(&Coordinate::new(0.0, 0.0), &edge);
        assert!(contains(&circle(radius), &edge).unwrap());
    }

    #[test]
    fn test_circle_invalid_radius() {
        assert!(matches!(contains(&circle(0.0), &Coordinate::new(0.0, 0.0)), Err(EngineError::InvalidShape(_))));
        assert!(matches!(contains(&circle(f64::NAN), &Coordinate::new(0.0, 0.0)), Err(EngineError::InvalidShape(_))));
    }

    #[test]
    fn test_polygon_inside_and_outside() {
        assert!(contains(&square(), &Coordinate::new(0.5, 0.5)).unwrap());
        assert!(!contains(&square(), &Coordinate::new(1.5, 0.5)).unwrap());
    }

    #[test]
    fn test_polygon_boundary_counts_as_inside() {
        assert!(contains(&square(), &Coordinate::new(0.0, 0.5)).unwrap());
        assert!(contains(&square(), &Coordinate::new(1.0, 1.0)).unwrap());
    }

    #[test]
    fn test_polygon_closing_vertex_ignored() {
        let shape = FenceShape::Polygon {
            vertices: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 1.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(0.0, 0.0),
            ],
        };
        assert!(validate_shape(&shape).is_ok());
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let two = FenceShape::Polygon {
            vertices: vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)],
        };
        assert!(matches!(contains(&two, &Coordinate::new(0.5, 0.5)), Err(EngineError::InvalidShape(_))));

        // Three vertices but only two distinct once the ring is closed
        let closed_two = FenceShape::Polygon {
            vertices: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(0.0, 0.0),
            ],
        };
        assert!(validate_shape(&closed_two).is_err());

        let empty = FenceShape::Polygon { vertices: vec![] };
        assert!(validate_shape(&empty).is_err());
    }

    #[test]
    fn test_repeated_non_adjacent_vertices_rejected() {
        let back_and_forth = FenceShape::Polygon {
            vertices: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(1.0, 1.0),
                Coordinate::new(0.0, 0.0),
                Coordinate::new(1.0, 1.0),
            ],
        };
        assert!(matches!(validate_shape(&back_and_forth), Err(EngineError::InvalidShape(_))));
        assert!(matches!(
            contains(&back_and_forth, &Coordinate::new(0.5, 0.5)),
            Err(EngineError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_collinear_polygon_rejected() {
        let line = FenceShape::Polygon {
            vertices: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.5, 0.5),
                Coordinate::new(1.0, 1.0),
            ],
        };
        assert!(matches!(validate_shape(&line), Err(EngineError::InvalidShape(_))));
    }

    #[test]
    fn test_polygon_vertex_out_of_range() {
        let shape = FenceShape::Polygon {
            vertices: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(95.0, 0.0),
                Coordinate::new(1.0, 1.0),
            ],
        };
        assert!(validate_shape(&shape).is_err());
    }

    #[test]
    fn test_distance_to_boundary_circle() {
        let d = distance_to_boundary(&circle(100.0), &Coordinate::new(0.0, 0.0)).unwrap();
        assert_relative_eq!(d, 100.0, epsilon = 1e-9);

        let outside = Coordinate::new(1000.0 / M_PER_DEG, 0.0);
        let d = distance_to_boundary(&circle(100.0), &outside).unwrap();
        assert_relative_eq!(d, -900.0, epsilon = 1.0);
    }

    #[test]
    fn test_distance_to_boundary_polygon() {
        let inside = distance_to_boundary(&square(), &Coordinate::new(0.5, 0.9)).unwrap();
        assert!(inside > 0.0);
        // Nearest edge is longitude 1.0 at roughly 0.1 degree away
        assert_relative_eq!(inside, 0.1 * M_PER_DEG, max_relative = 0.01);

        let outside = distance_to_boundary(&square(), &Coordinate::new(0.5, 1.1)).unwrap();
        assert!(outside < 0.0);

        let on_edge = distance_to_boundary(&square(), &Coordinate::new(0.0, 0.5)).unwrap();
        assert_eq!(on_edge, 0.0);
    }

    proptest! {
        #[test]
        fn property_contains_is_deterministic(lat in -1.5f64..1.5, lon in -1.5f64..1.5, radius in 1.0f64..200_000.0) {
            let point = Coordinate::new(lat, lon);
            let shape = circle(radius);
            prop_assert_eq!(contains(&shape, &point).unwrap(), contains(&shape, &point).unwrap());
            prop_assert_eq!(contains(&square(), &point).unwrap(), contains(&square(), &point).unwrap());
        }

        #[test]
        fn property_sign_of_distance_matches_containment(lat in -1.5f64..1.5, lon in -1.5f64..1.5) {
            let point = Coordinate::new(lat, lon);
            let inside = contains(&square(), &point).unwrap();
            let d = distance_to_boundary(&square(), &point).unwrap();
            prop_assert_eq!(inside, d >= 0.0);
        }
    }
}
