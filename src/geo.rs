//! Geometric predicates on WGS84 coordinates.
//!
//! Segment tests treat longitude as `x` and latitude as `y` on a flat plane,
//! which is accurate enough for the short segments between AIS reports.

use crate::models::GeoPoint;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Whether `a`, `b`, `c` are in counter-clockwise order.
fn ccw(a: GeoPoint, b: GeoPoint, c: GeoPoint) -> bool {
    (c.lat - a.lat) * (b.lon - a.lon) > (b.lat - a.lat) * (c.lon - a.lon)
}

/// Whether segment `ab` intersects segment `cd`.
///
/// Collinear overlapping segments are reported as not intersecting; the
/// orientation test does not special-case them.
pub fn segments_intersect(a: GeoPoint, b: GeoPoint, c: GeoPoint, d: GeoPoint) -> bool {
    ccw(a, c, d) != ccw(b, c, d) && ccw(a, b, c) != ccw(a, b, d)
}

/// Great-circle distance in kilometres using the haversine formula.
pub fn great_circle_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Whether a point lies within `radius_km` of a zone centre (inclusive).
pub fn in_circular_zone(lat: f64, lon: f64, center_lat: f64, center_lon: f64, radius_km: f64) -> bool {
    great_circle_distance_km(lat, lon, center_lat, center_lon) <= radius_km
}

/// Approximate distance in kilometres from a point to a reference line.
///
/// This is the smallest distance to the line's start, end or midpoint, not
/// the true point-to-segment distance. Only used to decide which positions
/// are worth storing.
pub fn approx_distance_to_reference_line(
    lat: f64,
    lon: f64,
    line_start: GeoPoint,
    line_end: GeoPoint,
) -> f64 {
    let mid_lat = (line_start.lat + line_end.lat) / 2.0;
    let mid_lon = (line_start.lon + line_end.lon) / 2.0;

    let to_start = great_circle_distance_km(lat, lon, line_start.lat, line_start.lon);
    let to_end = great_circle_distance_km(lat, lon, line_end.lat, line_end.lon);
    let to_mid = great_circle_distance_km(lat, lon, mid_lat, mid_lon);

    to_start.min(to_mid).min(to_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stad_line() -> (GeoPoint, GeoPoint) {
        (
            GeoPoint::new(5.100380, 62.194513),
            GeoPoint::new(4.342984, 62.442407),
        )
    }

    #[test]
    fn crossing_path_intersects() {
        let (start, end) = stad_line();
        let a = GeoPoint::new(5.3, 62.25);
        let b = GeoPoint::new(4.1, 62.35);
        assert!(segments_intersect(a, b, start, end));
    }

    #[test]
    fn same_side_path_does_not_intersect() {
        let (start, end) = stad_line();
        let a = GeoPoint::new(5.2, 62.2);
        let b = GeoPoint::new(5.3, 62.3);
        assert!(!segments_intersect(a, b, start, end));
    }

    #[test]
    fn intersection_is_symmetric() {
        let (start, end) = stad_line();
        let paths = [
            (GeoPoint::new(5.3, 62.25), GeoPoint::new(4.1, 62.35)),
            (GeoPoint::new(5.2, 62.2), GeoPoint::new(5.3, 62.3)),
            (GeoPoint::new(4.0, 62.0), GeoPoint::new(6.0, 63.0)),
            (GeoPoint::new(4.5, 62.5), GeoPoint::new(4.6, 62.1)),
        ];
        for (a, b) in paths {
            assert_eq!(
                segments_intersect(a, b, start, end),
                segments_intersect(start, end, a, b),
                "asymmetric result for {:?} -> {:?}",
                a,
                b
            );
        }
    }

    #[test]
    fn collinear_overlap_is_not_an_intersection() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(2.0, 0.0);
        let c = GeoPoint::new(1.0, 0.0);
        let d = GeoPoint::new(3.0, 0.0);
        assert!(!segments_intersect(a, b, c, d));
    }

    #[test]
    fn distance_identity_and_symmetry() {
        assert_eq!(great_circle_distance_km(62.25, 5.3, 62.25, 5.3), 0.0);

        let ab = great_circle_distance_km(62.25, 5.3, 62.25, 4.2);
        let ba = great_circle_distance_km(62.25, 4.2, 62.25, 5.3);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn distance_matches_known_value() {
        // One degree of latitude is roughly 111.19 km on a 6371 km sphere
        let d = great_circle_distance_km(62.0, 5.0, 63.0, 5.0);
        assert!((d - 111.19).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn zone_membership_is_inclusive() {
        assert!(in_circular_zone(62.25, 5.3, 62.25, 5.3, 10.0));
        assert!(in_circular_zone(62.30, 5.3, 62.25, 5.3, 10.0));
        assert!(!in_circular_zone(62.50, 5.3, 62.25, 5.3, 10.0));

        let edge = great_circle_distance_km(62.30, 5.3, 62.25, 5.3);
        assert!(in_circular_zone(62.30, 5.3, 62.25, 5.3, edge));
    }

    #[test]
    fn reference_line_distance_uses_closest_anchor() {
        let (start, end) = stad_line();
        assert_eq!(
            approx_distance_to_reference_line(start.lat, start.lon, start, end),
            0.0
        );

        let mid_lat = (start.lat + end.lat) / 2.0;
        let mid_lon = (start.lon + end.lon) / 2.0;
        assert!(approx_distance_to_reference_line(mid_lat, mid_lon, start, end) < 1e-9);

        // Far away points are well beyond the 50 km filter
        assert!(approx_distance_to_reference_line(60.0, 5.0, start, end) > 50.0);
    }
}
