use crate::models::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres. A missing position on either side is
/// infinitely far from everything, so it can never satisfy a radius check.
pub fn haversine_km(a: Option<Coordinates>, b: Option<Coordinates>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return f64::INFINITY;
    };

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(latitude: f64, longitude: f64) -> Option<Coordinates> {
        Some(Coordinates::new(latitude, longitude))
    }

    #[test]
    fn same_point_is_zero() {
        assert_eq!(haversine_km(at(9.0579, 7.4951), at(9.0579, 7.4951)), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let wuse = at(9.05, 7.49);
        let kubwa = at(9.40, 7.90);
        let forward = haversine_km(wuse, kubwa);
        let backward = haversine_km(kubwa, wuse);
        assert!((forward - backward).abs() < 1e-9);
    }

    #[test]
    fn nearby_abuja_points_are_about_one_and_a_half_km_apart() {
        let distance = haversine_km(at(9.05, 7.49), at(9.06, 7.48));
        assert!(distance > 1.3 && distance < 1.7, "got {distance}");
    }

    #[test]
    fn quarter_meridian_matches_earth_radius() {
        let distance = haversine_km(at(0.0, 0.0), at(90.0, 0.0));
        let expected = EARTH_RADIUS_KM * std::f64::consts::FRAC_PI_2;
        assert!((distance - expected).abs() < 1e-6);
    }

    #[test]
    fn missing_coordinates_are_infinitely_far() {
        assert!(haversine_km(None, at(9.05, 7.49)).is_infinite());
        assert!(haversine_km(at(9.05, 7.49), None).is_infinite());
        assert!(haversine_km(None, None).is_infinite());
    }
}
