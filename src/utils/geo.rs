/// Map a longitude in any convention (e.g. 0-360 east) onto (-180, 180].
pub fn normalize_longitude(longitude: f64) -> f64 {
    let wrapped = longitude.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Chebyshev distance in degrees: the larger of the latitude and longitude
/// separations. Cheap, and adequate for picking a cell on a near-uniform grid.
#[inline]
pub fn chebyshev_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    (lat1 - lat2).abs().max((lon1 - lon2).abs())
}

/// Round half away from zero to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}
