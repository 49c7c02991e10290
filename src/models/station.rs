use serde::{Deserialize, Serialize};
use validator::Validate;

/// A verification site. Immutable once the roster is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Station {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Station {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_validation() {
        let station = Station::new("PAFA", 64.8039, -147.8761);
        assert!(station.validate().is_ok());
    }

    #[test]
    fn test_invalid_coordinates() {
        let station = Station::new("BAD", 91.0, -147.0);
        assert!(station.validate().is_err());

        // Unsigned 0-360 longitudes are not accepted in the roster
        let station = Station::new("BAD", 64.0, 212.0);
        assert!(station.validate().is_err());

        let station = Station::new("", 64.0, -147.0);
        assert!(station.validate().is_err());
    }
}
