use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// A WGS84 point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Squared euclidean distance in degree space.
    ///
    /// Good enough for ranking nearby points, meaningless as a real distance.
    pub fn dist2(&self, other: &Coordinate) -> f64 {
        (self.lat - other.lat).powi(2) + (self.lon - other.lon).powi(2)
    }

    /// True when both components differ by at most `tolerance` degrees.
    pub fn is_near(&self, other: &Coordinate, tolerance: f64) -> bool {
        (self.lat - other.lat).abs() <= tolerance && (self.lon - other.lon).abs() <= tolerance
    }

    pub fn as_pair(&self) -> [f64; 2] {
        [self.lat, self.lon]
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseCoordinateError {
    #[error("expected \"lat,lon\" but got {0:?}")]
    WrongShape(String),

    #[error("{0:?} is not a finite number")]
    NotANumber(String),
}

/// Parses the `lat,lon` form used by the request endpoint.
impl FromStr for Coordinate {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| ParseCoordinateError::WrongShape(s.to_string()))?;

        if lon.contains(',') {
            return Err(ParseCoordinateError::WrongShape(s.to_string()));
        }

        let parse = |part: &str| -> Result<f64, ParseCoordinateError> {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseCoordinateError::NotANumber(part.to_string()))
        };

        Ok(Coordinate {
            lat: parse(lat)?,
            lon: parse(lon)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_coordinates() -> Result<(), anyhow::Error> {
        let c: Coordinate = "35.17022784728593, 33.35889554051766".parse()?;
        assert_eq!(c, Coordinate::new(35.17022784728593, 33.35889554051766));

        let c: Coordinate = "-1.5,2".parse()?;
        assert_eq!(c, Coordinate::new(-1.5, 2.0));

        Ok(())
    }

    #[test]
    fn rejects_malformed_coordinates() {
        assert!(matches!(
            "35.1".parse::<Coordinate>(),
            Err(ParseCoordinateError::WrongShape(_))
        ));
        assert!(matches!(
            "1,2,3".parse::<Coordinate>(),
            Err(ParseCoordinateError::WrongShape(_))
        ));
        assert!(matches!(
            "abc,2".parse::<Coordinate>(),
            Err(ParseCoordinateError::NotANumber(_))
        ));
        assert!(matches!(
            "1,NaN".parse::<Coordinate>(),
            Err(ParseCoordinateError::NotANumber(_))
        ));
        assert!(matches!(
            ",".parse::<Coordinate>(),
            Err(ParseCoordinateError::NotANumber(_))
        ));
    }

    #[test]
    fn squared_distance() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(3.0, 4.0);
        assert_eq!(a.dist2(&b), 25.0);
        assert!(a.is_near(&Coordinate::new(0.00005, -0.00005), 1e-4));
        assert!(!a.is_near(&Coordinate::new(0.0002, 0.0), 1e-4));
    }

    #[test]
    fn lat_comes_first_everywhere() -> Result<(), anyhow::Error> {
        let c = Coordinate::new(35.1, 33.3);

        assert_eq!(c.to_string(), "35.1,33.3");
        assert_eq!(c.as_pair(), [35.1, 33.3]);
        assert_eq!(serde_json::to_value(c)?, serde_json::json!({ "lat": 35.1, "lon": 33.3 }));

        Ok(())
    }
}
