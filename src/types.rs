//! Core types used throughout the what3words client

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Audio data as raw bytes (16-bit little-endian PCM)
pub type AudioData = Vec<u8>;

/// Maximum number of points the API accepts for a polygon clip
pub const MAX_POLYGON_POINTS: usize = 25;

/// Minimum number of points of a closed polygon
pub const MIN_POLYGON_POINTS: usize = 4;

/// Bring a longitude into [-180, 180) so that L and L + 360k are equivalent
pub fn normalize_longitude(lng: f64) -> f64 {
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

/// A latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Validate the latitude and wrap the longitude around the antimeridian
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::Validation(format!(
                "latitude must be within [-90, 90], got {lat}"
            )));
        }
        if !lng.is_finite() {
            return Err(Error::Validation(format!(
                "longitude must be finite, got {lng}"
            )));
        }

        Ok(Self {
            lat,
            lng: normalize_longitude(lng),
        })
    }

    /// Format as `lat,lng` for query parameters
    pub fn to_api_string(&self) -> String {
        format!("{},{}", self.lat, self.lng)
    }
}

impl<'de> Deserialize<'de> for Coordinates {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            lat: f64,
            lng: f64,
        }
        let raw = Raw::deserialize(deserializer)?;
        Coordinates::new(raw.lat, raw.lng).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// A rectangle given by its south-west and north-east corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub southwest: Coordinates,
    pub northeast: Coordinates,
}

impl BoundingBox {
    pub fn new(southwest: Coordinates, northeast: Coordinates) -> Result<Self> {
        if southwest.lat > northeast.lat {
            return Err(Error::Validation(format!(
                "bounding box south-west latitude {} is north of north-east latitude {}",
                southwest.lat, northeast.lat
            )));
        }
        Ok(Self {
            southwest,
            northeast,
        })
    }

    pub fn to_api_string(&self) -> String {
        format!(
            "{},{},{},{}",
            self.southwest.lat, self.southwest.lng, self.northeast.lat, self.northeast.lng
        )
    }
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            southwest: Coordinates,
            northeast: Coordinates,
        }
        let raw = Raw::deserialize(deserializer)?;
        BoundingBox::new(raw.southwest, raw.northeast).map_err(serde::de::Error::custom)
    }
}

/// A circle: centre plus radius in kilometres
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    pub center: Coordinates,
    pub radius_km: f64,
}

impl Circle {
    pub fn new(center: Coordinates, radius_km: f64) -> Result<Self> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(Error::Validation(format!(
                "circle radius must be a positive number of kilometres, got {radius_km}"
            )));
        }
        Ok(Self { center, radius_km })
    }

    pub fn to_api_string(&self) -> String {
        format!("{},{},{}", self.center.lat, self.center.lng, self.radius_km)
    }
}

impl<'de> Deserialize<'de> for Circle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            center: Coordinates,
            radius_km: f64,
        }
        let raw = Raw::deserialize(deserializer)?;
        Circle::new(raw.center, raw.radius_km).map_err(serde::de::Error::custom)
    }
}

/// A closed polygon: first point repeated as last, 4 to 25 points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    points: Vec<Coordinates>,
}

impl Polygon {
    pub fn new(points: Vec<Coordinates>) -> Result<Self> {
        if points.len() < MIN_POLYGON_POINTS {
            return Err(Error::Validation(format!(
                "polygon needs at least {MIN_POLYGON_POINTS} points, got {}",
                points.len()
            )));
        }
        if points.len() > MAX_POLYGON_POINTS {
            return Err(Error::Validation(format!(
                "polygon accepts at most {MAX_POLYGON_POINTS} points, got {}",
                points.len()
            )));
        }
        // coordinates are already normalized, so a plain comparison covers wraparound
        if points.first() != points.last() {
            return Err(Error::Validation(
                "polygon must be closed: the first point must be repeated as the last".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Coordinates] {
        &self.points
    }

    pub fn to_api_string(&self) -> String {
        self.points
            .iter()
            .map(Coordinates::to_api_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<'de> Deserialize<'de> for Polygon {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            points: Vec<Coordinates>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Polygon::new(raw.points).map_err(serde::de::Error::custom)
    }
}

/// ISO 3166-1 alpha-2 country codes, normalized to uppercase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Countries(Vec<String>);

impl Countries {
    /// Accepts codes in any case; only the shape (two ASCII letters) is checked
    pub fn new<I, S>(codes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for code in codes {
            let code = code.as_ref().trim();
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::Validation(format!(
                    "country code must be two letters, got {code:?}"
                )));
            }
            normalized.push(code.to_ascii_uppercase());
        }

        if normalized.is_empty() {
            return Err(Error::Validation(
                "country clip needs at least one country code".to_string(),
            ));
        }

        Ok(Self(normalized))
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }

    pub fn to_api_string(&self) -> String {
        self.0.join(",")
    }
}

impl<'de> Deserialize<'de> for Countries {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let codes = Vec::<String>::deserialize(deserializer)?;
        Countries::new(codes).map_err(serde::de::Error::custom)
    }
}

/// A what3words square
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Square {
    pub southwest: Coordinates,
    pub northeast: Coordinates,
}

/// One autosuggest result, in the relevance order the service returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub words: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub nearest_place: String,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_to_focus_km: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square: Option<Square>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// Result of convert-to-3wa and convert-to-coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub words: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square: Option<Square>,
    #[serde(default)]
    pub nearest_place: String,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
}

/// A grid line returned by grid-section
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Coordinates,
    pub end: Coordinates,
}

/// A language available for three word addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    pub code: String,
    pub name: String,
    pub native_name: String,
    #[serde(default)]
    pub locales: Vec<Locale>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locale {
    pub code: String,
    pub name: String,
    pub native_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[test]
    fn test_longitude_wraparound() {
        assert_eq!(coords(51.5, 361.0).lng, 1.0);
        assert_eq!(coords(51.5, 181.0).lng, -179.0);
        assert_eq!(coords(51.5, -181.0).lng, 179.0);

        for base in [-179.5, -45.25, 0.0, 0.1, 90.0, 179.9] {
            let expected = coords(10.0, base).lng;
            for k in -3..=3 {
                let wrapped = coords(10.0, base + 360.0 * f64::from(k)).lng;
                assert!(
                    (wrapped - expected).abs() < 1e-9,
                    "{base} + 360*{k} normalized to {wrapped}, expected {expected}"
                );
            }
        }
    }

    #[test]
    fn test_latitude_out_of_range() {
        assert!(matches!(Coordinates::new(90.5, 0.0), Err(Error::Validation(_))));
        assert!(matches!(Coordinates::new(f64::NAN, 0.0), Err(Error::Validation(_))));
        assert!(matches!(Coordinates::new(0.0, f64::INFINITY), Err(Error::Validation(_))));
    }

    #[test]
    fn test_polygon_validation() {
        let a = coords(51.0, -0.1);
        let b = coords(51.1, -0.1);
        let c = coords(51.1, 0.1);

        let closed = Polygon::new(vec![a, b, c, a]).unwrap();
        assert_eq!(closed.points().len(), 4);
        assert_eq!(
            closed.to_api_string(),
            "51,-0.1,51.1,-0.1,51.1,0.1,51,-0.1"
        );

        assert!(matches!(Polygon::new(vec![a, b, a]), Err(Error::Validation(_))));
        assert!(matches!(Polygon::new(vec![a, b, c, b]), Err(Error::Validation(_))));

        let too_many = vec![a; MAX_POLYGON_POINTS + 1];
        assert!(matches!(Polygon::new(too_many), Err(Error::Validation(_))));
    }

    #[test]
    fn test_polygon_closed_across_wraparound() {
        let first = coords(10.0, 1.0);
        let last = coords(10.0, 361.0);
        let polygon = Polygon::new(vec![first, coords(11.0, 1.0), coords(11.0, 2.0), last]);
        assert!(polygon.is_ok());
    }

    #[test]
    fn test_countries_normalized_to_uppercase() {
        let countries = Countries::new(["gb", "BE"]).unwrap();
        assert_eq!(countries.codes(), ["GB", "BE"]);
        assert_eq!(countries.to_api_string(), "GB,BE");

        // unknown but well-formed codes pass through
        assert!(Countries::new(["zz"]).is_ok());

        assert!(matches!(Countries::new(["gbr"]), Err(Error::Validation(_))));
        assert!(matches!(Countries::new(Vec::<String>::new()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_circle_and_bounding_box() {
        let circle = Circle::new(coords(51.5, 360.0 - 0.1), 10.0).unwrap();
        assert!((circle.center.lng + 0.1).abs() < 1e-9);
        assert!(Circle::new(coords(0.0, 0.0), 0.0).is_err());

        let bbox = BoundingBox::new(coords(51.0, -0.2), coords(52.0, 0.2)).unwrap();
        assert_eq!(bbox.to_api_string(), "51,-0.2,52,0.2");
        assert!(BoundingBox::new(coords(52.0, 0.0), coords(51.0, 0.0)).is_err());
    }

    #[test]
    fn test_geometry_deserialize_validates() {
        let c: Coordinates = serde_json::from_str(r#"{"lat": 10.0, "lng": 361.0}"#).unwrap();
        assert_eq!(c.lng, 1.0);
        assert!(serde_json::from_str::<Coordinates>(r#"{"lat": 999, "lng": 0}"#).is_err());

        let circle = r#"{"center": {"lat": 0, "lng": 0}, "radius_km": -5}"#;
        assert!(serde_json::from_str::<Circle>(circle).is_err());

        let bbox = r#"{"southwest": {"lat": 52, "lng": 0}, "northeast": {"lat": 51, "lng": 0}}"#;
        assert!(serde_json::from_str::<BoundingBox>(bbox).is_err());

        // closure is checked after the longitudes are wrapped
        let polygon = r#"{"points": [
            {"lat": 10, "lng": 1}, {"lat": 11, "lng": 1},
            {"lat": 11, "lng": 2}, {"lat": 10, "lng": 361}
        ]}"#;
        let polygon: Polygon = serde_json::from_str(polygon).unwrap();
        assert_eq!(polygon.points()[3].lng, 1.0);
    }

    #[test]
    fn test_suggestion_deserialize_camel_case() {
        let json = r#"{
            "country": "GB",
            "nearestPlace": "Bayswater, London",
            "words": "filled.count.soap",
            "rank": 1,
            "language": "en",
            "distanceToFocusKm": 3
        }"#;
        let suggestion: Suggestion = serde_json::from_str(json).unwrap();
        assert_eq!(suggestion.words, "filled.count.soap");
        assert_eq!(suggestion.nearest_place, "Bayswater, London");
        assert_eq!(suggestion.distance_to_focus_km, Some(3));
        assert!(suggestion.coordinates.is_none());
    }
}
