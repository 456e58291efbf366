//! Session origin selection
//!
//!  Every projection is relative to one geodetic origin chosen at session
//!  start: a live position fix when one is available, otherwise an origin
//!  flagged in a point dataset, otherwise the configured default.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OriginError {
    #[error("invalid coordinate lat={lat} lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("origin dataset is not valid GeoJSON or Overpass JSON: {0}")]
    Dataset(String),
    #[error("no origin {0} in dataset")]
    NotInDataset(String),
    #[error("no origin available: provide a position fix, an origin dataset or --origin-lat/--origin-lon")]
    NoOrigin,
}

/// Geodetic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self, OriginError> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        if valid {
            Ok(Self { lat, lon })
        } else {
            Err(OriginError::InvalidCoordinate { lat, lon })
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

/// Where the session origin came from
#[derive(Debug, Clone, PartialEq)]
pub enum OriginSource {
    LiveFix,
    Dataset { name: Option<String> },
    Configured,
}

impl fmt::Display for OriginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginSource::LiveFix => write!(f, "live position fix"),
            OriginSource::Dataset { name: Some(name) } => write!(f, "dataset origin {name}"),
            OriginSource::Dataset { name: None } => write!(f, "dataset origin"),
            OriginSource::Configured => write!(f, "configured default"),
        }
    }
}

/// Pick exactly one origin. Priority: live fix, dataset, configured default.
pub fn select_origin(
    live_fix: Option<GeoPoint>,
    dataset: Option<(GeoPoint, Option<String>)>,
    configured: Option<GeoPoint>,
) -> Result<(GeoPoint, OriginSource), OriginError> {
    if let Some(point) = live_fix {
        return Ok((point, OriginSource::LiveFix));
    }
    if let Some((point, name)) = dataset {
        return Ok((point, OriginSource::Dataset { name }));
    }
    configured
        .map(|point| (point, OriginSource::Configured))
        .ok_or(OriginError::NoOrigin)
}

// GeoJSON FeatureCollection with one feature flagged `"origin": true`

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: serde_json::Value,
}

// Overpass API dump of aerodromes (`out center tags;`)

#[derive(Debug, Deserialize)]
struct OverpassResult {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

/// A named candidate origin from a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct OriginCandidate {
    pub point: GeoPoint,
    pub name: Option<String>,
    pub icao: Option<String>,
    pub flagged: bool,
}

/// Point dataset that may carry the session origin
#[derive(Debug, Clone, Default)]
pub struct OriginDataset {
    candidates: Vec<OriginCandidate>,
}

impl OriginDataset {
    pub fn from_json(text: &str) -> Result<Self, OriginError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(dataset_error)?;

        // GeoJSON announces itself; anything else is read as an Overpass dump
        let is_geojson = value.get("type").and_then(serde_json::Value::as_str)
            == Some("FeatureCollection");
        let candidates = if is_geojson {
            let collection: FeatureCollection =
                serde_json::from_value(value).map_err(dataset_error)?;
            collection
                .features
                .into_iter()
                .filter_map(candidate_from_feature)
                .collect()
        } else {
            let result: OverpassResult = serde_json::from_value(value).map_err(dataset_error)?;
            result
                .elements
                .into_iter()
                .filter_map(candidate_from_element)
                .collect()
        };

        Ok(Self { candidates })
    }

    #[cfg(test)]
    fn candidates(&self) -> &[OriginCandidate] {
        &self.candidates
    }

    /// Find the origin. With a `name`, match the ICAO code or name tag
    /// (case-insensitive); without one, take the feature flagged as origin.
    pub fn find_origin(&self, name: Option<&str>) -> Result<&OriginCandidate, OriginError> {
        let found = match name {
            Some(wanted) => self.candidates.iter().find(|c| {
                [c.icao.as_deref(), c.name.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|tag| tag.eq_ignore_ascii_case(wanted))
            }),
            None => self.candidates.iter().find(|c| c.flagged),
        };
        found.ok_or_else(|| {
            OriginError::NotInDataset(match name {
                Some(wanted) => format!("matching {wanted:?}"),
                None => "flagged as origin".to_string(),
            })
        })
    }
}

fn dataset_error(e: serde_json::Error) -> OriginError {
    OriginError::Dataset(e.to_string())
}

fn candidate_from_feature(feature: Feature) -> Option<OriginCandidate> {
    let geometry = feature.geometry?;
    if geometry.kind != "Point" {
        return None;
    }
    let coords = geometry.coordinates.as_array()?;
    // GeoJSON orders positions as [lon, lat]
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    let point = GeoPoint::new(lat, lon).ok()?;

    let props = feature.properties.unwrap_or_default();
    let text = |key: &str| props.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let flagged = match props.get("origin") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    Some(OriginCandidate {
        point,
        name: text("name"),
        icao: text("icao"),
        flagged,
    })
}

fn candidate_from_element(element: OverpassElement) -> Option<OriginCandidate> {
    let (lat, lon) = match (&element.center, element.lat, element.lon) {
        (Some(center), _, _) => (center.lat, center.lon),
        (None, Some(lat), Some(lon)) => (lat, lon),
        _ => return None,
    };
    let point = GeoPoint::new(lat, lon).ok()?;

    Some(OriginCandidate {
        point,
        name: element.tags.get("name").cloned(),
        icao: element.tags.get("icao").cloned(),
        flagged: element.tags.get("origin").is_some_and(|v| v == "yes" || v == "true"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-80.15, 26.07]},
             "properties": {"name": "Fort Lauderdale", "icao": "KFLL"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
             "properties": {"origin": true}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-80.29, 25.80]},
             "properties": {"name": "Miami International", "icao": "KMIA", "origin": true}}
        ]
    }"#;

    const OVERPASS: &str = r#"{
        "version": 0.6,
        "elements": [
            {"type": "way", "id": 1, "center": {"lat": 35.4362, "lon": -82.5418},
             "tags": {"aeroway": "aerodrome", "icao": "KAVL", "name": "Asheville Regional Airport"}},
            {"type": "node", "id": 2, "lat": 35.2140, "lon": -80.9431,
             "tags": {"aeroway": "aerodrome", "icao": "KCLT"}},
            {"type": "relation", "id": 3, "tags": {"icao": "NOPE"}}
        ]
    }"#;

    #[test]
    fn test_geopoint_validation() {
        assert!(GeoPoint::new(25.8, -80.29).is_ok());
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_geojson_flagged_origin() {
        let dataset = OriginDataset::from_json(GEOJSON).unwrap();
        assert_eq!(dataset.candidates().len(), 2);
        let origin = dataset.find_origin(None).unwrap();
        assert_eq!(origin.icao.as_deref(), Some("KMIA"));
        assert_eq!(origin.point, GeoPoint::new(25.80, -80.29).unwrap());
    }

    #[test]
    fn test_geojson_lookup_by_name() {
        let dataset = OriginDataset::from_json(GEOJSON).unwrap();
        let origin = dataset.find_origin(Some("kfll")).unwrap();
        assert_eq!(origin.name.as_deref(), Some("Fort Lauderdale"));
        assert!(!origin.flagged);
    }

    #[test]
    fn test_overpass_aerodromes() {
        let dataset = OriginDataset::from_json(OVERPASS).unwrap();
        assert_eq!(dataset.candidates().len(), 2);

        let avl = dataset.find_origin(Some("KAVL")).unwrap();
        assert_eq!(avl.point, GeoPoint::new(35.4362, -82.5418).unwrap());

        let clt = dataset.find_origin(Some("kclt")).unwrap();
        assert_eq!(clt.point.lat, 35.2140);

        let by_name = dataset.find_origin(Some("asheville regional airport")).unwrap();
        assert_eq!(by_name.icao.as_deref(), Some("KAVL"));
    }

    #[test]
    fn test_overpass_without_flag_has_no_default() {
        let dataset = OriginDataset::from_json(OVERPASS).unwrap();
        assert_eq!(
            dataset.find_origin(None),
            Err(OriginError::NotInDataset("flagged as origin".into()))
        );
    }

    #[test]
    fn test_empty_overpass_dump() {
        // Written when aerodrome lookup is skipped
        let dataset = OriginDataset::from_json("{}").unwrap();
        assert!(dataset.candidates().is_empty());
        assert!(dataset.find_origin(Some("KMIA")).is_err());
    }

    #[test]
    fn test_malformed_geojson_is_an_error() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-80.29, 25.80]},
                 "properties": "oops"}
            ]
        }"#;
        assert!(matches!(
            OriginDataset::from_json(text),
            Err(OriginError::Dataset(_))
        ));
        assert!(matches!(
            OriginDataset::from_json(r#"{"type": "FeatureCollection"}"#),
            Err(OriginError::Dataset(_))
        ));
    }

    #[test]
    fn test_invalid_dataset() {
        assert!(matches!(
            OriginDataset::from_json("not json"),
            Err(OriginError::Dataset(_))
        ));
    }

    #[test]
    fn test_select_origin_priority() {
        let fix = GeoPoint::new(1.0, 1.0).unwrap();
        let flagged = GeoPoint::new(2.0, 2.0).unwrap();
        let configured = GeoPoint::new(3.0, 3.0).unwrap();

        let (point, source) =
            select_origin(Some(fix), Some((flagged, None)), Some(configured)).unwrap();
        assert_eq!((point, source), (fix, OriginSource::LiveFix));

        let (point, source) =
            select_origin(None, Some((flagged, Some("KMIA".into()))), Some(configured)).unwrap();
        assert_eq!(point, flagged);
        assert_eq!(source, OriginSource::Dataset { name: Some("KMIA".into()) });

        let (point, source) = select_origin(None, None, Some(configured)).unwrap();
        assert_eq!((point, source), (configured, OriginSource::Configured));

        assert_eq!(select_origin(None, None, None), Err(OriginError::NoOrigin));
    }
}
