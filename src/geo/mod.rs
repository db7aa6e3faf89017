use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;
pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;

/// Failure to build or decode a [`GeoPoint`].
///
/// These indicate a schema or protocol mismatch rather than a transient store
/// condition, so they are kept apart from `StoreError`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("bad geo point representation: {0:?}")]
    Malformed(String),
}

/// A validated (longitude, latitude) pair.
///
/// Serialized as its textual form `(<longitude>,<latitude>)`, which is also the
/// encoding used by the store file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoPoint {
    longitude: f64,
    latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, GeoError> {
        if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
            return Err(GeoError::LongitudeOutOfRange(longitude));
        }
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
            return Err(GeoError::LatitudeOutOfRange(latitude));
        }

        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Straight-line distance on raw degrees. Not a geodesic distance.
    pub fn planar_distance(&self, other: &GeoPoint) -> f64 {
        let d_lat = other.latitude - self.latitude;
        let d_lon = other.longitude - self.longitude;
        (d_lat * d_lat + d_lon * d_lon).sqrt()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.longitude, self.latitude)
    }
}

impl FromStr for GeoPoint {
    type Err = GeoError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || GeoError::Malformed(raw.to_string());

        let inner = raw
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(malformed)?;

        let (lon, lat) = inner.split_once(',').ok_or_else(malformed)?;
        let longitude = lon.trim().parse::<f64>().map_err(|_| malformed())?;
        let latitude = lat.trim().parse::<f64>().map_err(|_| malformed())?;

        GeoPoint::new(longitude, latitude)
    }
}

impl TryFrom<String> for GeoPoint {
    type Error = GeoError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<GeoPoint> for String {
    fn from(point: GeoPoint) -> Self {
        point.to_string()
    }
}

/// Region bounded by a north-west and a south-east corner, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub nw: GeoPoint,
    pub se: GeoPoint,
}

impl BoundingBox {
    pub fn new(nw: GeoPoint, se: GeoPoint) -> Self {
        Self { nw, se }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.nw.longitude <= point.longitude
            && point.longitude <= self.se.longitude
            && self.se.latitude <= point.latitude
            && point.latitude <= self.nw.latitude
    }
}
