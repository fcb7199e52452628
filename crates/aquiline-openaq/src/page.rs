//! Typed models for OpenAQ v3 responses.
//!
//! Pages are validated at the fetch boundary: required fields missing
//! from the JSON fail the whole page with a decode error instead of
//! propagating partial records downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Response metadata common to every paginated endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    /// Total rows available for the request, known after the first page.
    #[serde(deserialize_with = "deserialize_found")]
    pub found: u64,
}

/// One paginated API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub meta: PageMeta,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// `meta.found` is usually an integer, but some endpoints report an
/// estimate like `">1000"` once the count exceeds one page. Take the
/// digits either way.
fn deserialize_found<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Found {
        Int(u64),
        Text(String),
    }

    match Found::deserialize(deserializer)? {
        Found::Int(n) => Ok(n),
        Found::Text(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("unparsable found: {s:?}")))
        }
    }
}

/// UTC instant plus the upstream's local-time rendering, carried
/// verbatim so the offset survives the trip.
#[derive(Debug, Clone, Deserialize)]
pub struct DateTimePair {
    pub utc: DateTime<Utc>,
    pub local: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterRef {
    pub id: i64,
    pub name: String,
    pub units: Option<String>,
}

/// Measurement aggregation period.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub label: Option<String>,
    pub datetime_from: Option<DateTimePair>,
    pub datetime_to: DateTimePair,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub percent_complete: Option<f64>,
}

/// One sensor measurement row.
#[derive(Debug, Clone, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub parameter: ParameterRef,
    pub period: Period,
    pub coverage: Option<Coverage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Sensor entry as it appears nested in a location.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorRef {
    pub id: i64,
    pub parameter: ParameterRef,
}

/// One monitoring location with its sensors.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: Option<String>,
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub sensors: Vec<SensorRef>,
}
