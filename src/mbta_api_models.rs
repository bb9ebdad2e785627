// API models for the MBTA V3 API (https://api-v3.mbta.com/)
//
// The predictions endpoint returns a JSON:API document:
// - "data": primary prediction records pointing at related entities by id
// - "included": a flat side-list of routes, stops, trips and schedules
// - "errors": present instead of "data" when the request was rejected
//
// Only the fields the departure board needs are modelled here. Empty strings
// and absent values are both decoded as `None`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Route type code the MBTA uses for commuter rail.
pub const COMMUTER_RAIL_ROUTE_TYPE: i64 = 2;

// ============================================================================
// Primary Records
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionsResponse {
    pub data: Vec<PrimaryRecord>,
    #[serde(default)]
    pub included: Vec<IncludedEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrimaryRecord {
    pub id: String,
    #[serde(default)]
    pub attributes: RecordAttributes,
    #[serde(default)]
    pub relationships: RecordRelationships,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordAttributes {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub departure_time: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordRelationships {
    #[serde(default)]
    pub route: Option<Relationship>,
    #[serde(default)]
    pub stop: Option<Relationship>,
    #[serde(default)]
    pub trip: Option<Relationship>,
    #[serde(default)]
    pub schedule: Option<Relationship>,
}

/// A to-one relationship. `data` is `null` when the link is absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<ResourceIdentifier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceIdentifier {
    pub id: String,
}

impl RecordRelationships {
    pub fn route_id(&self) -> Option<&str> {
        related_id(&self.route)
    }

    pub fn stop_id(&self) -> Option<&str> {
        related_id(&self.stop)
    }

    pub fn trip_id(&self) -> Option<&str> {
        related_id(&self.trip)
    }

    pub fn schedule_id(&self) -> Option<&str> {
        related_id(&self.schedule)
    }
}

fn related_id(relationship: &Option<Relationship>) -> Option<&str> {
    relationship
        .as_ref()
        .and_then(|r| r.data.as_ref())
        .map(|d| d.id.as_str())
}

// ============================================================================
// Included Entities
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncludedEntity {
    Route {
        id: String,
        #[serde(default)]
        attributes: RouteAttributes,
    },
    Stop {
        id: String,
        #[serde(default)]
        attributes: StopAttributes,
    },
    Trip {
        id: String,
        #[serde(default)]
        attributes: TripAttributes,
    },
    Schedule {
        id: String,
        #[serde(default)]
        attributes: ScheduleAttributes,
    },
    /// Any other kind the API decides to embed (vehicles, alerts, ...).
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteAttributes {
    #[serde(rename = "type", default)]
    pub route_type: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub direction_names: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopAttributes {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub platform_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripAttributes {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub headsign: Option<String>,
    #[serde(default)]
    pub direction_id: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleAttributes {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub departure_time: Option<String>,
}

// ============================================================================
// Error Envelope
// ============================================================================

/// Finds the error entries in a reply body, if it is an error envelope.
///
/// Any non-empty `errors` array counts, even when its entries do not look the
/// way the API documents them. Entries that cannot be read keep their raw
/// JSON as the detail.
pub fn error_entries(body: &[u8]) -> Option<Vec<ApiErrorEntry>> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let errors = value.get("errors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }

    let entries = errors
        .iter()
        .map(|raw| {
            serde_json::from_value::<ApiErrorEntry>(raw.clone()).unwrap_or_else(|_| ApiErrorEntry {
                detail: raw.to_string(),
                ..ApiErrorEntry::default()
            })
        })
        .collect();
    Some(entries)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub detail: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub parameter: Option<String>,
}

/// The entries of an API error envelope, kept together so they can be
/// reported as one upstream failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiErrors(pub Vec<ApiErrorEntry>);

impl fmt::Display for ApiErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "MBTA API error: {}", single.detail),
            entries => write!(f, "MBTA API error: {:?}", entries),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Accepts strings, numbers and booleans (`"429"` and `429` alike); `null`
/// becomes an empty string.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_string(deserializer)?.unwrap_or_default())
}

fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
