// Normalisation of MBTA prediction payloads into departure board rows.
//
// A payload is turned into rows in two steps: the "included" side-list is
// indexed once, then every primary record is filtered and resolved against
// those indexes. Nothing here outlives a single extraction call.

use chrono::{DateTime, FixedOffset};
use log::warn;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::mbta_api_models::{
    COMMUTER_RAIL_ROUTE_TYPE, IncludedEntity, PredictionsResponse, PrimaryRecord,
};

/// Shown in place of a platform code the agency has not announced yet.
pub const TRACK_TBD: &str = "TBD";
pub const STATUS_DELAYED: &str = "Delayed";

// ============================================================================
// Data Structures
// ============================================================================

/// One row of the departure board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Departure {
    pub time_label: String,
    pub destination: String,
    pub track: String,
    pub status: String,
}

/// Lookups built from the "included" side-list of one response.
#[derive(Debug, Default)]
pub struct Indexes {
    pub commuter_rail: HashSet<String>,
    pub track_of: HashMap<String, String>,
    pub destination_of: HashMap<String, String>,
    pub direction_of: HashMap<String, usize>,
    pub direction_names_of: HashMap<String, Vec<Option<String>>>,
    pub scheduled_departure_of: HashMap<String, String>,
}

/// Which primary records are eligible for the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Drop records whose route is not a commuter rail route.
    pub commuter_rail_only: bool,
    /// Drop records without a status label.
    pub require_status: bool,
    /// Keep only trips running in this named direction (e.g. "Outbound").
    pub direction: Option<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            commuter_rail_only: true,
            require_status: false,
            direction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("(Parse Error) {raw}")]
pub struct RowParseError {
    pub raw: String,
}

/// Every row-level formatting failure of one extraction, in row order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("Parse error: {}", join_errors(.0))]
pub struct ParseErrors(pub Vec<RowParseError>);

fn join_errors(errors: &[RowParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ParseErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rows produced from one payload, plus the failures that did not stop them.
///
/// `departures` is always meant to be displayed, even when `parse_errors` is
/// set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extraction {
    pub departures: Vec<Departure>,
    pub parse_errors: Option<ParseErrors>,
}

// ============================================================================
// Index Builder
// ============================================================================

pub fn build_indexes(included: &[IncludedEntity]) -> Indexes {
    let mut indexes = Indexes::default();

    for entity in included {
        match entity {
            IncludedEntity::Route { id, attributes } => {
                if attributes.route_type == Some(COMMUTER_RAIL_ROUTE_TYPE) {
                    indexes.commuter_rail.insert(id.clone());
                }
                indexes
                    .direction_names_of
                    .insert(id.clone(), attributes.direction_names.clone());
            }
            IncludedEntity::Stop { id, attributes } => {
                indexes.track_of.insert(
                    id.clone(),
                    attributes.platform_code.clone().unwrap_or_default(),
                );
            }
            IncludedEntity::Trip { id, attributes } => {
                indexes
                    .destination_of
                    .insert(id.clone(), attributes.headsign.clone().unwrap_or_default());
                if let Some(direction_id) = attributes.direction_id {
                    indexes.direction_of.insert(id.clone(), direction_id);
                }
            }
            IncludedEntity::Schedule { id, attributes } => {
                if let Some(departure_time) = &attributes.departure_time {
                    indexes
                        .scheduled_departure_of
                        .insert(id.clone(), departure_time.clone());
                }
            }
            IncludedEntity::Other => {}
        }
    }

    indexes
}

// ============================================================================
// Departure Extractor
// ============================================================================

pub fn extract_response(response: &PredictionsResponse, options: &ExtractOptions) -> Extraction {
    let indexes = build_indexes(&response.included);
    extract_departures(&response.data, &indexes, options)
}

pub fn extract_departures(
    records: &[PrimaryRecord],
    indexes: &Indexes,
    options: &ExtractOptions,
) -> Extraction {
    let mut departures = Vec::new();
    let mut parse_errors = ParseErrors::default();

    for record in records {
        let Some(departure_time) = record.attributes.departure_time.as_deref() else {
            continue;
        };
        if !is_eligible(record, indexes, options) {
            continue;
        }

        let destination = record
            .relationships
            .trip_id()
            .and_then(|trip_id| indexes.destination_of.get(trip_id))
            .cloned()
            .unwrap_or_default();

        let departs_at = parse_timestamp(departure_time);
        let time_label = match &departs_at {
            Some(time) => format_time_label(time),
            None => {
                let err = RowParseError {
                    raw: departure_time.to_string(),
                };
                warn!("Prediction {} has an unreadable departure time: {}", record.id, err);
                let label = err.to_string();
                parse_errors.0.push(err);
                label
            }
        };

        let status = match &record.attributes.status {
            Some(status) => status.clone(),
            None if departs_at.is_some_and(|t| is_behind_schedule(t, record, indexes)) => {
                STATUS_DELAYED.to_string()
            }
            None => String::new(),
        };

        let track = record
            .relationships
            .stop_id()
            .and_then(|stop_id| indexes.track_of.get(stop_id))
            .filter(|code| !code.is_empty())
            .cloned()
            .unwrap_or_else(|| TRACK_TBD.to_string());

        departures.push(Departure {
            time_label,
            destination,
            track,
            status,
        });
    }

    Extraction {
        departures,
        parse_errors: (!parse_errors.is_empty()).then_some(parse_errors),
    }
}

fn is_eligible(record: &PrimaryRecord, indexes: &Indexes, options: &ExtractOptions) -> bool {
    if options.require_status && record.attributes.status.is_none() {
        return false;
    }

    let route_id = record.relationships.route_id();
    if options.commuter_rail_only
        && !route_id.is_some_and(|id| indexes.commuter_rail.contains(id))
    {
        return false;
    }

    match &options.direction {
        Some(wanted) => direction_name(record, indexes) == Some(wanted.as_str()),
        None => true,
    }
}

fn direction_name<'a>(record: &PrimaryRecord, indexes: &'a Indexes) -> Option<&'a str> {
    let names = indexes.direction_names_of.get(record.relationships.route_id()?)?;
    let direction_id = indexes.direction_of.get(record.relationships.trip_id()?)?;
    names.get(*direction_id)?.as_deref()
}

fn is_behind_schedule(
    departs_at: DateTime<FixedOffset>,
    record: &PrimaryRecord,
    indexes: &Indexes,
) -> bool {
    record
        .relationships
        .schedule_id()
        .and_then(|id| indexes.scheduled_departure_of.get(id))
        .and_then(|scheduled| parse_timestamp(scheduled))
        .is_some_and(|scheduled| departs_at > scheduled)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Formats as a 12-hour clock label such as `4:30PM`, in the timestamp's own
/// offset.
pub fn format_time_label(time: &DateTime<FixedOffset>) -> String {
    time.format("%-I:%M%p").to_string()
}
