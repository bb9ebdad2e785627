// Fetching departures from the MBTA V3 predictions endpoint.
//
// Live requests and canned fixture files go through the same classification:
// an error envelope always wins, then the HTTP status, then the payload is
// decoded and normalised.

use log::{debug, info, warn};
use reqwest::blocking;
use std::fs;
use std::path::PathBuf;

use crate::config::ServiceConfig;
use crate::departures::{extract_response, ExtractOptions, Extraction};
use crate::error::{Result, ServiceError};
use crate::mbta_api_models::{error_entries, ApiErrorEntry, ApiErrors, PredictionsResponse};

const PREDICTIONS_PATH: &str = "predictions";
const INCLUDE: &str = "route,stop,trip,schedule";
const SORT: &str = "departure_time";

/// Something that can produce the departure rows for a stop.
pub trait DepartureSource: Send + Sync {
    fn list_departures(&self, stop_id: &str) -> Result<Extraction>;
}

// ============================================================================
// Live API
// ============================================================================

pub struct MbtaClient {
    client: blocking::Client,
    config: ServiceConfig,
    options: ExtractOptions,
}

impl MbtaClient {
    pub fn new(config: ServiceConfig, options: ExtractOptions) -> Result<Self> {
        let client = blocking::Client::builder().timeout(config.timeout).build()?;

        Ok(MbtaClient {
            client,
            config,
            options,
        })
    }

    fn predictions_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            PREDICTIONS_PATH
        )
    }
}

impl DepartureSource for MbtaClient {
    fn list_departures(&self, stop_id: &str) -> Result<Extraction> {
        let mut request = self
            .client
            .get(self.predictions_url())
            .query(&[("filter[stop]", stop_id), ("include", INCLUDE), ("sort", SORT)]);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("x-api-key", api_key);
        }

        let request = request.build()?;
        debug!("request: {} {}", request.method(), request.url());

        let response = self.client.execute(request)?;
        let status = response.status().as_u16();
        let body = response.bytes()?;

        let extraction = classify_response(status, &body, &self.options).map_err(|e| {
            warn!("Fetching departures for {} failed: {}", stop_id, e);
            e
        })?;
        info!(
            "Loaded {} departures for {}",
            extraction.departures.len(),
            stop_id
        );
        Ok(extraction)
    }
}

// ============================================================================
// Fixture Files
// ============================================================================

/// Serves a canned API response from disk, whatever stop is asked for.
pub struct FixtureSource {
    pub path: PathBuf,
    pub options: ExtractOptions,
}

impl FixtureSource {
    pub fn new(path: impl Into<PathBuf>, options: ExtractOptions) -> Self {
        FixtureSource {
            path: path.into(),
            options,
        }
    }
}

impl DepartureSource for FixtureSource {
    fn list_departures(&self, stop_id: &str) -> Result<Extraction> {
        debug!("Serving {} from {:?}", stop_id, self.path);
        let body = fs::read(&self.path)?;
        classify_response(200, &body, &self.options)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Turns a raw upstream reply into rows, or the fatal error that prevents it.
pub fn classify_response(status: u16, body: &[u8], options: &ExtractOptions) -> Result<Extraction> {
    if let Some(entries) = error_entries(body) {
        return Err(ServiceError::Upstream(ApiErrors(entries)));
    }

    if !(200..300).contains(&status) {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unexpected status");
        return Err(ServiceError::Upstream(ApiErrors(vec![ApiErrorEntry {
            status: status.to_string(),
            detail: format!("{} ({})", reason, status),
            ..ApiErrorEntry::default()
        }])));
    }

    let response: PredictionsResponse = serde_json::from_slice(body)?;
    let extraction = extract_response(&response, options);

    if let Some(errors) = &extraction.parse_errors {
        warn!("{} of {} rows could not be parsed", errors.len(), extraction.departures.len());
    }

    Ok(extraction)
}
