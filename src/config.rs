use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::departures::ExtractOptions;

pub const DEFAULT_BASE_URL: &str = "https://api-v3.mbta.com/";

#[derive(Parser, Debug, Clone)]
#[command(name = "commuter-board", about = "MBTA commuter rail departure board", version)]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT")]
    pub port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Root of the MBTA V3 API.
    #[arg(long, env = "MBTA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Optional API key, raises the agency's rate limit.
    #[arg(long, env = "MBTA_API_KEY")]
    pub api_key: Option<String>,

    /// Timeout for each upstream request, in seconds.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Only show trips running in this direction (e.g. "Outbound").
    #[arg(long)]
    pub direction: Option<String>,

    /// Hide predictions that carry no status label.
    #[arg(long)]
    pub require_status: bool,

    /// Show every mode stopping at the station, not just commuter rail.
    #[arg(long)]
    pub all_modes: bool,

    /// Directory holding the canned payloads served on /test and /testerror.
    #[arg(long, default_value = "testdata")]
    pub fixtures_dir: PathBuf,
}

/// Everything the upstream client needs, handed over at construction.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            commuter_rail_only: !self.all_modes,
            require_status: self.require_status,
            direction: self.direction.clone().filter(|d| !d.is_empty()),
        }
    }
}
