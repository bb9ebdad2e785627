use thiserror::Error;

use crate::mbta_api_models::ApiErrors;

/// Failures that leave a board with no rows at all.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Upstream(ApiErrors),

    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
