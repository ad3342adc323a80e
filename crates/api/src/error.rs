//! Error types for direct API calls

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response body from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Contract violated ({check}) for {username}: {detail}")]
    Contract {
        check: String,
        username: String,
        detail: String,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;
