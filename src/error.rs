use serde::Serialize;

use crate::container::{ConfigurationError, ResolutionError};
use crate::protocol::ProtocolError;
use crate::stores::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum TollgateError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Serialize for TollgateError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<TollgateError> for axum::http::StatusCode {
    fn from(err: TollgateError) -> Self {
        match err {
            TollgateError::Protocol(_) => axum::http::StatusCode::BAD_REQUEST,
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type TollgateResult<T> = Result<T, TollgateError>;
