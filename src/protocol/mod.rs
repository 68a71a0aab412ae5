//! Protocol vocabulary shared by the default collaborators: route names and
//! paths, request messages, and the models the stores persist.

pub mod constants;
pub mod messages;
pub mod models;

pub use messages::Validated;
pub use models::{Client, Principal, Secret, Token};

/// OAuth 2.0 error response (RFC 6749 §5.2).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[error("{error}: {error_description}")]
pub struct ProtocolError {
    pub error: String,
    pub error_description: String,
}

impl ProtocolError {
    pub fn new(error: &str, description: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.into(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(constants::errors::INVALID_REQUEST, description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(constants::errors::INVALID_CLIENT, description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(constants::errors::INVALID_GRANT, description)
    }

    pub fn unsupported_grant_type(grant_type: &str) -> Self {
        Self::new(
            constants::errors::UNSUPPORTED_GRANT_TYPE,
            format!("grant type '{}' is not supported", grant_type),
        )
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new(constants::errors::INVALID_SCOPE, description)
    }

    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new(constants::errors::UNAUTHORIZED_CLIENT, description)
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::new(constants::errors::INVALID_TOKEN, description)
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(constants::errors::SERVER_ERROR, description)
    }
}
