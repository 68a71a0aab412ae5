use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::models::{Client, Principal, Token};

// ---------------------------------------------------------------------------
// Inbound requests
// ---------------------------------------------------------------------------

/// Authorization request (RFC 6749 §4.1.1, OIDC Core §3.1.2.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Option<String>,
    pub response_mode: Option<String>,
}

/// Token request (RFC 6749 §4.1.3, §4.4.2, §6; RFC 8628 §3.4).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub device_code: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Revocation request (RFC 7009 §2.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
}

/// Introspection request (RFC 7662 §2.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrospectionRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndSessionRequest {
    pub id_token_hint: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfoRequest {
    pub access_token: String,
}

/// Device authorization request (RFC 8628 §3.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceAuthorizationRequest {
    pub client_id: Option<String>,
    pub scope: Option<String>,
}

impl AuthorizeRequest {
    /// Rebuild from query parameters, as used by the return URL parser.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let get = |k: &str| params.get(k).cloned();
        Self {
            client_id: get("client_id").unwrap_or_default(),
            redirect_uri: get("redirect_uri").unwrap_or_default(),
            response_type: get("response_type").unwrap_or_default(),
            scope: get("scope").unwrap_or_default(),
            state: get("state"),
            nonce: get("nonce"),
            code_challenge: get("code_challenge"),
            code_challenge_method: get("code_challenge_method"),
            prompt: get("prompt"),
            response_mode: get("response_mode"),
        }
    }
}

/// Split a space-delimited scope string.
pub fn split_scopes(scope: &str) -> Vec<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Validation output
// ---------------------------------------------------------------------------

/// A request that passed validation, with everything the validator resolved
/// along the way.
#[derive(Debug, Clone)]
pub struct Validated<R> {
    pub request: R,
    pub client: Option<Client>,
    pub subject: Option<Principal>,
    pub scopes: Vec<String>,
    pub token: Option<Token>,
    /// Carried from the authorization request into the identity token.
    pub nonce: Option<String>,
}

impl<R> Validated<R> {
    pub fn new(request: R) -> Self {
        Self {
            request,
            client: None,
            subject: None,
            scopes: Vec::new(),
            token: None,
            nonce: None,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_subject(mut self, subject: Principal) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client.as_ref().map(|c| c.client_id.as_str())
    }
}
