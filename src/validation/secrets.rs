//! Client and API secret parsing and validation.
//!
//! Parsers and validators are registered as lists; the first parser that
//! finds credentials wins, and a secret is accepted if any validator accepts it.

use std::sync::Arc;

use axum::http::header;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::RequestContext;
use crate::protocol::constants::{authentication_methods, secret_types};
use crate::protocol::models::{ApiResource, Client, Secret};
use crate::protocol::ProtocolError;
use crate::services::Clock;
use crate::stores::{ClientStore, ResourceStore};

/// base64(sha256(plaintext)), the stored form of a shared secret.
pub fn hash_secret(plaintext: &str) -> String {
    STANDARD.encode(Sha256::digest(plaintext.as_bytes()))
}

/// Credentials found on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSecret {
    pub id: String,
    pub credential: Option<String>,
    pub secret_type: String,
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

pub trait SecretParser: Send + Sync {
    fn authentication_method(&self) -> &str;
    fn parse(&self, context: &RequestContext) -> Option<ParsedSecret>;
}

/// `Authorization: Basic base64(urlencoded(id):urlencoded(secret))` (RFC 6749 §2.3.1).
pub struct BasicAuthenticationSecretParser;

impl SecretParser for BasicAuthenticationSecretParser {
    fn authentication_method(&self) -> &str {
        authentication_methods::BASIC
    }

    fn parse(&self, context: &RequestContext) -> Option<ParsedSecret> {
        let value = context.header(header::AUTHORIZATION)?;
        if value.len() <= 6 || !value[..6].eq_ignore_ascii_case("basic ") {
            return None;
        }
        let decoded = String::from_utf8(STANDARD.decode(value[6..].trim()).ok()?).ok()?;
        let (id, secret) = decoded.split_once(':')?;
        let decode = |s: &str| {
            url::form_urlencoded::parse(format!("v={}", s).as_bytes())
                .next()
                .map(|(_, v)| v.into_owned())
        };
        let id = decode(id)?;
        if id.is_empty() {
            return None;
        }
        Some(ParsedSecret {
            id,
            credential: decode(secret),
            secret_type: secret_types::SHARED_SECRET.to_string(),
        })
    }
}

impl Component for BasicAuthenticationSecretParser {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(BasicAuthenticationSecretParser => dyn SecretParser);

/// `client_id` / `client_secret` form fields. A bare `client_id` identifies a
/// public client.
pub struct PostBodySecretParser;

impl SecretParser for PostBodySecretParser {
    fn authentication_method(&self) -> &str {
        authentication_methods::POST_BODY
    }

    fn parse(&self, context: &RequestContext) -> Option<ParsedSecret> {
        if !context.is_form_post() {
            return None;
        }
        let id = context.form.get("client_id").filter(|s| !s.is_empty())?;
        let secret = context.form.get("client_secret").filter(|s| !s.is_empty());
        Some(ParsedSecret {
            id: id.clone(),
            credential: secret.cloned(),
            secret_type: match secret {
                Some(_) => secret_types::SHARED_SECRET,
                None => secret_types::NO_SECRET,
            }
            .to_string(),
        })
    }
}

impl Component for PostBodySecretParser {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(PostBodySecretParser => dyn SecretParser);

pub trait SecretsListParser: Send + Sync {
    fn parse(&self, context: &RequestContext) -> Option<ParsedSecret>;
    fn available_authentication_methods(&self) -> Vec<String>;
}

pub struct DefaultSecretsListParser {
    parsers: Vec<Arc<dyn SecretParser>>,
}

impl DefaultSecretsListParser {
    pub fn new(parsers: Vec<Arc<dyn SecretParser>>) -> Self {
        Self { parsers }
    }
}

impl Component for DefaultSecretsListParser {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve_all()?))
    }
}

crate::provides!(DefaultSecretsListParser => dyn SecretsListParser);

impl SecretsListParser for DefaultSecretsListParser {
    fn parse(&self, context: &RequestContext) -> Option<ParsedSecret> {
        let found = self.parsers.iter().find_map(|p| p.parse(context));
        if found.is_none() {
            log::debug!("secrets:parse none found parsers={}", self.parsers.len());
        }
        found
    }

    fn available_authentication_methods(&self) -> Vec<String> {
        self.parsers
            .iter()
            .map(|p| p.authentication_method().to_string())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

pub trait SecretValidator: Send + Sync {
    fn validate(&self, secrets: &[Secret], parsed: &ParsedSecret) -> bool;
}

/// Compares the hash of the presented secret against stored hashes in
/// constant time. Expired secrets never match.
pub struct HashedSharedSecretValidator {
    clock: Arc<dyn Clock>,
}

impl HashedSharedSecretValidator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Component for HashedSharedSecretValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?))
    }
}

crate::provides!(HashedSharedSecretValidator => dyn SecretValidator);

impl SecretValidator for HashedSharedSecretValidator {
    fn validate(&self, secrets: &[Secret], parsed: &ParsedSecret) -> bool {
        if parsed.secret_type != secret_types::SHARED_SECRET {
            return false;
        }
        let Some(credential) = parsed.credential.as_deref() else {
            return false;
        };
        let presented = hash_secret(credential);
        let now = self.clock.now();
        secrets
            .iter()
            .filter(|s| s.secret_type == secret_types::SHARED_SECRET && !s.is_expired(now))
            .any(|s| bool::from(s.value.as_bytes().ct_eq(presented.as_bytes())))
    }
}

pub trait SecretsListValidator: Send + Sync {
    fn validate(&self, secrets: &[Secret], parsed: &ParsedSecret) -> bool;
}

pub struct DefaultSecretsListValidator {
    validators: Vec<Arc<dyn SecretValidator>>,
}

impl DefaultSecretsListValidator {
    pub fn new(validators: Vec<Arc<dyn SecretValidator>>) -> Self {
        Self { validators }
    }
}

impl Component for DefaultSecretsListValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve_all()?))
    }
}

crate::provides!(DefaultSecretsListValidator => dyn SecretsListValidator);

impl SecretsListValidator for DefaultSecretsListValidator {
    fn validate(&self, secrets: &[Secret], parsed: &ParsedSecret) -> bool {
        self.validators.iter().any(|v| v.validate(secrets, parsed))
    }
}

// ---------------------------------------------------------------------------
// Client and API authentication
// ---------------------------------------------------------------------------

/// Authenticates the calling client of a back-channel request.
pub trait ClientSecretValidator: Send + Sync {
    fn validate(&self, context: &RequestContext) -> Result<Client, ProtocolError>;
}

pub struct DefaultClientSecretValidator {
    parser: Arc<dyn SecretsListParser>,
    validator: Arc<dyn SecretsListValidator>,
    clients: Arc<dyn ClientStore>,
}

impl Component for DefaultClientSecretValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            parser: resolver.resolve()?,
            validator: resolver.resolve()?,
            clients: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultClientSecretValidator => dyn ClientSecretValidator);

impl ClientSecretValidator for DefaultClientSecretValidator {
    fn validate(&self, context: &RequestContext) -> Result<Client, ProtocolError> {
        let parsed = self
            .parser
            .parse(context)
            .ok_or_else(|| ProtocolError::invalid_client("no client credentials found"))?;
        let client = self
            .clients
            .find_client_by_id(&parsed.id)
            .filter(|c| c.enabled)
            .ok_or_else(|| {
                log::warn!("secrets:client unknown client={}", parsed.id);
                ProtocolError::invalid_client("unknown client")
            })?;

        if !client.require_client_secret || parsed.secret_type == secret_types::NO_SECRET {
            if client.require_client_secret {
                return Err(ProtocolError::invalid_client("client secret required"));
            }
            return Ok(client);
        }
        if !self.validator.validate(&client.client_secrets, &parsed) {
            log::warn!("secrets:client invalid secret client={}", client.client_id);
            return Err(ProtocolError::invalid_client("invalid client secret"));
        }
        log::debug!("secrets:client ok client={}", client.client_id);
        Ok(client)
    }
}

/// Authenticates an API resource calling introspection.
pub trait ApiSecretValidator: Send + Sync {
    fn validate(&self, context: &RequestContext) -> Result<ApiResource, ProtocolError>;
}

pub struct DefaultApiSecretValidator {
    parser: Arc<dyn SecretsListParser>,
    validator: Arc<dyn SecretsListValidator>,
    resources: Arc<dyn ResourceStore>,
}

impl Component for DefaultApiSecretValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            parser: resolver.resolve()?,
            validator: resolver.resolve()?,
            resources: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultApiSecretValidator => dyn ApiSecretValidator);

impl ApiSecretValidator for DefaultApiSecretValidator {
    fn validate(&self, context: &RequestContext) -> Result<ApiResource, ProtocolError> {
        let parsed = self
            .parser
            .parse(context)
            .ok_or_else(|| ProtocolError::invalid_client("no API credentials found"))?;
        let api = self
            .resources
            .find_api_resource(&parsed.id)
            .ok_or_else(|| ProtocolError::invalid_client("unknown API resource"))?;
        if api.api_secrets.is_empty() || !self.validator.validate(&api.api_secrets, &parsed) {
            log::warn!("secrets:api invalid secret api={}", api.name);
            return Err(ProtocolError::invalid_client("invalid API secret"));
        }
        Ok(api)
    }
}
