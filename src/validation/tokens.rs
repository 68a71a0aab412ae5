use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::constants::claim_types;
use crate::protocol::models::{AccessTokenType, Token};
use crate::protocol::ProtocolError;
use crate::services::tokens::decode_jws;
use crate::services::{Clock, GrantStore, KeyMaterialService};
use crate::stores::ClientStore;

/// Validates tokens this server issued.
pub trait TokenValidator: Send + Sync {
    /// A JWT or reference access token.
    fn validate_access_token(&self, token: &str) -> Result<Token, ProtocolError>;
    /// An identity token, optionally bound to `client_id`. Expired tokens are
    /// accepted when `allow_expired` is set (id_token_hint on logout).
    fn validate_identity_token(
        &self,
        token: &str,
        client_id: Option<&str>,
        allow_expired: bool,
    ) -> Result<Token, ProtocolError>;
}

pub trait CustomTokenValidator: Send + Sync {
    fn validate(&self, token: &Token) -> Result<(), ProtocolError>;
}

pub struct DefaultCustomTokenValidator;

impl CustomTokenValidator for DefaultCustomTokenValidator {
    fn validate(&self, _token: &Token) -> Result<(), ProtocolError> {
        Ok(())
    }
}

impl Component for DefaultCustomTokenValidator {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(DefaultCustomTokenValidator => dyn CustomTokenValidator);

pub struct DefaultTokenValidator {
    keys: Arc<dyn KeyMaterialService>,
    reference_tokens: Arc<dyn GrantStore<Token>>,
    clients: Arc<dyn ClientStore>,
    custom: Arc<dyn CustomTokenValidator>,
    clock: Arc<dyn Clock>,
}

const REGISTERED_CLAIMS: [&str; 9] = [
    claim_types::ISSUER,
    claim_types::AUDIENCE,
    claim_types::CLIENT_ID,
    claim_types::SUBJECT,
    claim_types::SESSION_ID,
    claim_types::SCOPE,
    claim_types::ISSUED_AT,
    claim_types::NOT_BEFORE,
    claim_types::EXPIRATION,
];

/// Rebuild a [`Token`] from a verified JWT payload.
fn token_from_payload(payload: &Value) -> Option<Token> {
    let text = |name: &str| payload.get(name).and_then(Value::as_str).map(str::to_string);
    let strings = |name: &str| match payload.get(name) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let issued_at = payload.get(claim_types::ISSUED_AT)?.as_i64()?;
    let expires = payload.get(claim_types::EXPIRATION)?.as_i64()?;
    let claims: BTreeMap<String, String> = payload
        .as_object()?
        .iter()
        .filter(|(k, _)| !REGISTERED_CLAIMS.contains(&k.as_str()))
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();

    Some(Token {
        issuer: text(claim_types::ISSUER)?,
        audiences: strings(claim_types::AUDIENCE),
        client_id: text(claim_types::CLIENT_ID).unwrap_or_default(),
        subject: text(claim_types::SUBJECT),
        session_id: text(claim_types::SESSION_ID),
        scopes: strings(claim_types::SCOPE),
        creation_time: DateTime::<Utc>::from_timestamp(issued_at, 0)?,
        lifetime: u64::try_from(expires - issued_at).ok()?,
        access_token_type: AccessTokenType::Jwt,
        claims,
    })
}

fn is_jwt(token: &str) -> bool {
    token.split('.').count() == 3
}

impl DefaultTokenValidator {
    fn decode(&self, jwt: &str) -> Result<Token, ProtocolError> {
        decode_jws(self.keys.as_ref(), jwt)
            .as_ref()
            .and_then(token_from_payload)
            .ok_or_else(|| ProtocolError::invalid_token("token signature or format is invalid"))
    }

    fn check_client(&self, token: &Token) -> Result<(), ProtocolError> {
        match self.clients.find_client_by_id(&token.client_id) {
            Some(client) if client.enabled => Ok(()),
            _ => Err(ProtocolError::invalid_token("token client is unknown or disabled")),
        }
    }
}

impl Component for DefaultTokenValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            keys: resolver.resolve()?,
            reference_tokens: resolver.resolve()?,
            clients: resolver.resolve()?,
            custom: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultTokenValidator => dyn TokenValidator);

impl TokenValidator for DefaultTokenValidator {
    fn validate_access_token(&self, token: &str) -> Result<Token, ProtocolError> {
        let parsed = if is_jwt(token) {
            self.decode(token)?
        } else {
            self.reference_tokens
                .get(token)
                .ok_or_else(|| ProtocolError::invalid_token("unknown reference token"))?
        };
        if parsed.is_expired(self.clock.now()) {
            log::debug!("token:validate expired client={}", parsed.client_id);
            return Err(ProtocolError::invalid_token("token expired"));
        }
        self.check_client(&parsed)?;
        self.custom.validate(&parsed)?;
        Ok(parsed)
    }

    fn validate_identity_token(
        &self,
        token: &str,
        client_id: Option<&str>,
        allow_expired: bool,
    ) -> Result<Token, ProtocolError> {
        let parsed = self.decode(token)?;
        if parsed.subject.is_none() {
            return Err(ProtocolError::invalid_token("identity token without subject"));
        }
        if let Some(client_id) = client_id {
            if !parsed.audiences.iter().any(|a| a == client_id) {
                return Err(ProtocolError::invalid_token("identity token issued to another client"));
            }
        }
        if !allow_expired && parsed.is_expired(self.clock.now()) {
            return Err(ProtocolError::invalid_token("identity token expired"));
        }
        let audience = parsed.audiences.first().cloned().unwrap_or_default();
        let client = self
            .clients
            .find_client_by_id(&audience)
            .filter(|c| c.enabled)
            .ok_or_else(|| ProtocolError::invalid_token("identity token client is unknown"))?;
        self.custom.validate(&parsed)?;
        Ok(Token {
            client_id: client.client_id,
            ..parsed
        })
    }
}
