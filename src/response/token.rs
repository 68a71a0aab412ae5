use std::sync::Arc;

use serde::Serialize;

use crate::container::{Component, ResolutionError, Resolver};
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::{grant_types, OPENID_SCOPE};
use crate::protocol::messages::TokenRequest;
use crate::protocol::Validated;
use crate::services::resources::OFFLINE_ACCESS_SCOPE;
use crate::services::{Event, EventService, RefreshTokenService, TokenCreationRequest, TokenService};

/// Successful token response (RFC 6749 §5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

pub trait TokenResponseGenerator: Send + Sync {
    fn process(
        &self,
        issuer: &str,
        request: &Validated<TokenRequest>,
    ) -> TollgateResult<TokenResponse>;
}

pub struct DefaultTokenResponseGenerator {
    tokens: Arc<dyn TokenService>,
    refresh_tokens: Arc<dyn RefreshTokenService>,
    events: Arc<dyn EventService>,
}

impl Component for DefaultTokenResponseGenerator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            tokens: resolver.resolve()?,
            refresh_tokens: resolver.resolve()?,
            events: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultTokenResponseGenerator => dyn TokenResponseGenerator);

impl TokenResponseGenerator for DefaultTokenResponseGenerator {
    fn process(
        &self,
        issuer: &str,
        request: &Validated<TokenRequest>,
    ) -> TollgateResult<TokenResponse> {
        let client = request
            .client
            .as_ref()
            .ok_or_else(|| TollgateError::Other("validated token request has no client".into()))?;
        let grant_type = request.request.grant_type.as_str();
        let creation = TokenCreationRequest {
            issuer: issuer.to_string(),
            client: client.clone(),
            subject: request.subject.clone(),
            scopes: request.scopes.clone(),
            nonce: request.nonce.clone(),
        };

        let access_token = self.tokens.create_access_token(&creation)?;
        let serialized = self.tokens.create_security_token(&access_token)?;

        let refresh_token = match request.request.refresh_token.as_deref() {
            Some(old) if grant_type == grant_types::REFRESH_TOKEN => Some(
                self.refresh_tokens
                    .update_refresh_token(old, &access_token, client)?,
            ),
            _ if request.subject.is_some()
                && request.scopes.iter().any(|s| s == OFFLINE_ACCESS_SCOPE) =>
            {
                Some(self.refresh_tokens.create_refresh_token(&access_token, client)?)
            }
            _ => None,
        };

        let wants_identity = request.subject.is_some()
            && grant_type != grant_types::CLIENT_CREDENTIALS
            && request.scopes.iter().any(|s| s == OPENID_SCOPE);
        let id_token = if wants_identity {
            let token = self.tokens.create_identity_token(&creation)?;
            Some(self.tokens.create_security_token(&token)?)
        } else {
            None
        };

        let subject_id = request.subject.as_ref().map(|s| s.subject.as_str());
        log::info!(
            "token:issue client={} grant_type={} sub={} refresh={}",
            client.client_id,
            grant_type,
            subject_id.unwrap_or("-"),
            refresh_token.is_some()
        );
        self.events.raise(Event::token_issued(&client.client_id, subject_id));

        Ok(TokenResponse {
            access_token: serialized,
            token_type: "Bearer".into(),
            expires_in: access_token.lifetime,
            refresh_token,
            id_token,
            scope: request.scopes.join(" "),
        })
    }
}
