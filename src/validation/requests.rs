//! Validators for the smaller back-channel endpoints.

use std::sync::Arc;

use super::secrets::{ApiSecretValidator, ClientSecretValidator};
use super::{RedirectUriValidator, RequestValidator, TokenValidator};
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::RequestContext;
use crate::protocol::constants::{claim_types, errors, grant_types, token_type_hints, OPENID_SCOPE};
use crate::protocol::messages::{
    split_scopes, DeviceAuthorizationRequest, EndSessionRequest, IntrospectionRequest,
    RevocationRequest, UserInfoRequest,
};
use crate::protocol::models::Principal;
use crate::protocol::{ProtocolError, Token, Validated};
use crate::services::resources::ResourceValidator;
use crate::stores::ClientStore;

fn principal_of(token: &Token) -> Option<Principal> {
    let subject = token.subject.as_deref()?;
    let mut principal = Principal::new(subject);
    if let Some(sid) = &token.session_id {
        principal = principal.with_claim(claim_types::SESSION_ID, sid.clone());
    }
    Some(principal)
}

// ---------------------------------------------------------------------------
// Introspection (RFC 7662)
// ---------------------------------------------------------------------------

/// Authenticates the calling API. An unusable token is not an error: the
/// validated request simply carries no token and is reported inactive.
pub struct IntrospectionRequestValidator {
    apis: Arc<dyn ApiSecretValidator>,
    tokens: Arc<dyn TokenValidator>,
}

impl Component for IntrospectionRequestValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            apis: resolver.resolve()?,
            tokens: resolver.resolve()?,
        })
    }
}

crate::provides!(IntrospectionRequestValidator => dyn RequestValidator<IntrospectionRequest>);

impl RequestValidator<IntrospectionRequest> for IntrospectionRequestValidator {
    fn validate(
        &self,
        context: &RequestContext,
        request: IntrospectionRequest,
    ) -> Result<Validated<IntrospectionRequest>, ProtocolError> {
        let api = self.apis.validate(context)?;
        if request.token.is_empty() {
            return Err(ProtocolError::invalid_request("token is missing"));
        }

        let token = match self.tokens.validate_access_token(&request.token) {
            Ok(token) => token,
            Err(e) => {
                log::debug!("introspect:validate inactive api={} reason={}", api.name, e);
                return Ok(Validated::new(request));
            }
        };
        let scopes: Vec<String> = token
            .scopes
            .iter()
            .filter(|s| api.scopes.contains(s))
            .cloned()
            .collect();
        if scopes.is_empty() {
            log::debug!("introspect:validate api={} not in token audience", api.name);
            return Ok(Validated::new(request));
        }

        let mut validated = Validated::new(request).with_scopes(scopes);
        if let Some(subject) = principal_of(&token) {
            validated = validated.with_subject(subject);
        }
        Ok(validated.with_token(token))
    }
}

// ---------------------------------------------------------------------------
// Revocation (RFC 7009)
// ---------------------------------------------------------------------------

pub struct TokenRevocationRequestValidator {
    secrets: Arc<dyn ClientSecretValidator>,
}

impl Component for TokenRevocationRequestValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            secrets: resolver.resolve()?,
        })
    }
}

crate::provides!(TokenRevocationRequestValidator => dyn RequestValidator<RevocationRequest>);

impl RequestValidator<RevocationRequest> for TokenRevocationRequestValidator {
    fn validate(
        &self,
        context: &RequestContext,
        request: RevocationRequest,
    ) -> Result<Validated<RevocationRequest>, ProtocolError> {
        let client = self.secrets.validate(context)?;
        if request.token.is_empty() {
            return Err(ProtocolError::invalid_request("token is missing"));
        }
        match request.token_type_hint.as_deref() {
            None
            | Some(token_type_hints::ACCESS_TOKEN)
            | Some(token_type_hints::REFRESH_TOKEN) => {}
            Some(other) => {
                return Err(ProtocolError::new(
                    errors::UNSUPPORTED_TOKEN_TYPE,
                    format!("token type hint '{}' is not supported", other),
                ))
            }
        }
        Ok(Validated::new(request).with_client(client))
    }
}

// ---------------------------------------------------------------------------
// End session
// ---------------------------------------------------------------------------

pub struct EndSessionRequestValidator {
    tokens: Arc<dyn TokenValidator>,
    clients: Arc<dyn ClientStore>,
    redirect_uris: Arc<dyn RedirectUriValidator>,
}

impl Component for EndSessionRequestValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            tokens: resolver.resolve()?,
            clients: resolver.resolve()?,
            redirect_uris: resolver.resolve()?,
        })
    }
}

crate::provides!(EndSessionRequestValidator => dyn RequestValidator<EndSessionRequest>);

impl RequestValidator<EndSessionRequest> for EndSessionRequestValidator {
    fn validate(
        &self,
        _context: &RequestContext,
        request: EndSessionRequest,
    ) -> Result<Validated<EndSessionRequest>, ProtocolError> {
        let hint = match request.id_token_hint.clone().filter(|h| !h.is_empty()) {
            Some(hint) => hint,
            None if request.post_logout_redirect_uri.is_some() => {
                return Err(ProtocolError::invalid_request(
                    "post_logout_redirect_uri requires id_token_hint",
                ))
            }
            None => return Ok(Validated::new(request)),
        };

        // Logout may legitimately arrive long after the id token expired.
        let token = self.tokens.validate_identity_token(&hint, None, true)?;
        let client = self
            .clients
            .find_client_by_id(&token.client_id)
            .ok_or_else(|| ProtocolError::invalid_request("id_token_hint client is unknown"))?;

        if let Some(uri) = &request.post_logout_redirect_uri {
            if !self.redirect_uris.is_post_logout_redirect_uri_valid(uri, &client) {
                log::warn!(
                    "endsession:validate bad post_logout_redirect_uri client={} uri={}",
                    client.client_id,
                    uri
                );
                return Err(ProtocolError::invalid_request(
                    "post_logout_redirect_uri is not registered",
                ));
            }
        }

        let mut validated = Validated::new(request).with_client(client);
        if let Some(subject) = principal_of(&token) {
            validated = validated.with_subject(subject);
        }
        Ok(validated.with_token(token))
    }
}

// ---------------------------------------------------------------------------
// UserInfo (OIDC Core §5.3)
// ---------------------------------------------------------------------------

pub struct UserInfoRequestValidator {
    tokens: Arc<dyn TokenValidator>,
}

impl Component for UserInfoRequestValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            tokens: resolver.resolve()?,
        })
    }
}

crate::provides!(UserInfoRequestValidator => dyn RequestValidator<UserInfoRequest>);

impl RequestValidator<UserInfoRequest> for UserInfoRequestValidator {
    fn validate(
        &self,
        _context: &RequestContext,
        request: UserInfoRequest,
    ) -> Result<Validated<UserInfoRequest>, ProtocolError> {
        if request.access_token.is_empty() {
            return Err(ProtocolError::invalid_token("no access token"));
        }
        let token = self.tokens.validate_access_token(&request.access_token)?;
        if !token.scopes.iter().any(|s| s == OPENID_SCOPE) {
            return Err(ProtocolError::new(
                errors::INSUFFICIENT_SCOPE,
                "access token lacks the openid scope",
            ));
        }
        let subject =
            principal_of(&token)
                .ok_or_else(|| ProtocolError::invalid_token("token has no subject"))?;
        let scopes = token.scopes.clone();
        Ok(Validated::new(request)
            .with_subject(subject)
            .with_scopes(scopes)
            .with_token(token))
    }
}

// ---------------------------------------------------------------------------
// Device authorization (RFC 8628 §3.1)
// ---------------------------------------------------------------------------

pub struct DeviceAuthorizationRequestValidator {
    secrets: Arc<dyn ClientSecretValidator>,
    resources: Arc<dyn ResourceValidator>,
}

impl Component for DeviceAuthorizationRequestValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            secrets: resolver.resolve()?,
            resources: resolver.resolve()?,
        })
    }
}

crate::provides!(
    DeviceAuthorizationRequestValidator => dyn RequestValidator<DeviceAuthorizationRequest>
);

impl RequestValidator<DeviceAuthorizationRequest> for DeviceAuthorizationRequestValidator {
    fn validate(
        &self,
        context: &RequestContext,
        request: DeviceAuthorizationRequest,
    ) -> Result<Validated<DeviceAuthorizationRequest>, ProtocolError> {
        let client = self.secrets.validate(context)?;
        if !client.allows_grant_type(grant_types::DEVICE_CODE) {
            return Err(ProtocolError::unauthorized_client(
                "client may not use the device flow",
            ));
        }
        let requested = match request.scope.as_deref().map(split_scopes) {
            Some(scopes) if !scopes.is_empty() => scopes,
            _ => client.allowed_scopes.clone(),
        };
        let result = self.resources.validate_requested_resources(&client, &requested);
        if !result.succeeded() || result.scopes.is_empty() {
            return Err(ProtocolError::invalid_scope(format!(
                "invalid scopes: {}",
                result.invalid_scopes.join(" ")
            )));
        }
        Ok(Validated::new(request)
            .with_client(client)
            .with_scopes(result.scopes))
    }
}
