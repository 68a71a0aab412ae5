use std::sync::Arc;

use super::{
    ClientConfigurationValidator, CustomRequestValidator, RedirectUriValidator, RequestValidator,
};
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::RequestContext;
use crate::protocol::constants::{code_challenge_methods, errors, grant_types, response_types};
use crate::protocol::messages::{split_scopes, AuthorizeRequest};
use crate::protocol::{ProtocolError, Validated};
use crate::services::resources::ResourceValidator;
use crate::stores::ClientStore;

/// Front-channel authorization request checks (code flow only).
pub struct AuthorizeRequestValidator {
    clients: Arc<dyn ClientStore>,
    configuration: Arc<dyn ClientConfigurationValidator>,
    redirect_uris: Arc<dyn RedirectUriValidator>,
    resources: Arc<dyn ResourceValidator>,
    custom: Arc<dyn CustomRequestValidator<AuthorizeRequest>>,
}

impl Component for AuthorizeRequestValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            clients: resolver.resolve()?,
            configuration: resolver.resolve()?,
            redirect_uris: resolver.resolve()?,
            resources: resolver.resolve()?,
            custom: resolver.resolve()?,
        })
    }
}

crate::provides!(AuthorizeRequestValidator => dyn RequestValidator<AuthorizeRequest>);

impl RequestValidator<AuthorizeRequest> for AuthorizeRequestValidator {
    fn validate(
        &self,
        _context: &RequestContext,
        request: AuthorizeRequest,
    ) -> Result<Validated<AuthorizeRequest>, ProtocolError> {
        if request.client_id.is_empty() {
            return Err(ProtocolError::invalid_request("client_id is missing"));
        }
        let client = self
            .clients
            .find_client_by_id(&request.client_id)
            .filter(|c| c.enabled)
            .ok_or_else(|| ProtocolError::unauthorized_client("unknown client"))?;
        self.configuration.validate(&client)?;

        if !self.redirect_uris.is_redirect_uri_valid(&request.redirect_uri, &client) {
            log::warn!(
                "authorize:validate bad redirect_uri client={} uri={}",
                client.client_id,
                request.redirect_uri
            );
            return Err(ProtocolError::invalid_request("redirect_uri is not registered"));
        }

        if request.response_type != response_types::CODE {
            return Err(ProtocolError::new(
                errors::UNSUPPORTED_RESPONSE_TYPE,
                "only the code response type is supported",
            ));
        }
        if !client.allows_grant_type(grant_types::AUTHORIZATION_CODE) {
            return Err(ProtocolError::unauthorized_client(
                "client may not use the authorization code flow",
            ));
        }

        match request.code_challenge.as_deref() {
            Some(challenge) if !challenge.is_empty() => {
                let method = request
                    .code_challenge_method
                    .as_deref()
                    .unwrap_or(code_challenge_methods::SHA256);
                if method != code_challenge_methods::SHA256 {
                    return Err(ProtocolError::invalid_request(
                        "code_challenge_method must be S256",
                    ));
                }
            }
            _ if client.require_pkce => {
                return Err(ProtocolError::invalid_request("code_challenge is required"));
            }
            _ => {}
        }

        let requested = split_scopes(&request.scope);
        if requested.is_empty() {
            return Err(ProtocolError::invalid_scope("scope is missing"));
        }
        let resources = self.resources.validate_requested_resources(&client, &requested);
        if !resources.succeeded() {
            return Err(ProtocolError::invalid_scope(format!(
                "invalid scopes: {}",
                resources.invalid_scopes.join(" ")
            )));
        }

        let mut validated = Validated::new(request)
            .with_client(client)
            .with_scopes(resources.scopes);
        self.custom.validate(&mut validated)?;
        Ok(validated)
    }
}
