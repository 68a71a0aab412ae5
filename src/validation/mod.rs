//! Request validators for the protocol endpoints.
//!
//! Every endpoint request type `R` has a `dyn RequestValidator<R>` capability.
//! Hosts can add checks without replacing the validator by registering a
//! `dyn CustomRequestValidator<R>`.

mod authorize;
mod bearer;
mod device;
mod requests;
pub mod secrets;
mod token;
mod tokens;

use std::marker::PhantomData;
use std::sync::Arc;

pub use authorize::AuthorizeRequestValidator;
pub use bearer::{BearerTokenUsage, BearerTokenUsageValidator};
pub use device::{DeviceCodeValidator, DefaultDeviceCodeValidator};
pub use requests::{
    DeviceAuthorizationRequestValidator, EndSessionRequestValidator,
    IntrospectionRequestValidator, TokenRevocationRequestValidator, UserInfoRequestValidator,
};
pub use token::{
    verify_pkce, ExtensionGrantTypeValidator, ExtensionGrantValidator,
    NotSupportedResourceOwnerPasswordValidator, ResourceOwnerPasswordValidator,
    TokenRequestValidator,
};
pub use tokens::{
    CustomTokenValidator, DefaultCustomTokenValidator, DefaultTokenValidator, TokenValidator,
};

use crate::container::{Component, ResolutionError, Resolver, Upcast};
use crate::endpoints::RequestContext;
use crate::protocol::constants::grant_types;
use crate::protocol::models::Client;
use crate::protocol::{ProtocolError, Validated};

pub trait RequestValidator<R>: Send + Sync {
    fn validate(&self, context: &RequestContext, request: R) -> Result<Validated<R>, ProtocolError>;
}

/// Extra, host-specific checks run after the built-in validation succeeded.
pub trait CustomRequestValidator<R>: Send + Sync {
    fn validate(&self, validated: &mut Validated<R>) -> Result<(), ProtocolError>;
}

/// Accepts everything.
pub struct DefaultCustomRequestValidator<R> {
    _request: PhantomData<fn() -> R>,
}

impl<R> Default for DefaultCustomRequestValidator<R> {
    fn default() -> Self {
        Self {
            _request: PhantomData,
        }
    }
}

impl<R: 'static> Component for DefaultCustomRequestValidator<R> {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::default())
    }
}

impl<R: 'static> Upcast<dyn CustomRequestValidator<R>> for DefaultCustomRequestValidator<R> {
    fn upcast(self: Arc<Self>) -> Arc<dyn CustomRequestValidator<R>> {
        self
    }
}

impl<R> CustomRequestValidator<R> for DefaultCustomRequestValidator<R> {
    fn validate(&self, _validated: &mut Validated<R>) -> Result<(), ProtocolError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Redirect URIs
// ---------------------------------------------------------------------------

pub trait RedirectUriValidator: Send + Sync {
    fn is_redirect_uri_valid(&self, requested: &str, client: &Client) -> bool;
    fn is_post_logout_redirect_uri_valid(&self, requested: &str, client: &Client) -> bool;
}

/// Exact match against the registered URIs, ignoring ASCII case.
pub struct StrictRedirectUriValidator;

impl StrictRedirectUriValidator {
    fn contains(uris: &[String], requested: &str) -> bool {
        !requested.is_empty() && uris.iter().any(|u| u.eq_ignore_ascii_case(requested))
    }
}

impl RedirectUriValidator for StrictRedirectUriValidator {
    fn is_redirect_uri_valid(&self, requested: &str, client: &Client) -> bool {
        Self::contains(&client.redirect_uris, requested)
    }

    fn is_post_logout_redirect_uri_valid(&self, requested: &str, client: &Client) -> bool {
        Self::contains(&client.post_logout_redirect_uris, requested)
    }
}

impl Component for StrictRedirectUriValidator {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(StrictRedirectUriValidator => dyn RedirectUriValidator);

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Sanity checks on a client's configuration before it is used in a flow.
pub trait ClientConfigurationValidator: Send + Sync {
    fn validate(&self, client: &Client) -> Result<(), ProtocolError>;
}

pub struct DefaultClientConfigurationValidator;

impl ClientConfigurationValidator for DefaultClientConfigurationValidator {
    fn validate(&self, client: &Client) -> Result<(), ProtocolError> {
        let misconfigured = |reason: &str| {
            log::error!("client:config client={} {}", client.client_id, reason);
            ProtocolError::unauthorized_client(format!("invalid client configuration: {}", reason))
        };
        if client.allowed_grant_types.is_empty() {
            return Err(misconfigured("no allowed grant types"));
        }
        if client.access_token_lifetime == 0 {
            return Err(misconfigured("access token lifetime is zero"));
        }
        if client.allows_grant_type(grant_types::AUTHORIZATION_CODE)
            && client.redirect_uris.is_empty()
        {
            return Err(misconfigured("authorization code flow without redirect URIs"));
        }
        if client.allows_grant_type(grant_types::CLIENT_CREDENTIALS)
            && !client.require_client_secret
        {
            return Err(misconfigured("client credentials flow without a client secret"));
        }
        Ok(())
    }
}

impl Component for DefaultClientConfigurationValidator {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(DefaultClientConfigurationValidator => dyn ClientConfigurationValidator);
