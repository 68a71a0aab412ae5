//! The form-post back-channel endpoints: introspection, revocation and device
//! authorization.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::{check_form_post, protocol_error, HandlerResult};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::{EndpointHandler, JsonResult, RequestContext, StatusCodeResult};
use crate::protocol::messages::{
    DeviceAuthorizationRequest, IntrospectionRequest, RevocationRequest,
};
use crate::protocol::ProtocolError;
use crate::response::{
    DeviceAuthorizationResponseGenerator, IntrospectionResponseGenerator,
    TokenRevocationResponseGenerator,
};
use crate::validation::RequestValidator;

fn parse<T: serde::de::DeserializeOwned>(context: &RequestContext) -> Result<T, ProtocolError> {
    context
        .parse_params()
        .map_err(|e| ProtocolError::invalid_request(e.to_string()))
}

/// `POST /connect/introspect`, called by APIs.
pub struct IntrospectionEndpoint {
    validator: Arc<dyn RequestValidator<IntrospectionRequest>>,
    responses: Arc<dyn IntrospectionResponseGenerator>,
}

impl Component for IntrospectionEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            validator: resolver.resolve()?,
            responses: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for IntrospectionEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_form_post(context) {
            return Ok(rejected);
        }
        let validated = match parse(context).and_then(|r| self.validator.validate(context, r)) {
            Ok(validated) => validated,
            Err(error) => return Ok(protocol_error(error)),
        };
        Ok(Box::new(JsonResult::ok(self.responses.process(&validated))))
    }
}

/// `POST /connect/revocation`.
pub struct TokenRevocationEndpoint {
    validator: Arc<dyn RequestValidator<RevocationRequest>>,
    responses: Arc<dyn TokenRevocationResponseGenerator>,
}

impl Component for TokenRevocationEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            validator: resolver.resolve()?,
            responses: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for TokenRevocationEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_form_post(context) {
            return Ok(rejected);
        }
        let validated = match parse(context).and_then(|r| self.validator.validate(context, r)) {
            Ok(validated) => validated,
            Err(error) => return Ok(protocol_error(error)),
        };
        // RFC 7009 §2.2: unknown tokens are not an error.
        self.responses.process(&validated)?;
        Ok(Box::new(StatusCodeResult(StatusCode::OK)))
    }
}

/// `POST /connect/deviceauthorization` (RFC 8628 §3.1).
pub struct DeviceAuthorizationEndpoint {
    options: Arc<ServerOptions>,
    validator: Arc<dyn RequestValidator<DeviceAuthorizationRequest>>,
    responses: Arc<dyn DeviceAuthorizationResponseGenerator>,
}

impl Component for DeviceAuthorizationEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            options: resolver.resolve()?,
            validator: resolver.resolve()?,
            responses: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for DeviceAuthorizationEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_form_post(context) {
            return Ok(rejected);
        }
        let validated = match parse(context).and_then(|r| self.validator.validate(context, r)) {
            Ok(validated) => validated,
            Err(error) => return Ok(protocol_error(error)),
        };
        let issuer = context.issuer(&self.options);
        let response = self.responses.process(&issuer, &validated)?;
        Ok(Box::new(JsonResult::ok(serde_json::to_value(response)?)))
    }
}
