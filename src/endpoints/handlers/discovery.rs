use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use super::{check_method, HandlerResult};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::{EndpointHandler, JsonResult, RequestContext};
use crate::response::DiscoveryResponseGenerator;

/// `GET /.well-known/openid-configuration`.
pub struct DiscoveryEndpoint {
    options: Arc<ServerOptions>,
    responses: Arc<dyn DiscoveryResponseGenerator>,
}

impl Component for DiscoveryEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            options: resolver.resolve()?,
            responses: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for DiscoveryEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET]) {
            return Ok(rejected);
        }
        let issuer = context.issuer(&self.options);
        Ok(Box::new(JsonResult::cacheable(
            self.responses.create_discovery_document(&issuer),
        )))
    }
}

/// `GET /.well-known/openid-configuration/jwks`.
pub struct DiscoveryKeyEndpoint {
    responses: Arc<dyn DiscoveryResponseGenerator>,
}

impl Component for DiscoveryKeyEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            responses: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for DiscoveryKeyEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET]) {
            return Ok(rejected);
        }
        Ok(Box::new(JsonResult::cacheable(self.responses.create_jwk_document())))
    }
}
