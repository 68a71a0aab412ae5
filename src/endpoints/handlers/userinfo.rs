use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use super::{check_method, protocol_error, HandlerResult};
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::{EndpointHandler, JsonResult, RequestContext};
use crate::protocol::messages::UserInfoRequest;
use crate::protocol::ProtocolError;
use crate::response::UserInfoResponseGenerator;
use crate::validation::{BearerTokenUsageValidator, RequestValidator};

/// `GET|POST /connect/userinfo` with a bearer access token.
pub struct UserInfoEndpoint {
    bearer: Arc<BearerTokenUsageValidator>,
    validator: Arc<dyn RequestValidator<UserInfoRequest>>,
    responses: Arc<dyn UserInfoResponseGenerator>,
}

impl Component for UserInfoEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            bearer: resolver.resolve()?,
            validator: resolver.resolve()?,
            responses: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for UserInfoEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET, Method::POST]) {
            return Ok(rejected);
        }
        let Some(token) = self.bearer.validate(context).token().map(str::to_string) else {
            return Ok(protocol_error(ProtocolError::invalid_token("no access token")));
        };
        let request = UserInfoRequest { access_token: token };
        let validated = match self.validator.validate(context, request) {
            Ok(validated) => validated,
            Err(error) => return Ok(protocol_error(error)),
        };
        Ok(Box::new(JsonResult::ok(self.responses.process(&validated)?)))
    }
}
