use std::sync::Arc;

use async_trait::async_trait;

use super::{check_form_post, protocol_error, HandlerResult};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::{EndpointHandler, JsonResult, RequestContext};
use crate::protocol::messages::TokenRequest;
use crate::protocol::ProtocolError;
use crate::response::TokenResponseGenerator;
use crate::services::{Event, EventService};
use crate::validation::RequestValidator;

/// `POST /connect/token`.
pub struct TokenEndpoint {
    options: Arc<ServerOptions>,
    validator: Arc<dyn RequestValidator<TokenRequest>>,
    responses: Arc<dyn TokenResponseGenerator>,
    events: Arc<dyn EventService>,
}

impl Component for TokenEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            options: resolver.resolve()?,
            validator: resolver.resolve()?,
            responses: resolver.resolve()?,
            events: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for TokenEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_form_post(context) {
            return Ok(rejected);
        }
        let request: TokenRequest = match context.parse_params() {
            Ok(request) => request,
            Err(e) => return Ok(protocol_error(ProtocolError::invalid_request(e.to_string()))),
        };
        let grant_type = request.grant_type.clone();

        let validated = match self.validator.validate(context, request) {
            Ok(validated) => validated,
            Err(error) => {
                log::info!("token:reject grant_type={} error={}", grant_type, error.error);
                let client_id = context.form.get("client_id").map(String::as_str);
                self.events
                    .raise(Event::token_issued_failure(client_id, &error.error));
                return Ok(protocol_error(error));
            }
        };

        let issuer = context.issuer(&self.options);
        let response = self.responses.process(&issuer, &validated)?;
        Ok(Box::new(JsonResult::ok(serde_json::to_value(response)?)))
    }
}
