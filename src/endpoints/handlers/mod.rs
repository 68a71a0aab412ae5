//! Default handlers for the protocol route table.

mod authorize;
mod discovery;
mod end_session;
mod introspection;
mod token;
mod userinfo;

use std::sync::Arc;

use axum::http::{Method, StatusCode};

pub use authorize::{AuthorizeCallbackEndpoint, AuthorizeEndpoint};
pub use discovery::{DiscoveryEndpoint, DiscoveryKeyEndpoint};
pub use end_session::{CheckSessionEndpoint, EndSessionCallbackEndpoint, EndSessionEndpoint};
pub use introspection::{
    DeviceAuthorizationEndpoint, IntrospectionEndpoint, TokenRevocationEndpoint,
};
pub use token::TokenEndpoint;
pub use userinfo::UserInfoEndpoint;

use super::{EndpointResult, ProtocolErrorResult, RedirectResult, RequestContext, StatusCodeResult};
use crate::config::ServerOptions;
use crate::error::TollgateResult;
use crate::protocol::models::{ErrorMessage, Message};
use crate::protocol::ProtocolError;
use crate::services::messages::MessageStore;
use crate::services::Clock;

type HandlerResult = TollgateResult<Box<dyn EndpointResult>>;

/// `405` unless the request uses one of `allowed`.
fn check_method(context: &RequestContext, allowed: &[Method]) -> Option<Box<dyn EndpointResult>> {
    if allowed.contains(&context.method) {
        return None;
    }
    log::debug!("endpoint:method rejected method={} path={}", context.method, context.path);
    Some(Box::new(StatusCodeResult(StatusCode::METHOD_NOT_ALLOWED)))
}

/// POST with a form body, as every back-channel endpoint requires.
fn check_form_post(context: &RequestContext) -> Option<Box<dyn EndpointResult>> {
    if let Some(rejected) = check_method(context, &[Method::POST]) {
        return Some(rejected);
    }
    if !context.is_form_post() {
        return Some(Box::new(StatusCodeResult(StatusCode::UNSUPPORTED_MEDIA_TYPE)));
    }
    None
}

fn protocol_error(error: ProtocolError) -> Box<dyn EndpointResult> {
    Box::new(ProtocolErrorResult::new(error))
}

/// Stashes the error for the host's error page and sends the browser there.
struct ErrorPage {
    options: Arc<ServerOptions>,
    errors: Arc<dyn MessageStore<ErrorMessage>>,
    clock: Arc<dyn Clock>,
}

impl ErrorPage {
    fn redirect(&self, error: &ProtocolError) -> HandlerResult {
        let message = ErrorMessage {
            error: error.error.clone(),
            error_description: Some(error.error_description.clone()),
            request_id: None,
        };
        let id = self.errors.write(Message::new(message, self.clock.now()))?;
        let pages = &self.options.user_interaction;
        log::info!("endpoint:error_page error={}", error.error);
        Ok(Box::new(RedirectResult::with_query(
            &pages.error_url,
            &[(pages.error_id_parameter.as_str(), id.as_str())],
        )))
    }
}
