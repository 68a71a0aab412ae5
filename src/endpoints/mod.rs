//! Protocol endpoints: the route table, the router consulted per request, and
//! the default handlers.

mod context;
pub mod handlers;
mod registry;
mod results;
mod router;

use async_trait::async_trait;

pub use context::{parse_urlencoded, RequestContext};
pub use registry::{EndpointDescriptor, EndpointRegistry};
pub use results::{
    EndpointResult, HtmlResult, JsonResult, ProtocolErrorResult, RedirectResult, StatusCodeResult,
};
pub use router::{DefaultEndpointRouter, EndpointRouter};

use crate::error::TollgateResult;

/// Processes one request for one protocol surface. Resolved per request.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn process(&self, context: &RequestContext) -> TollgateResult<Box<dyn EndpointResult>>;
}
