use std::sync::Arc;

use super::{EndpointDescriptor, EndpointRegistry, RequestContext};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};

/// Picks the endpoint for an incoming request.
pub trait EndpointRouter: Send + Sync {
    fn find(&self, context: &RequestContext) -> Option<EndpointDescriptor>;
}

/// Exact-path lookup in the frozen registry, honoring the per-endpoint enable
/// flags.
pub struct DefaultEndpointRouter {
    registry: Arc<EndpointRegistry>,
    options: Arc<ServerOptions>,
}

impl DefaultEndpointRouter {
    pub fn new(registry: Arc<EndpointRegistry>, options: Arc<ServerOptions>) -> Self {
        Self { registry, options }
    }
}

impl Component for DefaultEndpointRouter {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?, resolver.resolve()?))
    }
}

crate::provides!(DefaultEndpointRouter => dyn EndpointRouter);

impl EndpointRouter for DefaultEndpointRouter {
    fn find(&self, context: &RequestContext) -> Option<EndpointDescriptor> {
        let descriptor = self.registry.route(&context.path)?;
        if !self.options.endpoints.is_enabled(descriptor.name()) {
            log::warn!(
                "endpoint:route disabled name={} path={}",
                descriptor.name(),
                context.path
            );
            return None;
        }
        log::debug!(
            "endpoint:route name={} path={} handler={}",
            descriptor.name(),
            context.path,
            descriptor.handler()
        );
        Some(descriptor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceCollection;
    use crate::endpoints::handlers::{DiscoveryEndpoint, TokenEndpoint};
    use crate::protocol::constants::{endpoint_names, route_paths};

    fn router(options: ServerOptions) -> DefaultEndpointRouter {
        let mut services = ServiceCollection::new();
        let mut registry = EndpointRegistry::new();
        registry
            .add_endpoint::<TokenEndpoint>(&mut services, endpoint_names::TOKEN, route_paths::TOKEN)
            .unwrap();
        registry
            .add_endpoint::<DiscoveryEndpoint>(
                &mut services,
                endpoint_names::DISCOVERY,
                route_paths::DISCOVERY_CONFIGURATION,
            )
            .unwrap();
        DefaultEndpointRouter::new(Arc::new(registry), Arc::new(options))
    }

    #[test]
    fn routes_enabled_endpoints() {
        let router = router(ServerOptions::default());
        let found = router.find(&RequestContext::post("/connect/token")).unwrap();
        assert_eq!(found.name(), "Token");
        assert!(router.find(&RequestContext::get("/connect/nothing")).is_none());
    }

    #[test]
    fn disabled_endpoint_is_not_found() {
        let mut options = ServerOptions::default();
        options.endpoints.enable_token_endpoint = false;
        let router = router(options);
        assert!(router.find(&RequestContext::post("/connect/token")).is_none());
        assert!(router
            .find(&RequestContext::get("/.well-known/openid-configuration"))
            .is_some());
    }
}
