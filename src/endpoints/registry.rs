use std::sync::Arc;

use super::EndpointHandler;
use crate::container::{
    Component, ConfigurationError, Registration, ResolutionError, Scope, ServiceCollection,
    ServiceKey, Upcast,
};
use crate::protocol::constants::ensure_leading_slash;

type HandlerFactory =
    Arc<dyn Fn(&Scope) -> Result<Arc<dyn EndpointHandler>, ResolutionError> + Send + Sync>;

/// One protocol surface: a logical name, the path it answers on, and the
/// handler capability that processes it.
#[derive(Clone)]
pub struct EndpointDescriptor {
    name: String,
    path: String,
    handler: ServiceKey,
    create: HandlerFactory,
}

impl EndpointDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> ServiceKey {
        self.handler
    }

    /// Resolve a fresh handler from the request's scope.
    pub fn create_handler(
        &self,
        scope: &Scope,
    ) -> Result<Arc<dyn EndpointHandler>, ResolutionError> {
        (self.create)(scope)
    }
}

impl std::fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("handler", &self.handler.name())
            .finish()
    }
}

impl PartialEq for EndpointDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.path == other.path && self.handler == other.handler
    }
}

/// Ordered (name, path, handler) table. Filled during assembly, read-only after.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint and bind its handler type as a transient capability.
    ///
    /// Paths gain a leading `/` if missing and must be unique, ignoring ASCII
    /// case. A handler type already registered (by the host, or for another
    /// path) keeps its existing registration.
    pub fn add_endpoint<H>(
        &mut self,
        services: &mut ServiceCollection,
        name: &str,
        path: &str,
    ) -> Result<&EndpointDescriptor, ConfigurationError>
    where
        H: EndpointHandler + Component + Upcast<H>,
    {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed == "/" || trimmed.contains(char::is_whitespace) {
            return Err(ConfigurationError::InvalidEndpointPath {
                path: path.to_string(),
            });
        }
        let path = ensure_leading_slash(trimmed);
        if self.find(&path).is_some() {
            return Err(ConfigurationError::DuplicateEndpointPath { path });
        }

        services.try_add(Registration::transient::<H, H>());
        let create: HandlerFactory = Arc::new(|scope: &Scope| {
            let handler: Arc<dyn EndpointHandler> = scope.resolve::<H>()?;
            Ok(handler)
        });
        log::debug!(
            "compose:endpoint name={} path={} handler={}",
            name,
            path,
            std::any::type_name::<H>()
        );
        self.endpoints.push(EndpointDescriptor {
            name: name.to_string(),
            path,
            handler: ServiceKey::of::<H>(),
            create,
        });
        Ok(&self.endpoints[self.endpoints.len() - 1])
    }

    /// The endpoint answering on exactly `path`, if any.
    pub fn route(&self, path: &str) -> Option<&EndpointDescriptor> {
        self.find(&ensure_leading_slash(path))
    }

    fn find(&self, path: &str) -> Option<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|e| e.path.eq_ignore_ascii_case(path))
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Resolver;
    use crate::endpoints::{EndpointResult, RequestContext, StatusCodeResult};
    use crate::error::TollgateResult;
    use axum::http::StatusCode;

    struct TokenHandler;
    struct DiscoveryHandler;

    #[async_trait::async_trait]
    impl EndpointHandler for TokenHandler {
        async fn process(&self, _: &RequestContext) -> TollgateResult<Box<dyn EndpointResult>> {
            Ok(Box::new(StatusCodeResult(StatusCode::OK)))
        }
    }

    #[async_trait::async_trait]
    impl EndpointHandler for DiscoveryHandler {
        async fn process(&self, _: &RequestContext) -> TollgateResult<Box<dyn EndpointResult>> {
            Ok(Box::new(StatusCodeResult(StatusCode::NO_CONTENT)))
        }
    }

    impl Component for TokenHandler {
        fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self)
        }
    }

    impl Component for DiscoveryHandler {
        fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self)
        }
    }

    fn registry(services: &mut ServiceCollection) -> EndpointRegistry {
        let mut registry = EndpointRegistry::new();
        registry
            .add_endpoint::<TokenHandler>(services, "token", "/connect/token")
            .unwrap();
        registry
            .add_endpoint::<DiscoveryHandler>(
                services,
                "discovery",
                ".well-known/openid-configuration",
            )
            .unwrap();
        registry
    }

    #[test]
    fn known_paths_route_to_their_descriptor() {
        let mut services = ServiceCollection::new();
        let registry = registry(&mut services);

        assert_eq!(registry.route("/connect/token").unwrap().name(), "token");
        assert_eq!(registry.route("/CONNECT/Token").unwrap().name(), "token");
        assert_eq!(
            registry.route("/.well-known/openid-configuration").unwrap().path(),
            "/.well-known/openid-configuration"
        );
        assert!(registry.route("/unknown").is_none());
        assert!(registry.route("/connect/token/extra").is_none());
    }

    #[test]
    fn handler_types_are_registered_transient() {
        let mut services = ServiceCollection::new();
        let registry = registry(&mut services);
        let provider = services.build().unwrap();
        assert_eq!(
            provider.lifetime_of::<TokenHandler>(),
            Some(crate::container::Lifetime::Transient)
        );

        let scope = provider.create_scope();
        let descriptor = registry.route("/connect/token").unwrap();
        let a = descriptor.create_handler(&scope).unwrap();
        let b = descriptor.create_handler(&scope).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn duplicate_and_invalid_paths_are_rejected() {
        let mut services = ServiceCollection::new();
        let mut registry = registry(&mut services);

        let err = registry
            .add_endpoint::<DiscoveryHandler>(&mut services, "other", "connect/TOKEN")
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateEndpointPath {
                path: "/connect/TOKEN".into()
            }
        );
        assert!(matches!(
            registry.add_endpoint::<DiscoveryHandler>(&mut services, "blank", "  "),
            Err(ConfigurationError::InvalidEndpointPath { .. })
        ));
        assert_eq!(registry.len(), 2);
        assert_eq!(services.count::<DiscoveryHandler>(), 1);
    }
}
