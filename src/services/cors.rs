use std::sync::Arc;

use crate::config::{CorsOptions, ServerOptions};
use crate::container::{Component, Decorator, ResolutionError, Resolver};
use crate::stores::ClientStore;

/// CORS decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allowed_origin: String,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl CorsPolicy {
    fn for_origin(origin: &str) -> Self {
        Self {
            allowed_origin: origin.to_string(),
            allowed_methods: vec!["GET".into(), "POST".into()],
            allowed_headers: vec!["authorization".into(), "content-type".into()],
        }
    }
}

/// Platform-level CORS: which origins may call which paths.
pub trait CorsPolicyProvider: Send + Sync {
    fn policy(&self, path: &str, origin: &str) -> Option<CorsPolicy>;
}

/// Origin checks backed by the server's client registrations.
pub trait CorsPolicyService: Send + Sync {
    fn is_origin_allowed(&self, origin: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Platform default
// ---------------------------------------------------------------------------

/// Static origin list from the options, regardless of path.
pub struct DefaultCorsPolicyProvider {
    allowed_origins: Vec<String>,
}

impl Component for DefaultCorsPolicyProvider {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            allowed_origins: options.cors.allowed_origins.clone(),
        })
    }
}

crate::provides!(DefaultCorsPolicyProvider => dyn CorsPolicyProvider);

impl CorsPolicyProvider for DefaultCorsPolicyProvider {
    fn policy(&self, _path: &str, origin: &str) -> Option<CorsPolicy> {
        self.allowed_origins
            .iter()
            .any(|o| o.eq_ignore_ascii_case(origin))
            .then(|| CorsPolicy::for_origin(origin))
    }
}

// ---------------------------------------------------------------------------
// Server decorator
// ---------------------------------------------------------------------------

/// Answers for the server's own protocol paths through [`CorsPolicyService`];
/// every other path goes to the wrapped provider.
pub struct IdentityServerCorsPolicyProvider {
    inner: Arc<dyn CorsPolicyProvider>,
    service: Arc<dyn CorsPolicyService>,
    cors_paths: Vec<String>,
}

impl Decorator<dyn CorsPolicyProvider> for IdentityServerCorsPolicyProvider {
    fn decorate(
        inner: Arc<dyn CorsPolicyProvider>,
        resolver: &Resolver<'_>,
    ) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            inner,
            service: resolver.resolve()?,
            cors_paths: options.cors.cors_paths.clone(),
        })
    }
}

crate::provides!(IdentityServerCorsPolicyProvider => dyn CorsPolicyProvider);

impl CorsPolicyProvider for IdentityServerCorsPolicyProvider {
    fn policy(&self, path: &str, origin: &str) -> Option<CorsPolicy> {
        let is_protocol_path = self.cors_paths.iter().any(|p| p.eq_ignore_ascii_case(path));
        if !is_protocol_path {
            return self.inner.policy(path, origin);
        }
        if self.service.is_origin_allowed(origin) {
            log::debug!("cors:allow path={} origin={}", path, origin);
            Some(CorsPolicy::for_origin(origin))
        } else {
            log::debug!("cors:deny path={} origin={}", path, origin);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Policy service
// ---------------------------------------------------------------------------

/// Allows the configured origins, plus any origin a known client declared.
pub struct DefaultCorsPolicyService {
    options: CorsOptions,
    clients: Arc<dyn ClientStore>,
    client_ids: Vec<String>,
}

impl Component for DefaultCorsPolicyService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            options: options.cors.clone(),
            clients: resolver.resolve()?,
            client_ids: options.clients.iter().map(|c| c.client_id.clone()).collect(),
        })
    }
}

crate::provides!(DefaultCorsPolicyService => dyn CorsPolicyService);

impl CorsPolicyService for DefaultCorsPolicyService {
    fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.options.allow_all {
            return true;
        }
        if self
            .options
            .allowed_origins
            .iter()
            .any(|o| o.eq_ignore_ascii_case(origin))
        {
            return true;
        }
        self.client_ids
            .iter()
            .filter_map(|id| self.clients.find_client_by_id(id))
            .any(|c| {
                c.allowed_cors_origins
                    .iter()
                    .any(|o| o.trim_end_matches('/').eq_ignore_ascii_case(origin))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceCollection;
    use crate::protocol::Client;
    use crate::stores::InMemoryClientStore;

    fn provider(options: ServerOptions) -> Arc<dyn CorsPolicyProvider> {
        let mut services = ServiceCollection::new();
        services.add_instance(Arc::new(options));
        services.add_singleton::<dyn ClientStore, InMemoryClientStore>();
        services.add_transient::<dyn CorsPolicyService, DefaultCorsPolicyService>();
        services.add_transient::<dyn CorsPolicyProvider, DefaultCorsPolicyProvider>();
        services
            .decorate::<dyn CorsPolicyProvider, IdentityServerCorsPolicyProvider>()
            .unwrap();
        services.build().unwrap().resolve().unwrap()
    }

    #[test]
    fn protocol_paths_use_client_origins() {
        let mut spa = Client::new("spa");
        spa.allowed_cors_origins = vec!["https://app.example.com/".into()];
        let options = ServerOptions {
            clients: vec![spa],
            ..Default::default()
        };
        let cors = provider(options);

        assert!(cors.policy("/connect/token", "https://app.example.com").is_some());
        assert!(cors.policy("/CONNECT/TOKEN", "https://app.example.com").is_some());
        assert!(cors.policy("/connect/token", "https://evil.example.com").is_none());
        // Not a protocol path: falls through to the platform list, which is empty.
        assert!(cors.policy("/api/orders", "https://app.example.com").is_none());
    }

    #[test]
    fn platform_origins_apply_outside_protocol_paths() {
        let mut options = ServerOptions::default();
        options.cors.allowed_origins = vec!["https://admin.example.com".into()];
        let cors = provider(options);
        let policy = cors.policy("/api/orders", "https://admin.example.com").unwrap();
        assert_eq!(policy.allowed_origin, "https://admin.example.com");
    }
}
