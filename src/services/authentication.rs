//! Sign-in/sign-out plumbing.
//!
//! The platform defaults ([`CookieAuthenticationService`],
//! [`ConfiguredHandlerProvider`]) know nothing about the protocol. The server
//! layers its own behavior on top with two decorators:
//! [`IdentityServerAuthenticationService`] stamps session and protocol claims
//! on sign-in, and [`FederatedSignoutHandlerProvider`] flags the schemes whose
//! sign-out must be propagated upstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};

use super::{Clock, UserSession};
use crate::config::ServerOptions;
use crate::container::{Component, Decorator, ResolutionError, Resolver};
use crate::endpoints::RequestContext;
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::{claim_types, LOCAL_IDENTITY_PROVIDER};
use crate::protocol::models::{lifetime_duration, Principal};

// ---------------------------------------------------------------------------
// Authentication service
// ---------------------------------------------------------------------------

pub trait AuthenticationService: Send + Sync {
    /// The principal behind the request's cookie for `scheme`, if any.
    fn authenticate(&self, context: &RequestContext, scheme: &str) -> Option<Principal>;
    /// Start a session. Returns the cookie value to hand back to the browser.
    fn sign_in(&self, scheme: &str, principal: Principal) -> TollgateResult<String>;
    fn sign_out(&self, context: &RequestContext, scheme: &str);
}

struct Ticket {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

/// Cookie-handle sessions kept in memory. The cookie carries an opaque handle,
/// never the principal itself.
pub struct CookieAuthenticationService {
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    tickets: Mutex<HashMap<(String, String), Ticket>>,
}

impl CookieAuthenticationService {
    pub fn new(clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            clock,
            lifetime,
            tickets: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Ticket>> {
        self.tickets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Component for CookieAuthenticationService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        let lifetime = lifetime_duration(options.authentication.cookie_lifetime_secs)
            .ok_or_else(|| {
                ResolutionError::construction(
                    "CookieAuthenticationService",
                    "authentication.cookie_lifetime_secs is out of range",
                )
            })?;
        Ok(Self::new(resolver.resolve()?, lifetime))
    }
}

crate::provides!(CookieAuthenticationService => dyn AuthenticationService);

impl AuthenticationService for CookieAuthenticationService {
    fn authenticate(&self, context: &RequestContext, scheme: &str) -> Option<Principal> {
        let handle = context.cookie(scheme)?;
        let now = self.clock.now();
        let tickets = self.lock();
        tickets
            .get(&(scheme.to_string(), handle))
            .filter(|t| t.expires_at > now)
            .map(|t| t.principal.clone())
    }

    fn sign_in(&self, scheme: &str, principal: Principal) -> TollgateResult<String> {
        let bytes: [u8; 32] = rand::random();
        let handle = URL_SAFE_NO_PAD.encode(bytes);
        let now = self.clock.now();
        let expires_at = now.checked_add_signed(self.lifetime).ok_or_else(|| {
            TollgateError::Other("cookie lifetime runs past the representable range".into())
        })?;
        let mut tickets = self.lock();
        // Lazy cleanup
        tickets.retain(|_, t| t.expires_at > now);
        log::debug!("auth:sign_in scheme={} sub={}", scheme, principal.subject);
        tickets.insert(
            (scheme.to_string(), handle.clone()),
            Ticket {
                principal,
                expires_at,
            },
        );
        Ok(handle)
    }

    fn sign_out(&self, context: &RequestContext, scheme: &str) {
        if let Some(handle) = context.cookie(scheme) {
            self.lock().remove(&(scheme.to_string(), handle));
            log::debug!("auth:sign_out scheme={}", scheme);
        }
    }
}

// ---------------------------------------------------------------------------
// Handler provider
// ---------------------------------------------------------------------------

/// What the server knows about one authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeHandler {
    pub scheme: String,
    pub supports_sign_out: bool,
    /// Sign-out must also be sent to the upstream identity provider.
    pub federated_sign_out: bool,
}

pub trait AuthenticationHandlerProvider: Send + Sync {
    fn handler(&self, scheme: &str) -> Option<SchemeHandler>;
    fn schemes(&self) -> Vec<String>;
}

/// Knows the two cookie schemes from the options.
pub struct ConfiguredHandlerProvider {
    schemes: Vec<String>,
}

impl Component for ConfiguredHandlerProvider {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            schemes: vec![
                options.authentication.cookie_scheme.clone(),
                options.authentication.external_cookie_scheme.clone(),
            ],
        })
    }
}

crate::provides!(ConfiguredHandlerProvider => dyn AuthenticationHandlerProvider);

impl AuthenticationHandlerProvider for ConfiguredHandlerProvider {
    fn handler(&self, scheme: &str) -> Option<SchemeHandler> {
        self.schemes.iter().find(|s| *s == scheme).map(|s| SchemeHandler {
            scheme: s.clone(),
            supports_sign_out: true,
            federated_sign_out: false,
        })
    }

    fn schemes(&self) -> Vec<String> {
        self.schemes.clone()
    }
}

// ---------------------------------------------------------------------------
// Decorators
// ---------------------------------------------------------------------------

/// Marks the configured federated sign-out schemes on top of whatever the
/// wrapped provider knows.
pub struct FederatedSignoutHandlerProvider {
    inner: Arc<dyn AuthenticationHandlerProvider>,
    federated: Vec<String>,
}

impl Decorator<dyn AuthenticationHandlerProvider> for FederatedSignoutHandlerProvider {
    fn decorate(
        inner: Arc<dyn AuthenticationHandlerProvider>,
        resolver: &Resolver<'_>,
    ) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            inner,
            federated: options.authentication.federated_signout_schemes.clone(),
        })
    }
}

crate::provides!(FederatedSignoutHandlerProvider => dyn AuthenticationHandlerProvider);

impl AuthenticationHandlerProvider for FederatedSignoutHandlerProvider {
    fn handler(&self, scheme: &str) -> Option<SchemeHandler> {
        let federated = self.federated.iter().any(|s| s == scheme);
        match self.inner.handler(scheme) {
            Some(handler) => Some(SchemeHandler {
                federated_sign_out: handler.federated_sign_out || federated,
                ..handler
            }),
            None if federated => Some(SchemeHandler {
                scheme: scheme.to_string(),
                supports_sign_out: true,
                federated_sign_out: true,
            }),
            None => None,
        }
    }

    fn schemes(&self) -> Vec<String> {
        let mut schemes = self.inner.schemes();
        for scheme in &self.federated {
            if !schemes.contains(scheme) {
                schemes.push(scheme.clone());
            }
        }
        schemes
    }
}

/// Adds the server's session semantics to the platform authentication service
/// for the main cookie scheme: `sid`, `idp` and `auth_time` claims on sign-in,
/// session tracking in [`UserSession`], and session removal on sign-out.
pub struct IdentityServerAuthenticationService {
    inner: Arc<dyn AuthenticationService>,
    session: Arc<dyn UserSession>,
    handlers: Arc<dyn AuthenticationHandlerProvider>,
    clock: Arc<dyn Clock>,
    cookie_scheme: String,
}

impl Decorator<dyn AuthenticationService> for IdentityServerAuthenticationService {
    fn decorate(
        inner: Arc<dyn AuthenticationService>,
        resolver: &Resolver<'_>,
    ) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            inner,
            session: resolver.resolve()?,
            handlers: resolver.resolve()?,
            clock: resolver.resolve()?,
            cookie_scheme: options.authentication.cookie_scheme.clone(),
        })
    }
}

crate::provides!(IdentityServerAuthenticationService => dyn AuthenticationService);

impl AuthenticationService for IdentityServerAuthenticationService {
    fn authenticate(&self, context: &RequestContext, scheme: &str) -> Option<Principal> {
        let principal = self.inner.authenticate(context, scheme)?;
        if scheme == self.cookie_scheme {
            self.session.set_user(principal.clone());
        }
        Some(principal)
    }

    fn sign_in(&self, scheme: &str, principal: Principal) -> TollgateResult<String> {
        if scheme != self.cookie_scheme {
            return self.inner.sign_in(scheme, principal);
        }
        if principal.subject.trim().is_empty() {
            return Err(TollgateError::Other(
                "sign-in principal has no subject".into(),
            ));
        }

        let sid = self.session.create_session_id(&principal);
        let mut principal = principal.with_claim(claim_types::SESSION_ID, sid.clone());
        if principal.claim(claim_types::IDENTITY_PROVIDER).is_none() {
            principal =
                principal.with_claim(claim_types::IDENTITY_PROVIDER, LOCAL_IDENTITY_PROVIDER);
        }
        if principal.claim(claim_types::AUTHENTICATION_TIME).is_none() {
            principal = principal.with_claim(
                claim_types::AUTHENTICATION_TIME,
                self.clock.now().timestamp().to_string(),
            );
        }

        log::info!("auth:sign_in sub={} sid={}", principal.subject, sid);
        self.session.set_user(principal.clone());
        self.inner.sign_in(scheme, principal)
    }

    fn sign_out(&self, context: &RequestContext, scheme: &str) {
        if scheme == self.cookie_scheme {
            let user = self
                .session
                .user()
                .or_else(|| self.inner.authenticate(context, scheme));
            if let Some(idp) = user
                .as_ref()
                .and_then(|u| u.claim(claim_types::IDENTITY_PROVIDER))
            {
                if self.handlers.handler(idp).is_some_and(|h| h.federated_sign_out) {
                    log::info!("auth:sign_out federated idp={}", idp);
                }
            }
            self.session.remove_session();
        }
        self.inner.sign_out(context, scheme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ServiceCollection;
    use crate::services::{DefaultUserSession, MemoryDistributedCache, SystemClock};
    use axum::http::header;

    fn services(options: ServerOptions) -> ServiceCollection {
        let mut services = ServiceCollection::new();
        services.add_instance(Arc::new(options));
        services.add_singleton::<dyn Clock, SystemClock>();
        services.add_singleton::<dyn super::super::DistributedCache, MemoryDistributedCache>();
        services.add_scoped::<dyn UserSession, DefaultUserSession>();
        services.add_singleton::<dyn AuthenticationService, CookieAuthenticationService>();
        services.add_singleton::<dyn AuthenticationHandlerProvider, ConfiguredHandlerProvider>();
        services
            .decorate::<dyn AuthenticationHandlerProvider, FederatedSignoutHandlerProvider>()
            .unwrap();
        services
            .decorate::<dyn AuthenticationService, IdentityServerAuthenticationService>()
            .unwrap();
        services
    }

    #[test]
    fn unrepresentable_cookie_lifetime_fails_construction() {
        let mut options = ServerOptions::default();
        options.authentication.cookie_lifetime_secs = 10_000_000_000_000_000;
        let provider = services(options).build().unwrap();
        let scope = provider.create_scope();
        assert!(matches!(
            scope.resolve::<dyn AuthenticationService>(),
            Err(ResolutionError::Construction { .. })
        ));
    }

    #[test]
    fn sign_in_stamps_session_claims() {
        let provider = services(ServerOptions::default()).build().unwrap();
        let scope = provider.create_scope();
        let auth = scope.resolve::<dyn AuthenticationService>().unwrap();

        let handle = auth.sign_in("idsrv", Principal::new("alice")).unwrap();
        let ctx =
            RequestContext::get("/").with_header(header::COOKIE, &format!("idsrv={}", handle));

        let principal = auth.authenticate(&ctx, "idsrv").unwrap();
        assert_eq!(principal.claim("idp"), Some("local"));
        assert!(principal.claim("auth_time").is_some());
        let session = scope.resolve::<dyn UserSession>().unwrap();
        assert_eq!(principal.session_id(), session.session_id().as_deref());
    }

    #[test]
    fn sign_in_without_subject_fails() {
        let provider = services(ServerOptions::default()).build().unwrap();
        let scope = provider.create_scope();
        let auth = scope.resolve::<dyn AuthenticationService>().unwrap();
        assert!(auth.sign_in("idsrv", Principal::new("")).is_err());
    }

    #[test]
    fn other_schemes_pass_through_untouched() {
        let provider = services(ServerOptions::default()).build().unwrap();
        let scope = provider.create_scope();
        let auth = scope.resolve::<dyn AuthenticationService>().unwrap();

        let handle = auth.sign_in("idsrv.external", Principal::new("bob")).unwrap();
        let ctx = RequestContext::get("/")
            .with_header(header::COOKIE, &format!("idsrv.external={}", handle));
        let principal = auth.authenticate(&ctx, "idsrv.external").unwrap();
        assert!(principal.claim("sid").is_none());
    }

    #[test]
    fn sign_out_ends_cookie_and_session() {
        let provider = services(ServerOptions::default()).build().unwrap();
        let scope = provider.create_scope();
        let auth = scope.resolve::<dyn AuthenticationService>().unwrap();

        let handle = auth.sign_in("idsrv", Principal::new("alice")).unwrap();
        let ctx =
            RequestContext::get("/").with_header(header::COOKIE, &format!("idsrv={}", handle));
        auth.sign_out(&ctx, "idsrv");

        assert!(auth.authenticate(&ctx, "idsrv").is_none());
        assert!(scope.resolve::<dyn UserSession>().unwrap().session_id().is_none());
    }

    #[test]
    fn federated_schemes_are_flagged() {
        let mut options = ServerOptions::default();
        options.authentication.federated_signout_schemes =
            vec!["oidc".into(), "idsrv.external".into()];
        let provider = services(options).build().unwrap();
        let handlers = provider.resolve::<dyn AuthenticationHandlerProvider>().unwrap();

        assert!(!handlers.handler("idsrv").unwrap().federated_sign_out);
        assert!(handlers.handler("idsrv.external").unwrap().federated_sign_out);
        assert!(handlers.handler("oidc").unwrap().federated_sign_out);
        assert!(handlers.handler("saml").is_none());
        assert_eq!(handlers.schemes(), vec!["idsrv", "idsrv.external", "oidc"]);
    }
}
