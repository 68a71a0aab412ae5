//! Assembly scenarios seen from a host: overrides, decoration and lifetimes
//! through the public container API, then the assembled route table.

use std::sync::Arc;

use tollgate_lib::container::{
    ConfigurationError, Component, Decorator, Lifetime, Registration, RegistrationPolicy,
    ResolutionError, Resolver, ServiceCollection,
};
use tollgate_lib::services::{Clock, FixedClock};

trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> String;

    /// The instance a decorator captured, if this is one.
    fn wrapped(&self) -> Option<Arc<dyn Greeter>> {
        None
    }
}

struct PlainGreeter;

impl Greeter for PlainGreeter {
    fn greet(&self, name: &str) -> String {
        format!("hello {}", name)
    }
}

impl Component for PlainGreeter {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(PlainGreeter)
    }
}

tollgate_lib::provides!(PlainGreeter => dyn Greeter);

struct ShoutingGreeter {
    inner: Arc<dyn Greeter>,
}

impl Greeter for ShoutingGreeter {
    fn greet(&self, name: &str) -> String {
        self.inner.greet(name).to_uppercase()
    }

    fn wrapped(&self) -> Option<Arc<dyn Greeter>> {
        Some(self.inner.clone())
    }
}

impl Decorator<dyn Greeter> for ShoutingGreeter {
    fn decorate(inner: Arc<dyn Greeter>, _: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self { inner })
    }
}

tollgate_lib::provides!(ShoutingGreeter => dyn Greeter);

trait Counter: Send + Sync {}

struct SessionCounter;

impl Counter for SessionCounter {}

impl Component for SessionCounter {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(SessionCounter)
    }
}

tollgate_lib::provides!(SessionCounter => dyn Counter);

#[test]
fn decorated_greeter_wraps_the_singleton_original() {
    let mut services = ServiceCollection::new();
    services.add_singleton::<dyn Greeter, PlainGreeter>();
    services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();
    assert!(services.is_decorated::<dyn Greeter>());

    let provider = services.build().unwrap();
    let first = provider.resolve::<dyn Greeter>().unwrap();
    let second = provider.resolve::<dyn Greeter>().unwrap();
    assert_eq!(first.greet("ada"), "HELLO ADA");
    assert!(!Arc::ptr_eq(&first, &second));

    let inner_a = first.wrapped().unwrap();
    let inner_b = second.wrapped().unwrap();
    assert!(Arc::ptr_eq(&inner_a, &inner_b));
    let original = provider.resolve_undecorated::<dyn Greeter>().unwrap();
    assert!(Arc::ptr_eq(&inner_a, &original));
    assert_eq!(original.greet("ada"), "hello ada");
}

#[test]
fn decorated_scoped_original_follows_the_scope() {
    let mut services = ServiceCollection::new();
    services.add_scoped::<dyn Greeter, PlainGreeter>();
    services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();
    let provider = services.build().unwrap();

    let scope = provider.create_scope();
    let first = scope.resolve::<dyn Greeter>().unwrap();
    let again = scope.resolve::<dyn Greeter>().unwrap();
    assert_eq!(first.greet("ada"), "HELLO ADA");
    assert!(Arc::ptr_eq(&first.wrapped().unwrap(), &again.wrapped().unwrap()));

    let other = provider.create_scope().resolve::<dyn Greeter>().unwrap();
    assert!(!Arc::ptr_eq(&first.wrapped().unwrap(), &other.wrapped().unwrap()));

    let err = provider.resolve::<dyn Greeter>().err().unwrap();
    assert!(matches!(err, ResolutionError::ScopeRequired { .. }));
}

#[test]
fn decorating_twice_is_rejected() {
    let mut services = ServiceCollection::new();
    services.add_singleton::<dyn Greeter, PlainGreeter>();
    services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();
    let err = services.decorate::<dyn Greeter, ShoutingGreeter>().err().unwrap();
    assert!(matches!(err, ConfigurationError::AlreadyDecorated { .. }));
}

#[test]
fn decorating_an_absent_capability_is_rejected() {
    let mut services = ServiceCollection::new();
    let err = services
        .add_transient_decorator::<dyn Greeter, ShoutingGreeter>()
        .err()
        .unwrap();
    assert!(matches!(err, ConfigurationError::NotRegistered { .. }));
}

#[test]
fn try_add_leaves_the_host_choice_alone() {
    let mut services = ServiceCollection::new();
    services.add_instance::<dyn Clock>(Arc::new(FixedClock(chrono::Utc::now())));
    let added = services.register(
        Registration::singleton::<dyn Clock, tollgate_lib::services::SystemClock>(),
        RegistrationPolicy::TryAdd,
    );
    assert!(!added);
    assert_eq!(services.count::<dyn Clock>(), 1);
}

#[test]
fn append_accumulates_and_last_wins_for_single_resolution() {
    let mut services = ServiceCollection::new();
    services.add_transient::<dyn Greeter, PlainGreeter>();
    services.register(
        Registration::factory::<dyn Greeter, _>(Lifetime::Transient, |_| {
            let greeter: Arc<dyn Greeter> = Arc::new(ShoutingGreeter {
                inner: Arc::new(PlainGreeter),
            });
            Ok(greeter)
        }),
        RegistrationPolicy::Append,
    );

    let provider = services.build().unwrap();
    assert_eq!(provider.resolve_all::<dyn Greeter>().unwrap().len(), 2);
    assert_eq!(provider.resolve::<dyn Greeter>().unwrap().greet("x"), "HELLO X");
}

#[test]
fn lifetimes_control_sharing() {
    let mut services = ServiceCollection::new();
    services.add_singleton::<dyn Greeter, PlainGreeter>();
    services.add_scoped::<dyn Counter, SessionCounter>();
    let provider = services.build().unwrap();

    let a = provider.resolve::<dyn Greeter>().unwrap();
    let b = provider.create_scope().resolve::<dyn Greeter>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let scope = provider.create_scope();
    let first = scope.resolve::<dyn Counter>().unwrap();
    let again = scope.resolve::<dyn Counter>().unwrap();
    let other = provider.create_scope().resolve::<dyn Counter>().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));

    let err = provider.resolve::<dyn Counter>().err().unwrap();
    assert!(matches!(err, ResolutionError::ScopeRequired { .. }));
}

#[test]
fn unregistered_capability_is_reported() {
    let provider = ServiceCollection::new().build().unwrap();
    assert!(matches!(
        provider.resolve::<dyn Greeter>(),
        Err(ResolutionError::NotRegistered { .. })
    ));
    assert!(provider.try_resolve::<dyn Greeter>().unwrap().is_none());
    assert!(provider.resolve_all::<dyn Greeter>().unwrap().is_empty());
}

#[test]
fn assembled_route_table_matches_protocol_paths() {
    let server = tollgate_lib::assemble(ServiceCollection::new()).unwrap();
    let endpoints = server.endpoints();

    assert_eq!(endpoints.route("/connect/token").map(|e| e.name()), Some("Token"));
    assert_eq!(
        endpoints.route("/.well-known/openid-configuration").map(|e| e.name()),
        Some("Discovery")
    );
    assert!(endpoints.route("/CONNECT/Token").is_some());
    assert!(endpoints.route("/connect/token/extra").is_none());
    assert!(endpoints.route("/unknown").is_none());
}

#[test]
fn host_registrations_survive_assembly() {
    let mut overrides = ServiceCollection::new();
    overrides.add_singleton::<dyn Greeter, PlainGreeter>();
    let server = tollgate_lib::assemble(overrides).unwrap();
    let greeter = server.provider().resolve::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet("host"), "hello host");
}
