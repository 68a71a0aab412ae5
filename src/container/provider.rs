use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use uuid::Uuid;

use super::registration::{unerase, Binding, Constructor, Erased};
use super::{Lifetime, Registration, ResolutionError, ServiceKey};

// ---------------------------------------------------------------------------
// ServiceProvider: frozen registrations plus the singleton cache
// ---------------------------------------------------------------------------

/// Immutable view of the assembled registrations.
///
/// Resolution is lock-free for transient bindings, instances, and singletons
/// that were already built. First construction of a singleton is serialized
/// per registration so it happens at most once per provider.
pub struct ServiceProvider {
    registrations: Vec<Registration>,
    index: HashMap<ServiceKey, Vec<usize>>,
    singletons: Vec<SingletonSlot>,
}

#[derive(Default)]
struct SingletonSlot {
    value: OnceLock<Erased>,
    init: Mutex<()>,
}

impl ServiceProvider {
    pub(crate) fn new(registrations: Vec<Registration>) -> Self {
        let mut index: HashMap<ServiceKey, Vec<usize>> = HashMap::new();
        for (i, registration) in registrations.iter().enumerate() {
            index.entry(registration.key).or_default().push(i);
        }
        let singletons = registrations.iter().map(|_| SingletonSlot::default()).collect();
        Self {
            registrations,
            index,
            singletons,
        }
    }

    /// Start a unit of work. Scoped instances live as long as the returned scope.
    pub fn create_scope(self: &Arc<Self>) -> Scope {
        let scope = Scope {
            id: Uuid::new_v4(),
            provider: Arc::clone(self),
            instances: Mutex::new(HashMap::new()),
        };
        log::trace!("scope:begin id={}", scope.id);
        scope
    }

    /// Resolve outside any unit of work. Scoped capabilities fail here.
    pub fn resolve<C>(&self) -> Result<Arc<C>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.root().resolve::<C>()
    }

    pub fn resolve_all<C>(&self) -> Result<Vec<Arc<C>>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.root().resolve_all::<C>()
    }

    pub fn try_resolve<C>(&self) -> Result<Option<Arc<C>>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.root().try_resolve::<C>()
    }

    /// Resolve the binding a decorator of `C` wraps.
    pub fn resolve_undecorated<C>(&self) -> Result<Arc<C>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.root().resolve_undecorated::<C>()
    }

    pub fn contains<C: ?Sized + 'static>(&self) -> bool {
        self.index.contains_key(&ServiceKey::of::<C>())
    }

    /// Lifetime of the registration `resolve::<C>()` would use.
    pub fn lifetime_of<C: ?Sized + 'static>(&self) -> Option<Lifetime> {
        self.last_index(ServiceKey::of::<C>())
            .map(|i| self.registrations[i].lifetime)
    }

    fn root(&self) -> Resolver<'_> {
        Resolver {
            provider: self,
            scope: None,
            parent: None,
            key: None,
        }
    }

    fn last_index(&self, key: ServiceKey) -> Option<usize> {
        self.index.get(&key).and_then(|v| v.last().copied())
    }

    fn indices(&self, key: ServiceKey) -> &[usize] {
        self.index.get(&key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn instantiate(
        &self,
        index: usize,
        resolver: &Resolver<'_>,
    ) -> Result<Erased, ResolutionError> {
        let registration = &self.registrations[index];
        let construct = match &registration.binding {
            Binding::Instance(value) => return Ok(value.clone()),
            Binding::Type { construct, .. } | Binding::Factory(construct) => construct,
        };

        match registration.lifetime {
            Lifetime::Singleton => {
                // Singletons never see the caller's scope, so they cannot
                // capture a scoped instance.
                let root = Resolver {
                    scope: None,
                    ..*resolver
                };
                self.singleton(index, construct, &root)
            }
            Lifetime::Scoped => {
                let scope = resolver.scope.ok_or_else(|| ResolutionError::ScopeRequired {
                    capability: registration.key.name().to_string(),
                })?;
                scope.get_or_create(index, || construct(resolver))
            }
            Lifetime::Transient => construct(resolver),
        }
    }

    fn singleton(
        &self,
        index: usize,
        construct: &Constructor,
        resolver: &Resolver<'_>,
    ) -> Result<Erased, ResolutionError> {
        let slot = &self.singletons[index];
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let _guard = slot.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let value = construct(resolver)?;
        log::debug!(
            "resolve:singleton capability={} action=constructed",
            self.registrations[index].key
        );
        Ok(slot.value.get_or_init(|| value).clone())
    }
}

// ---------------------------------------------------------------------------
// Scope: one unit of work
// ---------------------------------------------------------------------------

/// Cache for scoped instances, one per incoming request.
///
/// A scope must not be shared by concurrent units of work; the host creates a
/// fresh one per request.
pub struct Scope {
    id: Uuid,
    provider: Arc<ServiceProvider>,
    instances: Mutex<HashMap<usize, Erased>>,
}

impl Scope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    pub fn resolve<C>(&self) -> Result<Arc<C>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve::<C>()
    }

    pub fn resolve_all<C>(&self) -> Result<Vec<Arc<C>>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_all::<C>()
    }

    pub fn try_resolve<C>(&self) -> Result<Option<Arc<C>>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolver().try_resolve::<C>()
    }

    pub fn resolve_undecorated<C>(&self) -> Result<Arc<C>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_undecorated::<C>()
    }

    /// Resolver bound to this scope, for code that takes `&Resolver`.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver {
            provider: &self.provider,
            scope: Some(self),
            parent: None,
            key: None,
        }
    }

    fn get_or_create(
        &self,
        index: usize,
        create: impl FnOnce() -> Result<Erased, ResolutionError>,
    ) -> Result<Erased, ResolutionError> {
        if let Some(existing) = self.lock().get(&index) {
            return Ok(existing.clone());
        }
        // Built without holding the lock: the constructor may resolve other
        // scoped capabilities from this same scope.
        let created = create()?;
        Ok(self.lock().entry(index).or_insert(created).clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, Erased>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        log::trace!("scope:end id={}", self.id);
    }
}

// ---------------------------------------------------------------------------
// Resolver: handed to constructors and factories
// ---------------------------------------------------------------------------

/// Resolution context: the provider, the current scope if any, and the chain
/// of capabilities being constructed (for cycle detection).
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    provider: &'a ServiceProvider,
    scope: Option<&'a Scope>,
    parent: Option<&'a Resolver<'a>>,
    key: Option<ServiceKey>,
}

impl<'a> Resolver<'a> {
    pub fn resolve<C>(&self) -> Result<Arc<C>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolve_key::<C>(ServiceKey::of::<C>())
    }

    /// Every registration of `C`, in registration order. Empty if none.
    pub fn resolve_all<C>(&self) -> Result<Vec<Arc<C>>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<C>();
        self.provider
            .indices(key)
            .iter()
            .map(|&i| {
                let value = self.resolve_index(key, i)?;
                unerase::<C>(&value, key)
            })
            .collect()
    }

    pub fn try_resolve<C>(&self) -> Result<Option<Arc<C>>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<C>();
        if self.provider.last_index(key).is_none() {
            return Ok(None);
        }
        self.resolve_key::<C>(key).map(Some)
    }

    pub fn resolve_undecorated<C>(&self) -> Result<Arc<C>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.resolve_key::<C>(ServiceKey::undecorated::<C>())
    }

    /// Id of the unit of work this resolution runs in, if any.
    pub fn scope_id(&self) -> Option<Uuid> {
        self.scope.map(|s| s.id)
    }

    pub(crate) fn resolve_key<C>(&self, key: ServiceKey) -> Result<Arc<C>, ResolutionError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let index = self
            .provider
            .last_index(key)
            .ok_or_else(|| ResolutionError::NotRegistered {
                capability: key.name().to_string(),
            })?;
        let value = self.resolve_index(key, index)?;
        unerase::<C>(&value, key)
    }

    fn resolve_index(&self, key: ServiceKey, index: usize) -> Result<Erased, ResolutionError> {
        self.check_cycle(key)?;
        let child = Resolver {
            provider: self.provider,
            scope: self.scope,
            parent: Some(self),
            key: Some(key),
        };
        self.provider.instantiate(index, &child)
    }

    fn check_cycle(&self, key: ServiceKey) -> Result<(), ResolutionError> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        let mut cyclic = false;
        while let Some(resolver) = current {
            if let Some(k) = resolver.key {
                chain.push(k.name());
                cyclic |= k == key;
            }
            current = resolver.parent;
        }
        if !cyclic {
            return Ok(());
        }
        chain.reverse();
        chain.push(key.name());
        Err(ResolutionError::CircularDependency {
            chain: chain.join(" -> "),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::container::{Component, ServiceCollection};

    trait Counter: Send + Sync {
        fn serial(&self) -> usize;
    }

    struct Numbered(usize);

    impl Counter for Numbered {
        fn serial(&self) -> usize {
            self.0
        }
    }

    fn numbered(lifetime: Lifetime) -> (ServiceCollection, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut services = ServiceCollection::new();
        services.add(Registration::factory::<dyn Counter, _>(lifetime, move |_| {
            Ok(Arc::new(Numbered(counter.fetch_add(1, Ordering::SeqCst))))
        }));
        (services, built)
    }

    #[test]
    fn singleton_resolution_is_idempotent() {
        let (services, built) = numbered(Lifetime::Singleton);
        let provider = services.build().unwrap();
        let a = provider.resolve::<dyn Counter>().unwrap();
        let b = provider.create_scope().resolve::<dyn Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn singleton_constructed_once_under_contention() {
        let (services, built) = numbered(Lifetime::Singleton);
        let provider = services.build().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                thread::spawn(move || provider.resolve::<dyn Counter>().unwrap().serial())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0);
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scoped_is_shared_within_scope_only() {
        let (services, _) = numbered(Lifetime::Scoped);
        let provider = services.build().unwrap();

        let first = provider.create_scope();
        let second = provider.create_scope();
        assert_ne!(first.id(), second.id());

        let a1 = first.resolve::<dyn Counter>().unwrap();
        let a2 = first.resolve::<dyn Counter>().unwrap();
        let b = second.resolve::<dyn Counter>().unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[test]
    fn scoped_outside_scope_fails() {
        let (services, _) = numbered(Lifetime::Scoped);
        let provider = services.build().unwrap();
        assert!(matches!(
            provider.resolve::<dyn Counter>(),
            Err(ResolutionError::ScopeRequired { .. })
        ));
    }

    #[test]
    fn transient_is_never_cached() {
        let (services, built) = numbered(Lifetime::Transient);
        let provider = services.build().unwrap();
        let scope = provider.create_scope();
        let a = scope.resolve::<dyn Counter>().unwrap();
        let b = scope.resolve::<dyn Counter>().unwrap();
        assert_ne!(a.serial(), b.serial());
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unregistered_capability_is_a_resolution_error() {
        let provider = ServiceCollection::new().build().unwrap();
        assert!(matches!(
            provider.resolve::<dyn Counter>(),
            Err(ResolutionError::NotRegistered { .. })
        ));
        assert!(provider.try_resolve::<dyn Counter>().unwrap().is_none());
        assert!(provider.resolve_all::<dyn Counter>().unwrap().is_empty());
    }

    struct SessionState;
    struct Cache {
        _session: Arc<SessionState>,
    }

    impl Component for Cache {
        fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self {
                _session: resolver.resolve()?,
            })
        }
    }

    #[test]
    fn singleton_cannot_capture_scoped_dependency() {
        let mut services = ServiceCollection::new();
        services.add(Registration::factory::<SessionState, _>(Lifetime::Scoped, |_| {
            Ok(Arc::new(SessionState))
        }));
        services.add_singleton::<Cache, Cache>();
        let provider = services.build().unwrap();

        let scope = provider.create_scope();
        assert!(scope.resolve::<SessionState>().is_ok());
        assert!(matches!(
            scope.resolve::<Cache>(),
            Err(ResolutionError::ScopeRequired { .. })
        ));
    }

    struct Chicken;
    struct Egg;

    impl Component for Chicken {
        fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
            resolver.resolve::<Egg>()?;
            Ok(Chicken)
        }
    }

    impl Component for Egg {
        fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
            resolver.resolve::<Chicken>()?;
            Ok(Egg)
        }
    }

    #[test]
    fn cycles_are_reported_with_the_chain() {
        let mut services = ServiceCollection::new();
        services.add_transient::<Chicken, Chicken>();
        services.add_singleton::<Egg, Egg>();
        let provider = services.build().unwrap();

        match provider.resolve::<Chicken>() {
            Err(ResolutionError::CircularDependency { chain }) => {
                assert!(chain.contains("Chicken -> "), "{}", chain);
                assert!(chain.ends_with("Chicken"), "{}", chain);
            }
            other => panic!("expected CircularDependency, got {:?}", other.map(|_| ())),
        }
    }
}
