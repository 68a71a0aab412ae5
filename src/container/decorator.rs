use std::sync::Arc;

use super::registration::{erase, Binding, Constructor};
use super::{
    ConfigurationError, Lifetime, Registration, ResolutionError, Resolver, ServiceCollection,
    ServiceKey, Upcast,
};

/// An implementation of `C` that wraps another implementation of `C`.
pub trait Decorator<C: ?Sized>: Send + Sync + Sized + 'static {
    /// Build the decorator around `inner`. `resolver` supplies any other
    /// dependencies the decorator needs.
    fn decorate(inner: Arc<C>, resolver: &Resolver<'_>) -> Result<Self, ResolutionError>;
}

impl ServiceCollection {
    /// Wrap the current binding of `C` in the decorator type `D`.
    ///
    /// The original registration keeps its construction strategy and lifetime
    /// under a private alias. The public slot becomes a transient binding that
    /// resolves the alias and builds a fresh `D` around it, so a singleton
    /// original stays shared while each decorator is new.
    ///
    /// Fails if `C` has no registration, or if `C` was already decorated.
    pub fn decorate<C, D>(&mut self) -> Result<&mut Self, ConfigurationError>
    where
        C: ?Sized + Send + Sync + 'static,
        D: Decorator<C> + Upcast<C>,
    {
        self.insert_decorator::<C, _>(std::any::type_name::<D>(), |inner, resolver| {
            let decorator = Arc::new(D::decorate(inner, resolver)?);
            Ok(<D as Upcast<C>>::upcast(decorator))
        })
    }

    /// Same as [`decorate`](Self::decorate), with the decorator built by a closure.
    pub fn decorate_with<C, F>(&mut self, decorator: F) -> Result<&mut Self, ConfigurationError>
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>, &Resolver<'_>) -> Result<Arc<C>, ResolutionError> + Send + Sync + 'static,
    {
        self.insert_decorator::<C, F>("closure", decorator)
    }

    /// Decorate `C` with `D`, failing the assembly if `C` is absent.
    pub fn add_transient_decorator<C, D>(&mut self) -> Result<&mut Self, ConfigurationError>
    where
        C: ?Sized + Send + Sync + 'static,
        D: Decorator<C> + Upcast<C>,
    {
        self.decorate::<C, D>()
    }

    /// Whether `C` currently resolves through a decorator.
    pub fn is_decorated<C: ?Sized + 'static>(&self) -> bool {
        self.contains_key(ServiceKey::undecorated::<C>())
    }

    fn insert_decorator<C, F>(
        &mut self,
        decorator_name: &'static str,
        decorator: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>, &Resolver<'_>) -> Result<Arc<C>, ResolutionError> + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<C>();
        let alias = ServiceKey::undecorated::<C>();

        let index = self
            .last_index_of(key)
            .ok_or_else(|| ConfigurationError::NotRegistered {
                capability: key.name().to_string(),
            })?;
        if self.contains_key(alias) {
            return Err(ConfigurationError::AlreadyDecorated {
                capability: key.name().to_string(),
            });
        }

        let original = self.remove_at(index);
        log::info!(
            "compose:decorate capability={} decorator={} binding={} lifetime={}",
            key,
            decorator_name,
            original.kind(),
            original.lifetime()
        );
        self.push(original.rekey(alias));

        let construct: Constructor = Arc::new(move |resolver: &Resolver<'_>| {
            let inner = resolver.resolve_key::<C>(alias)?;
            Ok(erase::<C>(decorator(inner, resolver)?))
        });
        self.push(Registration {
            key,
            binding: Binding::Type {
                implementation: decorator_name,
                construct,
            },
            lifetime: Lifetime::Transient,
        });

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::container::{BindingKind, Component};

    trait Greeter: Send + Sync {
        fn greet(&self, name: &str) -> String;
    }

    struct EnglishGreeter;

    impl Greeter for EnglishGreeter {
        fn greet(&self, name: &str) -> String {
            format!("Hello, {}", name)
        }
    }

    impl Component for EnglishGreeter {
        fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(EnglishGreeter)
        }
    }

    crate::provides!(EnglishGreeter => dyn Greeter);

    struct ShoutingGreeter {
        inner: Arc<dyn Greeter>,
        calls: AtomicUsize,
    }

    impl Greeter for ShoutingGreeter {
        fn greet(&self, name: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.greet(name).to_uppercase()
        }
    }

    impl Decorator<dyn Greeter> for ShoutingGreeter {
        fn decorate(inner: Arc<dyn Greeter>, _: &Resolver<'_>) -> Result<Self, ResolutionError> {
            Ok(Self {
                inner,
                calls: AtomicUsize::new(0),
            })
        }
    }

    crate::provides!(ShoutingGreeter => dyn Greeter);

    #[test]
    fn decorating_unregistered_capability_fails() {
        let mut services = ServiceCollection::new();
        let err = services
            .decorate::<dyn Greeter, ShoutingGreeter>()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::NotRegistered { .. }));
    }

    #[test]
    fn decorating_twice_fails() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<dyn Greeter, EnglishGreeter>();
        services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();

        let err = services
            .decorate::<dyn Greeter, ShoutingGreeter>()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::AlreadyDecorated { .. }));
    }

    #[test]
    fn decoration_preserves_original_binding_under_alias() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<dyn Greeter, EnglishGreeter>();
        services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();

        assert!(services.is_decorated::<dyn Greeter>());
        let public = services.registration::<dyn Greeter>().unwrap();
        assert_eq!(public.lifetime(), Lifetime::Transient);
        assert!(public.implementation().unwrap().contains("ShoutingGreeter"));

        let alias = services
            .registrations()
            .find(|r| r.key() == ServiceKey::undecorated::<dyn Greeter>())
            .unwrap();
        assert_eq!(alias.kind(), BindingKind::Type);
        assert_eq!(alias.lifetime(), Lifetime::Singleton);
        assert!(alias.implementation().unwrap().contains("EnglishGreeter"));
    }

    #[test]
    fn decorated_singleton_shares_the_wrapped_instance() {
        let mut services = ServiceCollection::new();
        services.add_singleton::<dyn Greeter, EnglishGreeter>();
        services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();
        let provider = services.build().unwrap();

        let first = provider.resolve::<dyn Greeter>().unwrap();
        let second = provider.resolve::<dyn Greeter>().unwrap();
        assert_eq!(first.greet("ada"), "HELLO, ADA");
        assert!(!Arc::ptr_eq(&first, &second), "decorators are transient");

        let inner_a = provider.resolve_undecorated::<dyn Greeter>().unwrap();
        let inner_b = provider.resolve_undecorated::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&inner_a, &inner_b));
        assert_eq!(inner_a.greet("ada"), "Hello, ada");
    }

    #[test]
    fn decorated_instance_keeps_the_captured_instance() {
        let original: Arc<dyn Greeter> = Arc::new(EnglishGreeter);
        let mut services = ServiceCollection::new();
        services.add_instance(original.clone());
        services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();

        let alias = services
            .registrations()
            .find(|r| r.key() == ServiceKey::undecorated::<dyn Greeter>())
            .unwrap();
        assert_eq!(alias.kind(), BindingKind::Instance);

        let provider = services.build().unwrap();
        let inner = provider.resolve_undecorated::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&inner, &original));
    }

    #[test]
    fn decorated_factory_keeps_its_lifetime() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut services = ServiceCollection::new();
        services.add(Registration::factory::<dyn Greeter, _>(
            Lifetime::Transient,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(EnglishGreeter))
            },
        ));
        services.decorate::<dyn Greeter, ShoutingGreeter>().unwrap();
        let provider = services.build().unwrap();

        provider.resolve::<dyn Greeter>().unwrap();
        provider.resolve::<dyn Greeter>().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closure_decorator_wraps_original() {
        struct Suffix(Arc<dyn Greeter>);
        impl Greeter for Suffix {
            fn greet(&self, name: &str) -> String {
                format!("{}!", self.0.greet(name))
            }
        }

        let mut services = ServiceCollection::new();
        services.add_singleton::<dyn Greeter, EnglishGreeter>();
        services
            .decorate_with::<dyn Greeter, _>(|inner, _| Ok(Arc::new(Suffix(inner))))
            .unwrap();
        let provider = services.build().unwrap();
        assert_eq!(provider.resolve::<dyn Greeter>().unwrap().greet("bo"), "Hello, bo!");
    }
}
