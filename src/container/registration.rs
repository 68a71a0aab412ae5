use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{Lifetime, ResolutionError, Resolver, ServiceKey};

/// Type-erased resolved value. Always holds an `Arc<C>` for the capability `C`.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

pub(crate) type Constructor =
    Arc<dyn Fn(&Resolver<'_>) -> Result<Erased, ResolutionError> + Send + Sync>;

/// A concrete type the registry can build on its own, pulling dependencies
/// from the resolver.
pub trait Component: Send + Sync + Sized + 'static {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError>;
}

/// Converts a shared concrete instance into a shared capability.
///
/// Every type upcasts to itself; implement the rest with [`crate::provides!`].
pub trait Upcast<C: ?Sized> {
    fn upcast(self: Arc<Self>) -> Arc<C>;
}

impl<T: Send + Sync + 'static> Upcast<T> for T {
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

#[derive(Clone)]
pub(crate) enum Binding {
    Type {
        implementation: &'static str,
        construct: Constructor,
    },
    Factory(Constructor),
    Instance(Erased),
}

/// Which construction strategy a registration uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Type,
    Factory,
    Instance,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Type => write!(f, "type"),
            BindingKind::Factory => write!(f, "factory"),
            BindingKind::Instance => write!(f, "instance"),
        }
    }
}

/// Binds a capability to a construction strategy and a lifetime.
#[derive(Clone)]
pub struct Registration {
    pub(crate) key: ServiceKey,
    pub(crate) binding: Binding,
    pub(crate) lifetime: Lifetime,
}

impl Registration {
    pub fn singleton<C, I>() -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        Self::of_type::<C, I>(Lifetime::Singleton)
    }

    pub fn scoped<C, I>() -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        Self::of_type::<C, I>(Lifetime::Scoped)
    }

    pub fn transient<C, I>() -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        Self::of_type::<C, I>(Lifetime::Transient)
    }

    /// Bind `C` to the concrete type `I`, built through [`Component::construct`].
    pub fn of_type<C, I>(lifetime: Lifetime) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        let construct: Constructor = Arc::new(|resolver: &Resolver<'_>| {
            let instance = Arc::new(I::construct(resolver)?);
            Ok(erase::<C>(<I as Upcast<C>>::upcast(instance)))
        });
        Self {
            key: ServiceKey::of::<C>(),
            binding: Binding::Type {
                implementation: std::any::type_name::<I>(),
                construct,
            },
            lifetime,
        }
    }

    /// Bind `C` to a closure over the resolver.
    pub fn factory<C, F>(lifetime: Lifetime, factory: F) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver<'_>) -> Result<Arc<C>, ResolutionError> + Send + Sync + 'static,
    {
        let construct: Constructor =
            Arc::new(move |resolver: &Resolver<'_>| Ok(erase::<C>(factory(resolver)?)));
        Self {
            key: ServiceKey::of::<C>(),
            binding: Binding::Factory(construct),
            lifetime,
        }
    }

    /// Bind `C` to an already-built instance. Implicitly a singleton.
    pub fn instance<C>(instance: Arc<C>) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
    {
        Self {
            key: ServiceKey::of::<C>(),
            binding: Binding::Instance(erase::<C>(instance)),
            lifetime: Lifetime::Singleton,
        }
    }

    pub fn key(&self) -> ServiceKey {
        self.key
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn kind(&self) -> BindingKind {
        match self.binding {
            Binding::Type { .. } => BindingKind::Type,
            Binding::Factory(_) => BindingKind::Factory,
            Binding::Instance(_) => BindingKind::Instance,
        }
    }

    /// Concrete type name for type bindings.
    pub fn implementation(&self) -> Option<&'static str> {
        match self.binding {
            Binding::Type { implementation, .. } => Some(implementation),
            _ => None,
        }
    }

    /// Same binding and lifetime under a different key.
    pub(crate) fn rekey(self, key: ServiceKey) -> Self {
        Self { key, ..self }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("capability", &self.key.name())
            .field("binding", &self.kind())
            .field("implementation", &self.implementation())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

pub(crate) fn erase<C>(value: Arc<C>) -> Erased
where
    C: ?Sized + Send + Sync + 'static,
{
    Arc::new(value)
}

pub(crate) fn unerase<C>(value: &Erased, key: ServiceKey) -> Result<Arc<C>, ResolutionError>
where
    C: ?Sized + Send + Sync + 'static,
{
    value
        .downcast_ref::<Arc<C>>()
        .cloned()
        .ok_or_else(|| ResolutionError::Construction {
            capability: key.name().to_string(),
            reason: format!("binding does not produce {}", std::any::type_name::<C>()),
        })
}
