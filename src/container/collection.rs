use std::sync::Arc;

use super::registration::Binding;
use super::{
    Component, ConfigurationError, Lifetime, Registration, ServiceKey, ServiceProvider, Upcast,
};

/// What to do when a capability already has a registration.
///
/// The policy is chosen per capability at the call site; nothing is inferred
/// from the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPolicy {
    /// Keep the existing registration and discard the new one. Used for every
    /// default so that a host registration made earlier always wins.
    TryAdd,
    /// Always add. Multi-implementation capabilities accumulate in order.
    Append,
    /// Drop every existing registration for the capability, then add.
    Replace,
}

#[derive(Debug, Clone)]
struct Requirement {
    key: ServiceKey,
    required_by: String,
}

/// Ordered, mutable set of registrations built during startup.
#[derive(Default, Clone)]
pub struct ServiceCollection {
    registrations: Vec<Registration>,
    requirements: Vec<Requirement>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration under the given policy. Returns whether it was kept.
    pub fn register(&mut self, registration: Registration, policy: RegistrationPolicy) -> bool {
        let key = registration.key;
        match policy {
            RegistrationPolicy::TryAdd => {
                if self.contains_key(key) {
                    log::debug!(
                        "compose:try_add capability={} action=keep_existing discarded={}",
                        key,
                        registration.kind()
                    );
                    return false;
                }
            }
            RegistrationPolicy::Append => {}
            RegistrationPolicy::Replace => {
                let before = self.registrations.len();
                self.registrations.retain(|r| r.key != key);
                if self.registrations.len() != before {
                    log::debug!(
                        "compose:replace capability={} removed={}",
                        key,
                        before - self.registrations.len()
                    );
                }
            }
        }
        self.registrations.push(registration);
        true
    }

    pub fn add(&mut self, registration: Registration) -> &mut Self {
        self.register(registration, RegistrationPolicy::Append);
        self
    }

    pub fn try_add(&mut self, registration: Registration) -> bool {
        self.register(registration, RegistrationPolicy::TryAdd)
    }

    pub fn replace(&mut self, registration: Registration) -> &mut Self {
        self.register(registration, RegistrationPolicy::Replace);
        self
    }

    pub fn add_singleton<C, I>(&mut self) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        self.add(Registration::singleton::<C, I>())
    }

    pub fn add_scoped<C, I>(&mut self) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        self.add(Registration::scoped::<C, I>())
    }

    pub fn add_transient<C, I>(&mut self) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        self.add(Registration::transient::<C, I>())
    }

    pub fn add_instance<C>(&mut self, instance: Arc<C>) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.add(Registration::instance(instance))
    }

    pub fn try_add_singleton<C, I>(&mut self) -> bool
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        self.try_add(Registration::singleton::<C, I>())
    }

    pub fn try_add_transient<C, I>(&mut self) -> bool
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        self.try_add(Registration::transient::<C, I>())
    }

    /// Record that `C` must be registered by the time [`build`](Self::build) runs.
    pub fn require<C: ?Sized + 'static>(&mut self, required_by: impl Into<String>) {
        self.requirements.push(Requirement {
            key: ServiceKey::of::<C>(),
            required_by: required_by.into(),
        });
    }

    pub fn contains<C: ?Sized + 'static>(&self) -> bool {
        self.contains_key(ServiceKey::of::<C>())
    }

    pub fn contains_key(&self, key: ServiceKey) -> bool {
        self.registrations.iter().any(|r| r.key == key)
    }

    /// Number of registrations currently bound to `C`.
    pub fn count<C: ?Sized + 'static>(&self) -> usize {
        let key = ServiceKey::of::<C>();
        self.registrations.iter().filter(|r| r.key == key).count()
    }

    /// The registration resolution would use for `C`.
    pub fn registration<C: ?Sized + 'static>(&self) -> Option<&Registration> {
        let key = ServiceKey::of::<C>();
        self.registrations.iter().rev().find(|r| r.key == key)
    }

    pub fn registrations(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.iter()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub(crate) fn last_index_of(&self, key: ServiceKey) -> Option<usize> {
        self.registrations.iter().rposition(|r| r.key == key)
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Registration {
        self.registrations.remove(index)
    }

    pub(crate) fn push(&mut self, registration: Registration) {
        self.registrations.push(registration);
    }

    /// Check recorded prerequisites and freeze the collection.
    pub fn build(self) -> Result<Arc<ServiceProvider>, ConfigurationError> {
        for requirement in &self.requirements {
            if !self.contains_key(requirement.key) {
                return Err(ConfigurationError::MissingCapability {
                    capability: requirement.key.name().to_string(),
                    required_by: requirement.required_by.clone(),
                });
            }
        }

        let singletons = self
            .registrations
            .iter()
            .filter(|r| {
                r.lifetime == Lifetime::Singleton && !matches!(r.binding, Binding::Instance(_))
            })
            .count();
        log::info!(
            "compose:build registrations={} lazy_singletons={}",
            self.registrations.len(),
            singletons
        );

        Ok(Arc::new(ServiceProvider::new(self.registrations)))
    }
}
