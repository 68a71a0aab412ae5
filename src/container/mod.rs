//! Service registry for the authorization server.
//!
//! Capabilities are Rust types (almost always `dyn Trait`) bound to one of three
//! construction strategies:
//! - a concrete type implementing [`Component`],
//! - a factory closure over the [`Resolver`],
//! - a pre-built instance.
//!
//! Each binding carries a [`Lifetime`]. A [`ServiceCollection`] is filled during
//! startup, then frozen into a [`ServiceProvider`]. Per-request resolution goes
//! through a [`Scope`].
//!
//! Any single-implementation capability can be wrapped after the fact with
//! [`ServiceCollection::decorate`]; the original binding moves to a private alias
//! keyed on the capability, keeping its lifetime and construction strategy.

mod collection;
mod decorator;
mod key;
mod lifetime;
mod provider;
mod registration;

pub use collection::{RegistrationPolicy, ServiceCollection};
pub use decorator::Decorator;
pub use key::ServiceKey;
pub use lifetime::Lifetime;
pub use provider::{Resolver, Scope, ServiceProvider};
pub use registration::{BindingKind, Component, Registration, Upcast};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Startup-time wiring failures. Always fatal; the host aborts assembly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("capability not registered: {capability}")]
    NotRegistered { capability: String },

    #[error("capability already decorated: {capability}")]
    AlreadyDecorated { capability: String },

    #[error("capability {capability} is required by {required_by} but was never registered")]
    MissingCapability {
        capability: String,
        required_by: String,
    },

    #[error("endpoint path registered twice: {path}")]
    DuplicateEndpointPath { path: String },

    #[error("invalid endpoint path: {path:?}")]
    InvalidEndpointPath { path: String },

    #[error("invalid option {option}: {reason}")]
    InvalidOption { option: String, reason: String },
}

/// Request-time resolution failures. These indicate a wiring defect and are
/// propagated to the caller, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no registration for capability {capability}")]
    NotRegistered { capability: String },

    #[error("capability {capability} is scoped and cannot be resolved outside a unit of work")]
    ScopeRequired { capability: String },

    #[error("circular dependency: {chain}")]
    CircularDependency { chain: String },

    #[error("failed to construct {capability}: {reason}")]
    Construction { capability: String, reason: String },
}

impl ResolutionError {
    /// Convenience for constructors that fail for reasons of their own.
    pub fn construction(capability: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Construction {
            capability: capability.into(),
            reason: reason.to_string(),
        }
    }
}

/// Implements [`Upcast`] from a concrete type to one or more capability types.
///
/// ```ignore
/// provides!(EnglishGreeter => dyn Greeter);
/// ```
#[macro_export]
macro_rules! provides {
    ($implementation:ty => $($capability:ty),+ $(,)?) => {
        $(
            impl $crate::container::Upcast<$capability> for $implementation {
                fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$capability> {
                    self
                }
            }
        )+
    };
}
