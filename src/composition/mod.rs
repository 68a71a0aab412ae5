//! Composition root: turns host overrides and options into a ready-to-serve
//! set of capabilities plus the protocol route table.
//!
//! Assembly runs once at startup. The phases run in a fixed order because
//! later phases decorate or depend on what earlier ones registered.

mod builder;

use std::path::Path;
use std::sync::Arc;

pub use builder::IdentityServerBuilder;

use crate::config::ServerOptions;
use crate::container::{Scope, ServiceCollection, ServiceProvider};
use crate::endpoints::EndpointRegistry;
use crate::error::TollgateResult;

/// The assembled server: a frozen provider and the route table.
#[derive(Clone)]
pub struct IdentityServer {
    provider: Arc<ServiceProvider>,
    endpoints: Arc<EndpointRegistry>,
    options: Arc<ServerOptions>,
}

impl IdentityServer {
    pub(crate) fn new(
        provider: Arc<ServiceProvider>,
        endpoints: Arc<EndpointRegistry>,
        options: Arc<ServerOptions>,
    ) -> Self {
        Self {
            provider,
            endpoints,
            options,
        }
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// A fresh unit of work, one per incoming request.
    pub fn create_scope(&self) -> Scope {
        self.provider.create_scope()
    }
}

/// Assemble with default options.
pub fn assemble(overrides: ServiceCollection) -> TollgateResult<IdentityServer> {
    assemble_with(overrides, ServerOptions::default())
}

/// Assemble with explicit options. `overrides` are registered before any
/// default, so each of them wins over the default for its capability.
pub fn assemble_with(
    overrides: ServiceCollection,
    options: ServerOptions,
) -> TollgateResult<IdentityServer> {
    options.validate()?;
    log::info!(
        "compose:assemble overrides={} issuer={}",
        overrides.len(),
        options.issuer_uri.as_deref().unwrap_or("<from request>")
    );

    IdentityServerBuilder::new(overrides, options)
        .add_required_platform_services()
        .add_cookie_authentication()?
        .add_core_services()?
        .add_default_endpoints()?
        .add_pluggable_services()
        .add_validators()
        .add_response_generators()
        .add_default_secret_parsers()
        .add_default_secret_validators()
        // Kept last so that anything registered above wins.
        .add_storage_defaults()
        .build()
}

/// Assemble with options read from a JSON file.
pub fn assemble_from_file(
    overrides: ServiceCollection,
    path: &Path,
) -> TollgateResult<IdentityServer> {
    assemble_with(overrides, ServerOptions::load(path)?)
}
