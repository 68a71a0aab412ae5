use std::collections::HashMap;

use serde::Serialize;

use super::{ClientStore, ResourceStore};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::models::{ApiResource, ApiScope, Client, IdentityResource};

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

pub struct InMemoryClientStore {
    clients: HashMap<String, Client>,
}

impl InMemoryClientStore {
    pub fn new(clients: Vec<Client>) -> Self {
        let clients = clients
            .into_iter()
            .map(|c| (c.client_id.clone(), c))
            .collect();
        Self { clients }
    }
}

impl Component for InMemoryClientStore {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self::new(options.clients.clone()))
    }
}

crate::provides!(InMemoryClientStore => dyn ClientStore);

impl ClientStore for InMemoryClientStore {
    fn find_client_by_id(&self, client_id: &str) -> Option<Client> {
        self.clients.get(client_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Every resource the server knows about, as published by discovery.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Resources {
    pub identity_resources: Vec<IdentityResource>,
    pub api_resources: Vec<ApiResource>,
    pub api_scopes: Vec<ApiScope>,
}

impl Resources {
    /// Every scope name a client may request.
    pub fn scope_names(&self) -> Vec<String> {
        self.identity_resources
            .iter()
            .map(|r| r.name.clone())
            .chain(self.api_scopes.iter().map(|s| s.name.clone()))
            .collect()
    }
}

pub struct InMemoryResourceStore {
    resources: Resources,
}

impl InMemoryResourceStore {
    pub fn new(resources: Resources) -> Self {
        Self { resources }
    }
}

impl Component for InMemoryResourceStore {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self::new(Resources {
            identity_resources: options.identity_resources.clone(),
            api_resources: options.api_resources.clone(),
            api_scopes: options.api_scopes.clone(),
        }))
    }
}

crate::provides!(InMemoryResourceStore => dyn ResourceStore);

impl ResourceStore for InMemoryResourceStore {
    fn find_identity_resources_by_scope(&self, scopes: &[String]) -> Vec<IdentityResource> {
        self.resources
            .identity_resources
            .iter()
            .filter(|r| scopes.contains(&r.name))
            .cloned()
            .collect()
    }

    fn find_api_scopes_by_name(&self, names: &[String]) -> Vec<ApiScope> {
        self.resources
            .api_scopes
            .iter()
            .filter(|s| names.contains(&s.name))
            .cloned()
            .collect()
    }

    fn find_api_resources_by_scope(&self, scopes: &[String]) -> Vec<ApiResource> {
        self.resources
            .api_resources
            .iter()
            .filter(|r| r.scopes.iter().any(|s| scopes.contains(s)))
            .cloned()
            .collect()
    }

    fn find_api_resource(&self, name: &str) -> Option<ApiResource> {
        self.resources
            .api_resources
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    fn get_all_resources(&self) -> Resources {
        self.resources.clone()
    }
}
