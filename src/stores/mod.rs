//! Storage contracts and their in-memory defaults.
//!
//! The in-memory stores are registered last during assembly and only when the
//! host supplied nothing better. They lose everything on restart.

mod clients;
mod device;
mod persisted;

pub use clients::{InMemoryClientStore, InMemoryResourceStore, Resources};
pub use device::InMemoryDeviceFlowStore;
pub use persisted::InMemoryPersistedGrantStore;

use crate::protocol::models::{
    ApiResource, ApiScope, Client, DeviceCode, IdentityResource, PersistedGrant,
    PersistedGrantFilter,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Raw persisted grant storage keyed by the (hashed) grant key.
pub trait PersistedGrantStore: Send + Sync {
    fn store(&self, grant: PersistedGrant) -> StoreResult<()>;
    fn get(&self, key: &str) -> Option<PersistedGrant>;
    fn get_all(&self, filter: &PersistedGrantFilter) -> StoreResult<Vec<PersistedGrant>>;
    fn remove(&self, key: &str);
    fn remove_all(&self, filter: &PersistedGrantFilter) -> StoreResult<usize>;
}

pub trait ClientStore: Send + Sync {
    fn find_client_by_id(&self, client_id: &str) -> Option<Client>;
}

pub trait ResourceStore: Send + Sync {
    fn find_identity_resources_by_scope(&self, scopes: &[String]) -> Vec<IdentityResource>;
    fn find_api_scopes_by_name(&self, names: &[String]) -> Vec<ApiScope>;
    fn find_api_resources_by_scope(&self, scopes: &[String]) -> Vec<ApiResource>;
    fn find_api_resource(&self, name: &str) -> Option<ApiResource>;
    fn get_all_resources(&self) -> Resources;
}

/// Device authorizations, keyed both by user code and by (hashed) device code.
pub trait DeviceFlowStore: Send + Sync {
    fn store_device_authorization(
        &self,
        device_code: &str,
        user_code: &str,
        data: DeviceCode,
    ) -> StoreResult<()>;
    fn find_by_user_code(&self, user_code: &str) -> Option<DeviceCode>;
    fn find_by_device_code(&self, device_code: &str) -> Option<DeviceCode>;
    fn update_by_user_code(&self, user_code: &str, data: DeviceCode) -> StoreResult<()>;
    fn remove_by_device_code(&self, device_code: &str);
}
