//! Typed grant storage on top of the raw [`PersistedGrantStore`].

use std::marker::PhantomData;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::container::{Component, ResolutionError, Resolver, Upcast};
use crate::error::TollgateResult;
use crate::protocol::models::{GrantItem, PersistedGrant, PersistedGrantFilter};
use crate::stores::PersistedGrantStore;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Generates the opaque handles given out for codes and reference tokens.
pub trait HandleGenerationService: Send + Sync {
    fn create_handle(&self, length: usize) -> String;
}

pub struct DefaultHandleGenerationService;

pub const DEFAULT_HANDLE_LENGTH: usize = 32;

impl HandleGenerationService for DefaultHandleGenerationService {
    fn create_handle(&self, length: usize) -> String {
        use rand::Rng;
        let mut bytes = vec![0u8; length];
        rand::rng().fill(bytes.as_mut_slice());
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl Component for DefaultHandleGenerationService {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(DefaultHandleGenerationService => dyn HandleGenerationService);

// ---------------------------------------------------------------------------
// Serializer
// ---------------------------------------------------------------------------

/// Converts grant payloads to and from the stored `data` string.
pub trait PersistedGrantSerializer: Send + Sync {
    fn serialize(&self, value: &serde_json::Value) -> Result<String, serde_json::Error>;
    fn deserialize(&self, data: &str) -> Result<serde_json::Value, serde_json::Error>;
}

pub struct JsonGrantSerializer;

impl PersistedGrantSerializer for JsonGrantSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Result<String, serde_json::Error> {
        serde_json::to_string(value)
    }

    fn deserialize(&self, data: &str) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(data)
    }
}

impl Component for JsonGrantSerializer {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(JsonGrantSerializer => dyn PersistedGrantSerializer);

// ---------------------------------------------------------------------------
// Typed grant store
// ---------------------------------------------------------------------------

/// Store for one kind of grant. Handles are returned to clients; only their
/// hash is used as the storage key.
pub trait GrantStore<T>: Send + Sync {
    /// Store under a fresh random handle and return it.
    fn store(&self, item: &T) -> TollgateResult<String>;
    /// Store under a caller-chosen handle, replacing any previous item.
    fn store_as(&self, handle: &str, item: &T) -> TollgateResult<()>;
    fn get(&self, handle: &str) -> Option<T>;
    fn remove(&self, handle: &str);
    fn remove_all(&self, subject_id: &str, client_id: &str) -> TollgateResult<usize>;
}

pub struct DefaultGrantStore<T> {
    store: Arc<dyn PersistedGrantStore>,
    handles: Arc<dyn HandleGenerationService>,
    serializer: Arc<dyn PersistedGrantSerializer>,
    _item: PhantomData<fn() -> T>,
}

impl<T: GrantItem> DefaultGrantStore<T> {
    pub fn new(
        store: Arc<dyn PersistedGrantStore>,
        handles: Arc<dyn HandleGenerationService>,
        serializer: Arc<dyn PersistedGrantSerializer>,
    ) -> Self {
        Self {
            store,
            handles,
            serializer,
            _item: PhantomData,
        }
    }

    fn hashed_key(handle: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", handle, T::GRANT_TYPE).as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

impl<T: GrantItem> Component for DefaultGrantStore<T> {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(
            resolver.resolve()?,
            resolver.resolve()?,
            resolver.resolve()?,
        ))
    }
}

impl<T: GrantItem> Upcast<dyn GrantStore<T>> for DefaultGrantStore<T> {
    fn upcast(self: Arc<Self>) -> Arc<dyn GrantStore<T>> {
        self
    }
}

impl<T: GrantItem> GrantStore<T> for DefaultGrantStore<T> {
    fn store(&self, item: &T) -> TollgateResult<String> {
        let handle = self.handles.create_handle(DEFAULT_HANDLE_LENGTH);
        self.store_as(&handle, item)?;
        Ok(handle)
    }

    fn store_as(&self, handle: &str, item: &T) -> TollgateResult<()> {
        let data = self.serializer.serialize(&serde_json::to_value(item)?)?;
        self.store.store(PersistedGrant {
            key: Self::hashed_key(handle),
            grant_type: T::GRANT_TYPE.to_string(),
            subject_id: item.subject_id().map(str::to_string),
            session_id: item.session_id().map(str::to_string),
            client_id: item.client_id().to_string(),
            creation_time: item.creation_time(),
            expiration: item.expiration(),
            data,
        })?;
        log::debug!(
            "grants:store type={} client={}",
            T::GRANT_TYPE,
            item.client_id()
        );
        Ok(())
    }

    fn get(&self, handle: &str) -> Option<T> {
        let grant = self.store.get(&Self::hashed_key(handle))?;
        if grant.grant_type != T::GRANT_TYPE {
            return None;
        }
        let value = match self.serializer.deserialize(&grant.data) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("grants:get type={} error={}", T::GRANT_TYPE, e);
                return None;
            }
        };
        serde_json::from_value(value).ok()
    }

    fn remove(&self, handle: &str) {
        self.store.remove(&Self::hashed_key(handle));
    }

    fn remove_all(&self, subject_id: &str, client_id: &str) -> TollgateResult<usize> {
        Ok(self.store.remove_all(&PersistedGrantFilter {
            subject_id: Some(subject_id.to_string()),
            client_id: Some(client_id.to_string()),
            grant_type: Some(T::GRANT_TYPE.to_string()),
            ..Default::default()
        })?)
    }
}

// ---------------------------------------------------------------------------
// Grant management for a user
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantSummary {
    pub client_id: String,
    pub grant_type: String,
    pub creation_time: DateTime<Utc>,
    pub expiration: Option<DateTime<Utc>>,
}

/// What a user has granted, across all grant types.
pub trait PersistedGrantService: Send + Sync {
    fn get_all_grants(&self, subject_id: &str) -> TollgateResult<Vec<GrantSummary>>;
    fn remove_all_grants(&self, subject_id: &str, client_id: Option<&str>) -> TollgateResult<usize>;
}

pub struct DefaultPersistedGrantService {
    store: Arc<dyn PersistedGrantStore>,
}

impl Component for DefaultPersistedGrantService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            store: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultPersistedGrantService => dyn PersistedGrantService);

impl PersistedGrantService for DefaultPersistedGrantService {
    fn get_all_grants(&self, subject_id: &str) -> TollgateResult<Vec<GrantSummary>> {
        let filter = PersistedGrantFilter {
            subject_id: Some(subject_id.to_string()),
            ..Default::default()
        };
        let mut grants: Vec<GrantSummary> = self
            .store
            .get_all(&filter)?
            .into_iter()
            .map(|g| GrantSummary {
                client_id: g.client_id,
                grant_type: g.grant_type,
                creation_time: g.creation_time,
                expiration: g.expiration,
            })
            .collect();
        grants.sort_by(|a, b| a.creation_time.cmp(&b.creation_time));
        Ok(grants)
    }

    fn remove_all_grants(
        &self,
        subject_id: &str,
        client_id: Option<&str>,
    ) -> TollgateResult<usize> {
        let removed = self.store.remove_all(&PersistedGrantFilter {
            subject_id: Some(subject_id.to_string()),
            client_id: client_id.map(str::to_string),
            ..Default::default()
        })?;
        log::info!(
            "grants:remove_all sub={} client={} removed={}",
            subject_id,
            client_id.unwrap_or("*"),
            removed
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{AuthorizationCode, Consent, Principal};
    use crate::stores::InMemoryPersistedGrantStore;

    fn stores() -> (
        Arc<InMemoryPersistedGrantStore>,
        DefaultGrantStore<AuthorizationCode>,
        DefaultGrantStore<Consent>,
    ) {
        let raw = Arc::new(InMemoryPersistedGrantStore::new());
        let handles: Arc<dyn HandleGenerationService> = Arc::new(DefaultHandleGenerationService);
        let serializer: Arc<dyn PersistedGrantSerializer> = Arc::new(JsonGrantSerializer);
        (
            raw.clone(),
            DefaultGrantStore::new(raw.clone(), handles.clone(), serializer.clone()),
            DefaultGrantStore::new(raw, handles, serializer),
        )
    }

    fn code(client_id: &str) -> AuthorizationCode {
        AuthorizationCode {
            client_id: client_id.into(),
            subject: Principal::new("alice"),
            redirect_uri: "https://app/cb".into(),
            scopes: vec!["openid".into()],
            code_challenge: None,
            nonce: None,
            creation_time: Utc::now(),
            lifetime: 300,
        }
    }

    #[test]
    fn handles_are_random_and_url_safe() {
        let service = DefaultHandleGenerationService;
        let a = service.create_handle(32);
        let b = service.create_handle(32);
        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), 32);
    }

    #[test]
    fn store_then_get_by_handle() {
        let (raw, codes, _) = stores();
        let handle = codes.store(&code("web")).unwrap();
        assert_eq!(codes.get(&handle).unwrap().client_id, "web");
        // Only the hash of the handle is stored.
        assert!(raw.get(&handle).is_none());
    }

    #[test]
    fn grant_types_do_not_mix() {
        let (_, codes, consents) = stores();
        let handle = codes.store(&code("web")).unwrap();
        assert!(consents.get(&handle).is_none());
    }

    #[test]
    fn remove_all_only_touches_one_type() {
        let (raw, codes, consents) = stores();
        codes.store(&code("web")).unwrap();
        consents
            .store(&Consent {
                subject_id: "alice".into(),
                client_id: "web".into(),
                scopes: vec!["openid".into()],
                creation_time: Utc::now(),
                expiration: None,
            })
            .unwrap();

        assert_eq!(codes.remove_all("alice", "web").unwrap(), 1);
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn persisted_grant_service_lists_and_revokes() {
        let (raw, codes, _) = stores();
        codes.store(&code("web")).unwrap();
        codes.store(&code("cli")).unwrap();
        let service = DefaultPersistedGrantService { store: raw };

        assert_eq!(service.get_all_grants("alice").unwrap().len(), 2);
        assert_eq!(service.remove_all_grants("alice", Some("cli")).unwrap(), 1);
        assert_eq!(service.get_all_grants("alice").unwrap()[0].client_id, "web");
    }
}
