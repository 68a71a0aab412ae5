use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use super::{PersistedGrantStore, StoreError, StoreResult};
use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::models::{PersistedGrant, PersistedGrantFilter};

/// Persisted grants held in process memory.
#[derive(Default)]
pub struct InMemoryPersistedGrantStore {
    grants: Mutex<HashMap<String, PersistedGrant>>,
}

impl InMemoryPersistedGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PersistedGrant>> {
        self.grants.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Component for InMemoryPersistedGrantStore {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new())
    }
}

crate::provides!(InMemoryPersistedGrantStore => dyn PersistedGrantStore);

impl PersistedGrantStore for InMemoryPersistedGrantStore {
    fn store(&self, grant: PersistedGrant) -> StoreResult<()> {
        let mut grants = self.lock();
        // Lazy cleanup
        let now = Utc::now();
        grants.retain(|_, g| g.expiration.map_or(true, |e| e > now));
        grants.insert(grant.key.clone(), grant);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<PersistedGrant> {
        let grants = self.lock();
        grants
            .get(key)
            .filter(|g| g.expiration.map_or(true, |e| e > Utc::now()))
            .cloned()
    }

    fn get_all(&self, filter: &PersistedGrantFilter) -> StoreResult<Vec<PersistedGrant>> {
        validate_filter(filter)?;
        let grants = self.lock();
        Ok(grants.values().filter(|g| filter.matches(g)).cloned().collect())
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    fn remove_all(&self, filter: &PersistedGrantFilter) -> StoreResult<usize> {
        validate_filter(filter)?;
        let mut grants = self.lock();
        let before = grants.len();
        grants.retain(|_, g| !filter.matches(g));
        Ok(before - grants.len())
    }
}

/// Bulk operations need at least one criterion; an empty filter would match
/// every grant in the store.
fn validate_filter(filter: &PersistedGrantFilter) -> StoreResult<()> {
    if filter.is_empty() {
        return Err(StoreError::InvalidFilter(
            "no subject, session, client or grant type given".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(key: &str, subject: &str, client: &str, grant_type: &str) -> PersistedGrant {
        PersistedGrant {
            key: key.into(),
            grant_type: grant_type.into(),
            subject_id: Some(subject.into()),
            session_id: None,
            client_id: client.into(),
            creation_time: Utc::now(),
            expiration: Some(Utc::now() + Duration::minutes(5)),
            data: "{}".into(),
        }
    }

    #[test]
    fn store_and_get() {
        let store = InMemoryPersistedGrantStore::new();
        store.store(grant("k1", "alice", "web", "authorization_code")).unwrap();
        assert_eq!(store.get("k1").unwrap().client_id, "web");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn expired_grant_is_invisible() {
        let store = InMemoryPersistedGrantStore::new();
        let mut g = grant("k1", "alice", "web", "authorization_code");
        g.expiration = Some(Utc::now() - Duration::seconds(1));
        store.store(g).unwrap();
        assert!(store.get("k1").is_none());
    }

    #[test]
    fn expired_grants_cleaned_on_store() {
        let store = InMemoryPersistedGrantStore::new();
        let mut old = grant("old", "alice", "web", "authorization_code");
        old.expiration = Some(Utc::now() - Duration::seconds(1));
        store.store(old).unwrap();
        store.store(grant("new", "alice", "web", "authorization_code")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_all_by_subject_and_client() {
        let store = InMemoryPersistedGrantStore::new();
        store.store(grant("a", "alice", "web", "refresh_token")).unwrap();
        store.store(grant("b", "alice", "cli", "refresh_token")).unwrap();
        store.store(grant("c", "bob", "web", "refresh_token")).unwrap();

        let filter = PersistedGrantFilter {
            subject_id: Some("alice".into()),
            client_id: Some("web".into()),
            ..Default::default()
        };
        assert_eq!(store.remove_all(&filter).unwrap(), 1);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn empty_filter_is_rejected() {
        let store = InMemoryPersistedGrantStore::new();
        store.store(grant("a", "alice", "web", "refresh_token")).unwrap();
        assert!(matches!(
            store.remove_all(&PersistedGrantFilter::default()),
            Err(StoreError::InvalidFilter(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_all_filters_by_grant_type() {
        let store = InMemoryPersistedGrantStore::new();
        store.store(grant("a", "alice", "web", "refresh_token")).unwrap();
        store.store(grant("b", "alice", "web", "user_consent")).unwrap();
        let filter = PersistedGrantFilter {
            subject_id: Some("alice".into()),
            grant_type: Some("user_consent".into()),
            ..Default::default()
        };
        let found = store.get_all(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "b");
    }
}
