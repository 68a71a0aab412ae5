use std::sync::{Arc, Mutex};

use chrono::Duration;

use super::DistributedCache;
use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::models::Principal;

/// The signed-in user's session for the current request.
///
/// Registered scoped: one instance per unit of work. The set of clients that
/// participated in a session outlives the request and is kept in the cache.
pub trait UserSession: Send + Sync {
    /// Issue a session id for `principal`, reusing the current one if the
    /// same subject is already signed in.
    fn create_session_id(&self, principal: &Principal) -> String;
    fn session_id(&self) -> Option<String>;
    fn user(&self) -> Option<Principal>;
    fn set_user(&self, principal: Principal);
    fn add_client_id(&self, client_id: &str);
    fn client_ids(&self) -> Vec<String>;
    fn remove_session(&self);
}

#[derive(Default)]
struct SessionState {
    session_id: Option<String>,
    user: Option<Principal>,
}

pub struct DefaultUserSession {
    cache: Arc<dyn DistributedCache>,
    state: Mutex<SessionState>,
}

const CLIENT_LIST_LIFETIME_HOURS: i64 = 24;

impl DefaultUserSession {
    pub fn new(cache: Arc<dyn DistributedCache>) -> Self {
        Self {
            cache,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clients_key(session_id: &str) -> String {
        format!("session-clients:{}", session_id)
    }
}

impl Component for DefaultUserSession {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?))
    }
}

crate::provides!(DefaultUserSession => dyn UserSession);

impl UserSession for DefaultUserSession {
    fn create_session_id(&self, principal: &Principal) -> String {
        let mut state = self.lock();
        let same_user = state
            .user
            .as_ref()
            .is_some_and(|u| u.subject == principal.subject);
        if let (true, Some(existing)) = (same_user, state.session_id.as_ref()) {
            return existing.clone();
        }
        let id = unique_id();
        state.session_id = Some(id.clone());
        id
    }

    fn session_id(&self) -> Option<String> {
        self.lock().session_id.clone()
    }

    fn user(&self) -> Option<Principal> {
        self.lock().user.clone()
    }

    fn set_user(&self, principal: Principal) {
        let mut state = self.lock();
        if let Some(sid) = principal.session_id() {
            state.session_id = Some(sid.to_string());
        }
        state.user = Some(principal);
    }

    fn add_client_id(&self, client_id: &str) {
        let Some(sid) = self.session_id() else {
            return;
        };
        let mut clients = self.client_ids();
        if clients.iter().any(|c| c == client_id) {
            return;
        }
        clients.push(client_id.to_string());
        match serde_json::to_vec(&clients) {
            Ok(bytes) => self.cache.set(
                &Self::clients_key(&sid),
                bytes,
                Duration::hours(CLIENT_LIST_LIFETIME_HOURS),
            ),
            Err(e) => log::error!("session:add_client sid={} error={}", sid, e),
        }
    }

    fn client_ids(&self) -> Vec<String> {
        let Some(sid) = self.session_id() else {
            return Vec::new();
        };
        self.cache
            .get(&Self::clients_key(&sid))
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn remove_session(&self) {
        let mut state = self.lock();
        if let Some(sid) = state.session_id.take() {
            self.cache.remove(&Self::clients_key(&sid));
            log::debug!("session:remove sid={}", sid);
        }
        state.user = None;
    }
}

/// 16 random bytes as upper-case hex.
pub(crate) fn unique_id() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MemoryDistributedCache, SystemClock};

    fn session() -> DefaultUserSession {
        DefaultUserSession::new(Arc::new(MemoryDistributedCache::new(Arc::new(SystemClock))))
    }

    #[test]
    fn session_id_reused_for_same_subject() {
        let session = session();
        let alice = Principal::new("alice");
        let first = session.create_session_id(&alice);
        session.set_user(alice.clone());
        assert_eq!(session.create_session_id(&alice), first);
        assert_ne!(session.create_session_id(&Principal::new("bob")), first);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn client_ids_tracked_per_session() {
        let session = session();
        session.add_client_id("ignored-without-session");
        assert!(session.client_ids().is_empty());

        session.create_session_id(&Principal::new("alice"));
        session.add_client_id("web");
        session.add_client_id("web");
        session.add_client_id("spa");
        assert_eq!(session.client_ids(), vec!["web", "spa"]);

        session.remove_session();
        assert!(session.session_id().is_none());
        assert!(session.client_ids().is_empty());
    }
}
