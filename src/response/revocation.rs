use std::sync::Arc;

use crate::container::{Component, ResolutionError, Resolver};
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::token_type_hints;
use crate::protocol::messages::RevocationRequest;
use crate::protocol::models::RefreshTokenGrant;
use crate::protocol::{Token, Validated};
use crate::services::{Event, EventService, GrantStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationOutcome {
    RefreshToken,
    AccessToken,
    /// Unknown or issued to another client. Still a success on the wire.
    NotFound,
}

pub trait TokenRevocationResponseGenerator: Send + Sync {
    fn process(&self, request: &Validated<RevocationRequest>) -> TollgateResult<RevocationOutcome>;
}

/// Revokes refresh tokens and reference access tokens. JWT access tokens
/// cannot be revoked and are reported as not found.
pub struct DefaultTokenRevocationResponseGenerator {
    refresh_tokens: Arc<dyn GrantStore<RefreshTokenGrant>>,
    reference_tokens: Arc<dyn GrantStore<Token>>,
    events: Arc<dyn EventService>,
}

impl Component for DefaultTokenRevocationResponseGenerator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            refresh_tokens: resolver.resolve()?,
            reference_tokens: resolver.resolve()?,
            events: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultTokenRevocationResponseGenerator => dyn TokenRevocationResponseGenerator);

impl DefaultTokenRevocationResponseGenerator {
    fn revoke_refresh_token(&self, handle: &str, client_id: &str) -> bool {
        match self.refresh_tokens.get(handle) {
            Some(grant) if grant.access_token.client_id == client_id => {
                self.refresh_tokens.remove(handle);
                true
            }
            Some(_) => {
                log::warn!("revocation:refresh client_mismatch client={}", client_id);
                false
            }
            None => false,
        }
    }

    fn revoke_access_token(&self, handle: &str, client_id: &str) -> bool {
        match self.reference_tokens.get(handle) {
            Some(token) if token.client_id == client_id => {
                self.reference_tokens.remove(handle);
                true
            }
            Some(_) => {
                log::warn!("revocation:access client_mismatch client={}", client_id);
                false
            }
            None => false,
        }
    }
}

impl TokenRevocationResponseGenerator for DefaultTokenRevocationResponseGenerator {
    fn process(&self, request: &Validated<RevocationRequest>) -> TollgateResult<RevocationOutcome> {
        let client = request
            .client
            .as_ref()
            .ok_or_else(|| TollgateError::Other("revocation request has no client".into()))?;
        let handle = request.request.token.as_str();
        let client_id = client.client_id.as_str();

        // The hint only decides which store is tried first.
        let access_first =
            request.request.token_type_hint.as_deref() == Some(token_type_hints::ACCESS_TOKEN);
        let outcome = if access_first {
            if self.revoke_access_token(handle, client_id) {
                RevocationOutcome::AccessToken
            } else if self.revoke_refresh_token(handle, client_id) {
                RevocationOutcome::RefreshToken
            } else {
                RevocationOutcome::NotFound
            }
        } else if self.revoke_refresh_token(handle, client_id) {
            RevocationOutcome::RefreshToken
        } else if self.revoke_access_token(handle, client_id) {
            RevocationOutcome::AccessToken
        } else {
            RevocationOutcome::NotFound
        };

        log::info!("revocation:process client={} outcome={:?}", client_id, outcome);
        if outcome != RevocationOutcome::NotFound {
            self.events.raise(Event::token_revoked(client_id));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::Client;
    use crate::services::{
        DefaultGrantStore, DefaultHandleGenerationService, EventCategory, JsonGrantSerializer,
    };
    use crate::stores::{InMemoryPersistedGrantStore, PersistedGrantStore};
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEvents(Mutex<Vec<String>>);

    impl EventService for RecordingEvents {
        fn raise(&self, event: Event) {
            self.0.lock().unwrap().push(event.name);
        }
        fn can_raise(&self, _: EventCategory) -> bool {
            true
        }
    }

    fn token(client_id: &str) -> Token {
        Token {
            issuer: "https://id".into(),
            audiences: vec![],
            client_id: client_id.into(),
            subject: Some("alice".into()),
            session_id: None,
            scopes: vec!["orders".into()],
            creation_time: Utc::now(),
            lifetime: 3600,
            access_token_type: Default::default(),
            claims: Default::default(),
        }
    }

    fn request(handle: &str, client_id: &str, hint: Option<&str>) -> Validated<RevocationRequest> {
        Validated::new(RevocationRequest {
            token: handle.into(),
            token_type_hint: hint.map(str::to_string),
        })
        .with_client(Client::new(client_id))
    }

    #[test]
    fn tokens_are_revoked_only_for_their_own_client() {
        let raw: Arc<dyn PersistedGrantStore> = Arc::new(InMemoryPersistedGrantStore::new());
        let refresh_tokens: Arc<dyn GrantStore<RefreshTokenGrant>> =
            Arc::new(DefaultGrantStore::<RefreshTokenGrant>::new(
                raw.clone(),
                Arc::new(DefaultHandleGenerationService),
                Arc::new(JsonGrantSerializer),
            ));
        let reference_tokens: Arc<dyn GrantStore<Token>> = Arc::new(DefaultGrantStore::<Token>::new(
            raw,
            Arc::new(DefaultHandleGenerationService),
            Arc::new(JsonGrantSerializer),
        ));
        let events = Arc::new(RecordingEvents::default());
        let generator = DefaultTokenRevocationResponseGenerator {
            refresh_tokens: refresh_tokens.clone(),
            reference_tokens: reference_tokens.clone(),
            events: events.clone(),
        };

        let refresh = refresh_tokens
            .store(&RefreshTokenGrant {
                access_token: token("web"),
                creation_time: Utc::now(),
                lifetime: 3600,
                consumed_time: None,
            })
            .unwrap();
        let reference = reference_tokens.store(&token("web")).unwrap();

        let outcome = generator.process(&request(&refresh, "other", None)).unwrap();
        assert_eq!(outcome, RevocationOutcome::NotFound);
        assert!(refresh_tokens.get(&refresh).is_some());

        let outcome = generator.process(&request(&refresh, "web", None)).unwrap();
        assert_eq!(outcome, RevocationOutcome::RefreshToken);
        assert!(refresh_tokens.get(&refresh).is_none());

        let outcome = generator
            .process(&request(&reference, "web", Some("access_token")))
            .unwrap();
        assert_eq!(outcome, RevocationOutcome::AccessToken);
        assert_eq!(events.0.lock().unwrap().len(), 2);
    }
}
