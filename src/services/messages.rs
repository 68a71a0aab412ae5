//! Round-tripping interaction messages (logout, error) through the browser.

use std::marker::PhantomData;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::container::{Component, ResolutionError, Resolver, Upcast};
use crate::error::TollgateResult;
use crate::protocol::models::Message;

pub trait MessageStore<T>: Send + Sync {
    /// Returns the id under which the message can be read back.
    fn write(&self, message: Message<T>) -> TollgateResult<String>;
    fn read(&self, id: &str) -> Option<Message<T>>;
    fn delete(&self, id: &str);
}

/// Stateless store: the id *is* the message, serialized and tagged with a
/// per-process key. Nothing is kept server side, so `delete` has nothing to do.
pub struct ProtectedDataMessageStore<T> {
    key: [u8; 32],
    _message: PhantomData<fn() -> T>,
}

impl<T> ProtectedDataMessageStore<T> {
    pub fn new() -> Self {
        Self::with_key(rand::random())
    }

    pub fn with_key(key: [u8; 32]) -> Self {
        Self {
            key,
            _message: PhantomData,
        }
    }

    fn tag(&self, payload: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(payload.as_bytes());
        hasher.finalize().into()
    }
}

impl<T> Default for ProtectedDataMessageStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Component for ProtectedDataMessageStore<T> {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new())
    }
}

impl<T> Upcast<dyn MessageStore<T>> for ProtectedDataMessageStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn upcast(self: Arc<Self>) -> Arc<dyn MessageStore<T>> {
        self
    }
}

impl<T> MessageStore<T> for ProtectedDataMessageStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn write(&self, message: Message<T>) -> TollgateResult<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&message)?);
        let tag = URL_SAFE_NO_PAD.encode(self.tag(&payload));
        Ok(format!("{}.{}", payload, tag))
    }

    fn read(&self, id: &str) -> Option<Message<T>> {
        let (payload, tag) = id.split_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        if !bool::from(self.tag(payload).as_slice().ct_eq(&tag)) {
            log::warn!("message:read tampered id");
            return None;
        }
        let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(message) => Some(message),
            Err(e) => {
                log::warn!("message:read undecodable error={}", e);
                None
            }
        }
    }

    fn delete(&self, _id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{ErrorMessage, LogoutMessage};
    use chrono::Utc;

    #[test]
    fn logout_message_survives_a_round_trip() {
        let store = ProtectedDataMessageStore::<LogoutMessage>::new();
        let message = LogoutMessage {
            client_id: Some("web".into()),
            subject_id: Some("alice".into()),
            ..Default::default()
        };
        let id = store.write(Message::new(message.clone(), Utc::now())).unwrap();
        assert_eq!(store.read(&id).unwrap().data, message);
    }

    #[test]
    fn tampered_ids_are_rejected() {
        let store = ProtectedDataMessageStore::<ErrorMessage>::new();
        let id = store
            .write(Message::new(
                ErrorMessage {
                    error: "access_denied".into(),
                    ..Default::default()
                },
                Utc::now(),
            ))
            .unwrap();

        let (payload, _) = id.split_once('.').unwrap();
        let forged = URL_SAFE_NO_PAD
            .encode(br#"{"data":{"error":"none"},"created":"2020-01-01T00:00:00Z"}"#);
        assert!(store.read(&format!("{}.{}", forged, &id[payload.len() + 1..])).is_none());
        assert!(store.read("garbage").is_none());
    }

    #[test]
    fn other_instances_cannot_read() {
        let writer = ProtectedDataMessageStore::<ErrorMessage>::with_key([1; 32]);
        let reader = ProtectedDataMessageStore::<ErrorMessage>::with_key([2; 32]);
        let id = writer
            .write(Message::new(ErrorMessage::default(), Utc::now()))
            .unwrap();
        assert!(reader.read(&id).is_none());
    }
}
