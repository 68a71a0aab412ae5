use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::container::{Component, ResolutionError, Resolver};

pub const SIGNING_ALGORITHM: &str = "EdDSA";

/// Public half of a signing key as published at the JWKS endpoint (RFC 8037).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
}

/// An Ed25519 key pair with its key id.
pub struct SigningCredential {
    key_id: String,
    key: SigningKey,
}

impl SigningCredential {
    pub fn new(key: SigningKey) -> Self {
        let public = key.verifying_key();
        let digest = Sha256::digest(public.as_bytes());
        let key_id = URL_SAFE_NO_PAD.encode(&digest[..12]);
        Self { key_id, key }
    }

    /// Fresh random key.
    pub fn generate() -> Self {
        let secret: [u8; 32] = rand::random();
        Self::new(SigningKey::from_bytes(&secret))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> &'static str {
        SIGNING_ALGORITHM
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_bytes().to_vec()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn jwk(&self) -> JsonWebKey {
        JsonWebKey {
            kty: "OKP".into(),
            crv: "Ed25519".into(),
            x: URL_SAFE_NO_PAD.encode(self.verifying_key().as_bytes()),
            kid: self.key_id.clone(),
            alg: SIGNING_ALGORITHM.into(),
            key_use: "sig".into(),
        }
    }
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

pub trait SigningCredentialStore: Send + Sync {
    fn signing_credential(&self) -> Arc<SigningCredential>;
}

/// Key generated at startup and kept only in memory. Every restart rotates it,
/// invalidating all issued tokens.
pub struct DevelopmentSigningCredentialStore {
    credential: Arc<SigningCredential>,
}

impl DevelopmentSigningCredentialStore {
    pub fn new(credential: SigningCredential) -> Self {
        Self {
            credential: Arc::new(credential),
        }
    }
}

impl Component for DevelopmentSigningCredentialStore {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let credential = SigningCredential::generate();
        log::warn!(
            "keys:developer_credential kid={} persisted=false (not for production use)",
            credential.key_id()
        );
        Ok(Self::new(credential))
    }
}

crate::provides!(DevelopmentSigningCredentialStore => dyn SigningCredentialStore);

impl SigningCredentialStore for DevelopmentSigningCredentialStore {
    fn signing_credential(&self) -> Arc<SigningCredential> {
        self.credential.clone()
    }
}

// ---------------------------------------------------------------------------
// Key material service
// ---------------------------------------------------------------------------

/// Single access point for signing and validation keys.
pub trait KeyMaterialService: Send + Sync {
    /// Key used for new signatures. `None` when no credential store is registered.
    fn signing_credential(&self) -> Option<Arc<SigningCredential>>;
    fn validation_keys(&self) -> Vec<JsonWebKey>;
    /// Check `signature` over `message` against the key named `key_id`.
    fn verify(&self, key_id: &str, message: &[u8], signature: &[u8]) -> bool;
}

pub struct DefaultKeyMaterialService {
    credentials: Vec<Arc<SigningCredential>>,
}

impl DefaultKeyMaterialService {
    pub fn new(stores: Vec<Arc<dyn SigningCredentialStore>>) -> Self {
        Self {
            credentials: stores.iter().map(|s| s.signing_credential()).collect(),
        }
    }
}

impl Component for DefaultKeyMaterialService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve_all()?))
    }
}

crate::provides!(DefaultKeyMaterialService => dyn KeyMaterialService);

impl KeyMaterialService for DefaultKeyMaterialService {
    fn signing_credential(&self) -> Option<Arc<SigningCredential>> {
        // The most recently registered store signs.
        self.credentials.last().cloned()
    }

    fn validation_keys(&self) -> Vec<JsonWebKey> {
        self.credentials.iter().map(|c| c.jwk()).collect()
    }

    fn verify(&self, key_id: &str, message: &[u8], signature: &[u8]) -> bool {
        let Some(credential) = self.credentials.iter().find(|c| c.key_id() == key_id) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        credential.verifying_key().verify(message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let service = DefaultKeyMaterialService::new(vec![Arc::new(
            DevelopmentSigningCredentialStore::new(SigningCredential::generate()),
        )]);
        let credential = service.signing_credential().unwrap();
        let signature = credential.sign(b"payload");

        assert!(service.verify(credential.key_id(), b"payload", &signature));
        assert!(!service.verify(credential.key_id(), b"tampered", &signature));
        assert!(!service.verify("unknown-kid", b"payload", &signature));
    }

    #[test]
    fn last_store_signs_and_all_keys_validate() {
        let first = SigningCredential::generate();
        let second = SigningCredential::generate();
        let second_kid = second.key_id().to_string();
        let service = DefaultKeyMaterialService::new(vec![
            Arc::new(DevelopmentSigningCredentialStore::new(first)),
            Arc::new(DevelopmentSigningCredentialStore::new(second)),
        ]);
        assert_eq!(service.signing_credential().unwrap().key_id(), second_kid);
        assert_eq!(service.validation_keys().len(), 2);
    }

    #[test]
    fn jwk_shape() {
        let jwk = SigningCredential::generate().jwk();
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv, "Ed25519");
        assert_eq!(jwk.alg, "EdDSA");
        assert_eq!(URL_SAFE_NO_PAD.decode(&jwk.x).unwrap().len(), 32);
        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["use"], "sig");
    }

    #[test]
    fn no_store_means_no_signing_key() {
        let service = DefaultKeyMaterialService::new(vec![]);
        assert!(service.signing_credential().is_none());
        assert!(service.validation_keys().is_empty());
    }
}
