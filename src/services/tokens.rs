//! Token minting: building [`Token`]s, serializing them as signed JWTs or
//! reference handles, and refresh token bookkeeping.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Map, Value};

use super::{
    ClaimsService, Clock, GrantStore, KeyMaterialService, ProfileService, SigningCredential,
};
use crate::container::{Component, ResolutionError, Resolver};
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::claim_types;
use crate::protocol::models::{AccessTokenType, Client, Principal, RefreshTokenGrant, Token};
use crate::protocol::ProtocolError;
use crate::stores::ResourceStore;

pub const IDENTITY_TOKEN_LIFETIME: u64 = 300;

/// Inputs for minting tokens for one client.
#[derive(Debug, Clone)]
pub struct TokenCreationRequest {
    pub issuer: String,
    pub client: Client,
    pub subject: Option<Principal>,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
}

// ---------------------------------------------------------------------------
// JWS helpers
// ---------------------------------------------------------------------------

/// Sign `payload` as a compact JWS.
pub fn encode_jws(credential: &SigningCredential, payload: &Value) -> TollgateResult<String> {
    let header = json!({
        "alg": credential.algorithm(),
        "kid": credential.key_id(),
        "typ": "JWT",
    });
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?)
    );
    let signature = credential.sign(signing_input.as_bytes());
    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}

/// Split and verify a compact JWS. Returns the payload if the signature checks
/// out against one of the validation keys.
pub fn decode_jws(keys: &dyn KeyMaterialService, jwt: &str) -> Option<Value> {
    let mut parts = jwt.split('.');
    let (header, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let header: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).ok()?).ok()?;
    let kid = header.get("kid")?.as_str()?;
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    let signing_input = &jwt[..jwt.rfind('.')?];
    if !keys.verify(kid, signing_input.as_bytes(), &signature) {
        return None;
    }
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()
}

// ---------------------------------------------------------------------------
// Token creation (serialization)
// ---------------------------------------------------------------------------

/// Turns a [`Token`] into its wire form.
pub trait TokenCreationService: Send + Sync {
    fn create_token(&self, token: &Token) -> TollgateResult<String>;
}

/// Compact JWS signed with the current signing credential.
pub struct DefaultTokenCreationService {
    keys: Arc<dyn KeyMaterialService>,
}

impl DefaultTokenCreationService {
    pub fn new(keys: Arc<dyn KeyMaterialService>) -> Self {
        Self { keys }
    }

    fn payload(token: &Token) -> Value {
        let mut payload = Map::new();
        payload.insert(claim_types::ISSUER.into(), json!(token.issuer));
        match token.audiences.as_slice() {
            [] => {}
            [single] => {
                payload.insert(claim_types::AUDIENCE.into(), json!(single));
            }
            many => {
                payload.insert(claim_types::AUDIENCE.into(), json!(many));
            }
        }
        let issued_at = token.creation_time.timestamp();
        payload.insert(claim_types::ISSUED_AT.into(), json!(issued_at));
        payload.insert(claim_types::NOT_BEFORE.into(), json!(issued_at));
        payload.insert(
            claim_types::EXPIRATION.into(),
            json!(token.expiration().timestamp()),
        );
        payload.insert(claim_types::CLIENT_ID.into(), json!(token.client_id));
        if let Some(sub) = &token.subject {
            payload.insert(claim_types::SUBJECT.into(), json!(sub));
        }
        if let Some(sid) = &token.session_id {
            payload.insert(claim_types::SESSION_ID.into(), json!(sid));
        }
        if !token.scopes.is_empty() {
            payload.insert(claim_types::SCOPE.into(), json!(token.scopes));
        }
        for (k, v) in &token.claims {
            payload.entry(k.clone()).or_insert_with(|| json!(v));
        }
        Value::Object(payload)
    }
}

impl Component for DefaultTokenCreationService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?))
    }
}

crate::provides!(DefaultTokenCreationService => dyn TokenCreationService);

impl TokenCreationService for DefaultTokenCreationService {
    fn create_token(&self, token: &Token) -> TollgateResult<String> {
        let credential = self
            .keys
            .signing_credential()
            .ok_or_else(|| TollgateError::Other("no signing credential registered".into()))?;
        encode_jws(&credential, &Self::payload(token))
    }
}

// ---------------------------------------------------------------------------
// Token service
// ---------------------------------------------------------------------------

pub trait TokenService: Send + Sync {
    fn create_access_token(&self, request: &TokenCreationRequest) -> TollgateResult<Token>;
    fn create_identity_token(&self, request: &TokenCreationRequest) -> TollgateResult<Token>;
    /// JWT or reference handle, according to the token's type.
    fn create_security_token(&self, token: &Token) -> TollgateResult<String>;
}

pub struct DefaultTokenService {
    claims: Arc<dyn ClaimsService>,
    creation: Arc<dyn TokenCreationService>,
    reference_tokens: Arc<dyn GrantStore<Token>>,
    resources: Arc<dyn ResourceStore>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultTokenService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            claims: resolver.resolve()?,
            creation: resolver.resolve()?,
            reference_tokens: resolver.resolve()?,
            resources: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultTokenService => dyn TokenService);

impl TokenService for DefaultTokenService {
    fn create_access_token(&self, request: &TokenCreationRequest) -> TollgateResult<Token> {
        let mut audiences: Vec<String> = self
            .resources
            .find_api_resources_by_scope(&request.scopes)
            .into_iter()
            .map(|r| r.name)
            .collect();
        if audiences.is_empty() {
            audiences.push(format!("{}/resources", request.issuer));
        }
        Ok(Token {
            issuer: request.issuer.clone(),
            audiences,
            client_id: request.client.client_id.clone(),
            subject: request.subject.as_ref().map(|s| s.subject.clone()),
            session_id: request
                .subject
                .as_ref()
                .and_then(|s| s.session_id())
                .map(str::to_string),
            scopes: request.scopes.clone(),
            creation_time: self.clock.now(),
            lifetime: request.client.access_token_lifetime,
            access_token_type: request.client.access_token_type,
            claims: self.claims.access_token_claims(
                request.subject.as_ref(),
                &request.client,
                &request.scopes,
            ),
        })
    }

    fn create_identity_token(&self, request: &TokenCreationRequest) -> TollgateResult<Token> {
        let subject = request
            .subject
            .as_ref()
            .ok_or_else(|| TollgateError::Other("identity token requires a subject".into()))?;
        let mut claims = self
            .claims
            .identity_token_claims(subject, &request.client, &request.scopes);
        if let Some(nonce) = &request.nonce {
            claims.insert("nonce".into(), nonce.clone());
        }
        Ok(Token {
            issuer: request.issuer.clone(),
            audiences: vec![request.client.client_id.clone()],
            client_id: request.client.client_id.clone(),
            subject: Some(subject.subject.clone()),
            session_id: subject.session_id().map(str::to_string),
            scopes: Vec::new(),
            creation_time: self.clock.now(),
            lifetime: IDENTITY_TOKEN_LIFETIME,
            access_token_type: AccessTokenType::Jwt,
            claims,
        })
    }

    fn create_security_token(&self, token: &Token) -> TollgateResult<String> {
        match token.access_token_type {
            AccessTokenType::Jwt => self.creation.create_token(token),
            AccessTokenType::Reference => self.reference_tokens.store(token),
        }
    }
}

// ---------------------------------------------------------------------------
// Refresh tokens
// ---------------------------------------------------------------------------

pub trait RefreshTokenService: Send + Sync {
    fn create_refresh_token(&self, access_token: &Token, client: &Client) -> TollgateResult<String>;
    /// Look up and check a presented refresh token.
    fn validate_refresh_token(
        &self,
        handle: &str,
        client: &Client,
    ) -> Result<RefreshTokenGrant, ProtocolError>;
    /// Rotate: consume `handle` and issue a new one carrying `access_token`.
    fn update_refresh_token(
        &self,
        handle: &str,
        access_token: &Token,
        client: &Client,
    ) -> TollgateResult<String>;
}

pub struct DefaultRefreshTokenService {
    store: Arc<dyn GrantStore<RefreshTokenGrant>>,
    profile: Arc<dyn ProfileService>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultRefreshTokenService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            store: resolver.resolve()?,
            profile: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultRefreshTokenService => dyn RefreshTokenService);

impl RefreshTokenService for DefaultRefreshTokenService {
    fn create_refresh_token(
        &self,
        access_token: &Token,
        client: &Client,
    ) -> TollgateResult<String> {
        self.store.store(&RefreshTokenGrant {
            access_token: access_token.clone(),
            creation_time: self.clock.now(),
            lifetime: client.refresh_token_lifetime,
            consumed_time: None,
        })
    }

    fn validate_refresh_token(
        &self,
        handle: &str,
        client: &Client,
    ) -> Result<RefreshTokenGrant, ProtocolError> {
        let grant = self
            .store
            .get(handle)
            .ok_or_else(|| ProtocolError::invalid_grant("unknown refresh token"))?;
        if grant.access_token.client_id != client.client_id {
            log::warn!(
                "refresh:validate client_mismatch expected={} got={}",
                grant.access_token.client_id,
                client.client_id
            );
            return Err(ProtocolError::invalid_grant("refresh token issued to another client"));
        }
        if grant.consumed_time.is_some() {
            return Err(ProtocolError::invalid_grant("refresh token already used"));
        }
        if let Some(sub) = &grant.access_token.subject {
            let subject = Principal::new(sub);
            if !self.profile.is_active(&subject, client) {
                return Err(ProtocolError::invalid_grant("user is not active"));
            }
        }
        Ok(grant)
    }

    fn update_refresh_token(
        &self,
        handle: &str,
        access_token: &Token,
        client: &Client,
    ) -> TollgateResult<String> {
        self.store.remove(handle);
        self.create_refresh_token(access_token, client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        DefaultGrantStore, DefaultHandleGenerationService, DefaultKeyMaterialService,
        DefaultProfileService, DevelopmentSigningCredentialStore, JsonGrantSerializer,
        SigningCredential, SystemClock,
    };
    use crate::stores::{InMemoryPersistedGrantStore, PersistedGrantStore};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn keys() -> Arc<dyn KeyMaterialService> {
        Arc::new(DefaultKeyMaterialService::new(vec![Arc::new(
            DevelopmentSigningCredentialStore::new(SigningCredential::generate()),
        )]))
    }

    fn token(client_id: &str) -> Token {
        Token {
            issuer: "https://login.example.com".into(),
            audiences: vec!["orders".into()],
            client_id: client_id.into(),
            subject: Some("alice".into()),
            session_id: Some("S1".into()),
            scopes: vec!["orders".into()],
            creation_time: Utc::now(),
            lifetime: 3600,
            access_token_type: AccessTokenType::Jwt,
            claims: BTreeMap::from([("idp".to_string(), "local".to_string())]),
        }
    }

    #[test]
    fn jwt_roundtrips_through_validation_keys() {
        let keys = keys();
        let creation = DefaultTokenCreationService::new(keys.clone());
        let jwt = creation.create_token(&token("web")).unwrap();
        assert_eq!(jwt.split('.').count(), 3);

        let payload = decode_jws(keys.as_ref(), &jwt).unwrap();
        assert_eq!(payload["iss"], "https://login.example.com");
        assert_eq!(payload["aud"], "orders");
        assert_eq!(payload["client_id"], "web");
        assert_eq!(payload["sub"], "alice");
        assert_eq!(payload["sid"], "S1");
        assert_eq!(payload["idp"], "local");
        assert_eq!(payload["scope"], json!(["orders"]));
    }

    #[test]
    fn tampered_jwt_is_rejected() {
        let keys = keys();
        let jwt = DefaultTokenCreationService::new(keys.clone())
            .create_token(&token("web"))
            .unwrap();
        let mut parts: Vec<&str> = jwt.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"mallory"}"#);
        parts[1] = &forged;
        assert!(decode_jws(keys.as_ref(), &parts.join(".")).is_none());
        assert!(decode_jws(keys.as_ref(), "not-a-jwt").is_none());
    }

    #[test]
    fn missing_signing_key_is_an_error() {
        let creation =
            DefaultTokenCreationService::new(Arc::new(DefaultKeyMaterialService::new(vec![])));
        assert!(creation.create_token(&token("web")).is_err());
    }

    fn refresh_service() -> DefaultRefreshTokenService {
        let raw: Arc<dyn PersistedGrantStore> = Arc::new(InMemoryPersistedGrantStore::new());
        DefaultRefreshTokenService {
            store: Arc::new(DefaultGrantStore::<RefreshTokenGrant>::new(
                raw,
                Arc::new(DefaultHandleGenerationService),
                Arc::new(JsonGrantSerializer),
            )),
            profile: Arc::new(DefaultProfileService),
            clock: Arc::new(SystemClock),
        }
    }

    #[test]
    fn refresh_token_rotation() {
        let service = refresh_service();
        let client = Client::new("web");
        let first = service.create_refresh_token(&token("web"), &client).unwrap();
        assert!(service.validate_refresh_token(&first, &client).is_ok());

        let second = service
            .update_refresh_token(&first, &token("web"), &client)
            .unwrap();
        assert_ne!(first, second);
        assert!(service.validate_refresh_token(&first, &client).is_err());
        assert!(service.validate_refresh_token(&second, &client).is_ok());
    }

    #[test]
    fn refresh_token_bound_to_client() {
        let service = refresh_service();
        let handle = service
            .create_refresh_token(&token("web"), &Client::new("web"))
            .unwrap();
        let err = service
            .validate_refresh_token(&handle, &Client::new("other"))
            .unwrap_err();
        assert_eq!(err.error, "invalid_grant");
    }
}
