use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::constants::{claim_types, persisted_grant_types, secret_types};

// ---------------------------------------------------------------------------
// Configuration models (clients and resources)
// ---------------------------------------------------------------------------

/// A client secret. `value` holds base64(sha256(secret)) for shared secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub value: String,
    #[serde(default = "default_secret_type")]
    pub secret_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

fn default_secret_type() -> String {
    secret_types::SHARED_SECRET.to_string()
}

impl Secret {
    /// A shared secret from its plaintext value.
    pub fn shared(plaintext: &str) -> Self {
        Self {
            value: crate::validation::secrets::hash_secret(plaintext),
            secret_type: default_secret_type(),
            expiration: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|e| e <= now)
    }
}

/// A registered client application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    #[serde(default)]
    pub client_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub client_secrets: Vec<Secret>,
    #[serde(default = "default_true")]
    pub require_client_secret: bool,
    #[serde(default)]
    pub allowed_grant_types: Vec<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    #[serde(default)]
    pub allowed_cors_origins: Vec<String>,
    #[serde(default)]
    pub require_consent: bool,
    #[serde(default = "default_true")]
    pub require_pkce: bool,
    #[serde(default)]
    pub allow_offline_access: bool,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: u64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: u64,
    #[serde(default)]
    pub access_token_type: AccessTokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_channel_logout_uri: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Longest lifetime, in seconds, accepted from configuration (a century).
pub const MAX_LIFETIME_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// `secs` as a chrono duration. `None` past what chrono can represent.
pub fn lifetime_duration(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// `start + secs`, or `None` if the instant is out of range.
pub fn expires_at(start: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    start.checked_add_signed(lifetime_duration(secs)?)
}

fn default_access_token_lifetime() -> u64 {
    3600
}

fn default_refresh_token_lifetime() -> u64 {
    30 * 24 * 3600
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTokenType {
    #[default]
    Jwt,
    Reference,
}

impl Client {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_name: client_id.to_string(),
            enabled: true,
            client_secrets: Vec::new(),
            require_client_secret: true,
            allowed_grant_types: Vec::new(),
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            allowed_scopes: Vec::new(),
            allowed_cors_origins: Vec::new(),
            require_consent: false,
            require_pkce: true,
            allow_offline_access: false,
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
            access_token_type: AccessTokenType::Jwt,
            back_channel_logout_uri: None,
        }
    }

    pub fn allows_grant_type(&self, grant_type: &str) -> bool {
        self.allowed_grant_types.iter().any(|g| g == grant_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityResource {
    pub name: String,
    #[serde(default)]
    pub user_claims: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiScope {
    pub name: String,
    #[serde(default)]
    pub user_claims: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResource {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub api_secrets: Vec<Secret>,
}

// ---------------------------------------------------------------------------
// Runtime models
// ---------------------------------------------------------------------------

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl Principal {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            claims: BTreeMap::new(),
        }
    }

    pub fn with_claim(mut self, claim_type: &str, value: impl Into<String>) -> Self {
        self.claims.insert(claim_type.to_string(), value.into());
        self
    }

    pub fn claim(&self, claim_type: &str) -> Option<&str> {
        self.claims.get(claim_type).map(|s| s.as_str())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.claim(claim_types::SESSION_ID)
    }
}

/// A token before it is serialized (signed JWT) or stored (reference handle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub issuer: String,
    pub audiences: Vec<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub scopes: Vec<String>,
    pub creation_time: DateTime<Utc>,
    pub lifetime: u64,
    pub access_token_type: AccessTokenType,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl Token {
    /// A lifetime too large to represent counts as already expired.
    pub fn expiration(&self) -> DateTime<Utc> {
        expires_at(self.creation_time, self.lifetime).unwrap_or(self.creation_time)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration() <= now
    }
}

// ---------------------------------------------------------------------------
// Persisted grants
// ---------------------------------------------------------------------------

/// Serialized grant as handed to the persisted grant store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedGrant {
    pub key: String,
    pub grant_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub client_id: String,
    pub creation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    pub data: String,
}

/// Filter for bulk grant lookups and removal.
#[derive(Debug, Clone, Default)]
pub struct PersistedGrantFilter {
    pub subject_id: Option<String>,
    pub session_id: Option<String>,
    pub client_id: Option<String>,
    pub grant_type: Option<String>,
}

impl PersistedGrantFilter {
    pub fn matches(&self, grant: &PersistedGrant) -> bool {
        let subject_ok = self
            .subject_id
            .as_ref()
            .map_or(true, |s| grant.subject_id.as_ref() == Some(s));
        let session_ok = self
            .session_id
            .as_ref()
            .map_or(true, |s| grant.session_id.as_ref() == Some(s));
        let client_ok = self.client_id.as_ref().map_or(true, |c| &grant.client_id == c);
        let type_ok = self.grant_type.as_ref().map_or(true, |t| &grant.grant_type == t);
        subject_ok && session_ok && client_ok && type_ok
    }

    pub fn is_empty(&self) -> bool {
        self.subject_id.is_none()
            && self.session_id.is_none()
            && self.client_id.is_none()
            && self.grant_type.is_none()
    }
}

/// Something stored through the persisted grant store under a grant type.
pub trait GrantItem: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const GRANT_TYPE: &'static str;

    fn client_id(&self) -> &str;
    fn subject_id(&self) -> Option<&str>;
    fn session_id(&self) -> Option<&str>;
    fn creation_time(&self) -> DateTime<Utc>;
    fn expiration(&self) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub client_id: String,
    pub subject: Principal,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub creation_time: DateTime<Utc>,
    pub lifetime: u64,
}

impl GrantItem for AuthorizationCode {
    const GRANT_TYPE: &'static str = persisted_grant_types::AUTHORIZATION_CODE;

    fn client_id(&self) -> &str {
        &self.client_id
    }
    fn subject_id(&self) -> Option<&str> {
        Some(&self.subject.subject)
    }
    fn session_id(&self) -> Option<&str> {
        self.subject.session_id()
    }
    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }
    fn expiration(&self) -> Option<DateTime<Utc>> {
        Some(expires_at(self.creation_time, self.lifetime).unwrap_or(self.creation_time))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenGrant {
    pub access_token: Token,
    pub creation_time: DateTime<Utc>,
    pub lifetime: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_time: Option<DateTime<Utc>>,
}

impl GrantItem for RefreshTokenGrant {
    const GRANT_TYPE: &'static str = persisted_grant_types::REFRESH_TOKEN;

    fn client_id(&self) -> &str {
        &self.access_token.client_id
    }
    fn subject_id(&self) -> Option<&str> {
        self.access_token.subject.as_deref()
    }
    fn session_id(&self) -> Option<&str> {
        self.access_token.session_id.as_deref()
    }
    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }
    fn expiration(&self) -> Option<DateTime<Utc>> {
        Some(expires_at(self.creation_time, self.lifetime).unwrap_or(self.creation_time))
    }
}

impl GrantItem for Token {
    const GRANT_TYPE: &'static str = persisted_grant_types::REFERENCE_TOKEN;

    fn client_id(&self) -> &str {
        &self.client_id
    }
    fn subject_id(&self) -> Option<&str> {
        self.subject.as_deref()
    }
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }
    fn expiration(&self) -> Option<DateTime<Utc>> {
        Some(self.expiration())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub subject_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub creation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl GrantItem for Consent {
    const GRANT_TYPE: &'static str = persisted_grant_types::USER_CONSENT;

    fn client_id(&self) -> &str {
        &self.client_id
    }
    fn subject_id(&self) -> Option<&str> {
        Some(&self.subject_id)
    }
    fn session_id(&self) -> Option<&str> {
        None
    }
    fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }
    fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }
}

/// Pending or approved device authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCode {
    pub client_id: String,
    pub user_code: String,
    pub scopes: Vec<String>,
    pub creation_time: DateTime<Utc>,
    pub lifetime: u64,
    #[serde(default)]
    pub is_authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Principal>,
}

impl DeviceCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        expires_at(self.creation_time, self.lifetime).map_or(true, |expiry| expiry <= now)
    }
}

// ---------------------------------------------------------------------------
// Interaction messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_logout_redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub client_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Who to notify when a user session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutNotificationContext {
    pub subject_id: String,
    pub session_id: String,
    pub client_ids: Vec<String>,
}

/// Wrapper stored by message stores: payload plus creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    pub data: T,
    pub created: DateTime<Utc>,
}

impl<T> Message<T> {
    pub fn new(data: T, created: DateTime<Utc>) -> Self {
        Self { data, created }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token(lifetime: u64) -> Token {
        Token {
            issuer: "https://login.example.com".into(),
            audiences: vec![],
            client_id: "svc".into(),
            subject: None,
            session_id: None,
            scopes: vec![],
            creation_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            lifetime,
            access_token_type: AccessTokenType::Jwt,
            claims: BTreeMap::new(),
        }
    }

    #[test]
    fn lifetime_beyond_chrono_range_is_none() {
        assert_eq!(lifetime_duration(60), Some(Duration::seconds(60)));
        assert!(lifetime_duration(10_000_000_000_000_000).is_none());
        assert!(lifetime_duration(u64::MAX).is_none());
    }

    #[test]
    fn overflowing_token_lifetime_is_already_expired() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        assert!(!token(3600).is_expired(now));
        assert!(token(u64::MAX).is_expired(now));
        assert!(token(MAX_LIFETIME_SECS * 1_000_000).is_expired(now));
    }
}
