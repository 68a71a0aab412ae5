use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::tokens::encode_jws;
use super::{Clock, KeyMaterialService};
use crate::container::{Component, ResolutionError, Resolver};
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::claim_types;

/// Issues ad-hoc signed JWTs with the server's own signing key, for
/// server-to-server calls such as back-channel logout.
pub struct ServerTools {
    keys: Arc<dyn KeyMaterialService>,
    clock: Arc<dyn Clock>,
}

impl ServerTools {
    pub fn new(keys: Arc<dyn KeyMaterialService>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    /// Sign `claims`, adding `iat`, `nbf` and `exp` from the clock.
    pub fn issue_jwt(
        &self,
        lifetime_secs: i64,
        mut claims: Map<String, Value>,
    ) -> TollgateResult<String> {
        let credential = self
            .keys
            .signing_credential()
            .ok_or_else(|| TollgateError::Other("no signing credential registered".into()))?;
        let now = self.clock.now().timestamp();
        claims.insert(claim_types::ISSUED_AT.into(), json!(now));
        claims.insert(claim_types::NOT_BEFORE.into(), json!(now));
        claims.insert(claim_types::EXPIRATION.into(), json!(now + lifetime_secs));
        encode_jws(&credential, &Value::Object(claims))
    }

    pub fn issue_client_jwt(
        &self,
        issuer: &str,
        client_id: &str,
        lifetime_secs: i64,
        scopes: &[String],
        audiences: &[String],
    ) -> TollgateResult<String> {
        let mut claims = Map::new();
        claims.insert(claim_types::ISSUER.into(), json!(issuer));
        claims.insert(claim_types::CLIENT_ID.into(), json!(client_id));
        if !scopes.is_empty() {
            claims.insert(claim_types::SCOPE.into(), json!(scopes));
        }
        if !audiences.is_empty() {
            claims.insert(claim_types::AUDIENCE.into(), json!(audiences));
        }
        self.issue_jwt(lifetime_secs, claims)
    }
}

impl Component for ServerTools {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?, resolver.resolve()?))
    }
}
