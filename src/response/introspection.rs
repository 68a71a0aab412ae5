use serde_json::{json, Map, Value};

use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::constants::claim_types;
use crate::protocol::messages::IntrospectionRequest;
use crate::protocol::Validated;

pub trait IntrospectionResponseGenerator: Send + Sync {
    fn process(&self, request: &Validated<IntrospectionRequest>) -> Value;
}

/// RFC 7662 §2.2. Anything without a validated token is `{"active": false}`.
pub struct DefaultIntrospectionResponseGenerator;

impl Component for DefaultIntrospectionResponseGenerator {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(DefaultIntrospectionResponseGenerator => dyn IntrospectionResponseGenerator);

impl IntrospectionResponseGenerator for DefaultIntrospectionResponseGenerator {
    fn process(&self, request: &Validated<IntrospectionRequest>) -> Value {
        let Some(token) = &request.token else {
            return json!({ "active": false });
        };
        let mut body = Map::new();
        body.insert("active".into(), json!(true));
        body.insert(claim_types::ISSUER.into(), json!(token.issuer));
        body.insert(claim_types::CLIENT_ID.into(), json!(token.client_id));
        if let Some(sub) = &token.subject {
            body.insert(claim_types::SUBJECT.into(), json!(sub));
        }
        body.insert(claim_types::SCOPE.into(), json!(request.scopes.join(" ")));
        body.insert(claim_types::ISSUED_AT.into(), json!(token.creation_time.timestamp()));
        body.insert(claim_types::NOT_BEFORE.into(), json!(token.creation_time.timestamp()));
        body.insert(claim_types::EXPIRATION.into(), json!(token.expiration().timestamp()));
        body.insert(claim_types::AUDIENCE.into(), json!(token.audiences));
        body.insert("token_type".into(), json!("access_token"));
        Value::Object(body)
    }
}
