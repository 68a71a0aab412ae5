use std::sync::Arc;

use serde_json::{Map, Value};

use crate::container::{Component, ResolutionError, Resolver};
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::claim_types;
use crate::protocol::messages::UserInfoRequest;
use crate::protocol::models::Principal;
use crate::protocol::Validated;
use crate::services::ProfileService;
use crate::stores::ResourceStore;

pub trait UserInfoResponseGenerator: Send + Sync {
    fn process(&self, request: &Validated<UserInfoRequest>) -> TollgateResult<Value>;
}

/// Claims of the identity resources the access token was granted, plus `sub`.
pub struct DefaultUserInfoResponseGenerator {
    profile: Arc<dyn ProfileService>,
    resources: Arc<dyn ResourceStore>,
}

impl Component for DefaultUserInfoResponseGenerator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            profile: resolver.resolve()?,
            resources: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultUserInfoResponseGenerator => dyn UserInfoResponseGenerator);

impl UserInfoResponseGenerator for DefaultUserInfoResponseGenerator {
    fn process(&self, request: &Validated<UserInfoRequest>) -> TollgateResult<Value> {
        let (token, subject) = match (&request.token, &request.subject) {
            (Some(token), Some(subject)) => (token, subject),
            _ => return Err(TollgateError::Other("userinfo request carries no user".into())),
        };
        let requested: Vec<String> = self
            .resources
            .find_identity_resources_by_scope(&token.scopes)
            .into_iter()
            .flat_map(|r| r.user_claims)
            .collect();

        let principal = Principal {
            subject: subject.subject.clone(),
            claims: token.claims.clone(),
        };
        let mut body = Map::new();
        for (claim, value) in self.profile.profile_data(&principal, &requested) {
            body.insert(claim, Value::String(value));
        }
        body.insert(claim_types::SUBJECT.into(), Value::String(subject.subject.clone()));
        log::debug!("userinfo:claims sub={} count={}", subject.subject, body.len());
        Ok(Value::Object(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::IdentityResource;
    use crate::protocol::Token;
    use crate::services::DefaultProfileService;
    use crate::stores::{InMemoryResourceStore, Resources};
    use chrono::Utc;

    #[test]
    fn claims_follow_granted_identity_scopes() {
        let generator = DefaultUserInfoResponseGenerator {
            profile: Arc::new(DefaultProfileService),
            resources: Arc::new(InMemoryResourceStore::new(Resources {
                identity_resources: vec![
                    IdentityResource {
                        name: "openid".into(),
                        user_claims: vec!["sub".into()],
                    },
                    IdentityResource {
                        name: "profile".into(),
                        user_claims: vec!["name".into()],
                    },
                ],
                ..Default::default()
            })),
        };
        let token = Token {
            issuer: "https://id".into(),
            audiences: vec![],
            client_id: "web".into(),
            subject: Some("alice".into()),
            session_id: None,
            scopes: vec!["openid".into()],
            creation_time: Utc::now(),
            lifetime: 60,
            access_token_type: Default::default(),
            claims: [("name".to_string(), "Alice".to_string())].into_iter().collect(),
        };
        let mut request = Validated::new(UserInfoRequest::default())
            .with_subject(Principal::new("alice"))
            .with_token(token);

        let body = generator.process(&request).unwrap();
        assert_eq!(body, serde_json::json!({ "sub": "alice" }));

        if let Some(token) = request.token.as_mut() {
            token.scopes.push("profile".into());
        }
        let body = generator.process(&request).unwrap();
        assert_eq!(body, serde_json::json!({ "sub": "alice", "name": "Alice" }));
    }
}
