use std::collections::BTreeMap;
use std::sync::Arc;

use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::constants::claim_types;
use crate::protocol::models::{Client, Principal};
use crate::stores::ResourceStore;

/// User data source for token and userinfo claims.
pub trait ProfileService: Send + Sync {
    /// Claims of `subject` restricted to `requested` claim types.
    fn profile_data(&self, subject: &Principal, requested: &[String]) -> BTreeMap<String, String>;
    /// Whether the user may still receive tokens for `client`.
    fn is_active(&self, subject: &Principal, client: &Client) -> bool;
}

/// Serves claims straight from the authenticated principal.
pub struct DefaultProfileService;

impl ProfileService for DefaultProfileService {
    fn profile_data(&self, subject: &Principal, requested: &[String]) -> BTreeMap<String, String> {
        subject
            .claims
            .iter()
            .filter(|(k, _)| requested.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn is_active(&self, _subject: &Principal, _client: &Client) -> bool {
        true
    }
}

impl Component for DefaultProfileService {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(DefaultProfileService => dyn ProfileService);

/// Decides which claims go into which token.
pub trait ClaimsService: Send + Sync {
    fn access_token_claims(
        &self,
        subject: Option<&Principal>,
        client: &Client,
        scopes: &[String],
    ) -> BTreeMap<String, String>;
    fn identity_token_claims(
        &self,
        subject: &Principal,
        client: &Client,
        scopes: &[String],
    ) -> BTreeMap<String, String>;
}

pub struct DefaultClaimsService {
    profile: Arc<dyn ProfileService>,
    resources: Arc<dyn ResourceStore>,
}

/// Session claims copied from the principal into every user token.
const SESSION_CLAIMS: [&str; 3] = [
    claim_types::IDENTITY_PROVIDER,
    claim_types::AUTHENTICATION_TIME,
    claim_types::AUTHENTICATION_METHOD,
];

impl Component for DefaultClaimsService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            profile: resolver.resolve()?,
            resources: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultClaimsService => dyn ClaimsService);

impl DefaultClaimsService {
    fn session_claims(subject: &Principal) -> BTreeMap<String, String> {
        SESSION_CLAIMS
            .iter()
            .filter_map(|c| subject.claim(c).map(|v| (c.to_string(), v.to_string())))
            .collect()
    }
}

impl ClaimsService for DefaultClaimsService {
    fn access_token_claims(
        &self,
        subject: Option<&Principal>,
        client: &Client,
        scopes: &[String],
    ) -> BTreeMap<String, String> {
        let Some(subject) = subject else {
            return BTreeMap::new();
        };
        if !self.profile.is_active(subject, client) {
            log::warn!("claims:inactive sub={} client={}", subject.subject, client.client_id);
            return BTreeMap::new();
        }
        let requested: Vec<String> = self
            .resources
            .find_api_scopes_by_name(scopes)
            .into_iter()
            .flat_map(|s| s.user_claims)
            .collect();
        let mut claims = Self::session_claims(subject);
        claims.extend(self.profile.profile_data(subject, &requested));
        claims
    }

    fn identity_token_claims(
        &self,
        subject: &Principal,
        client: &Client,
        scopes: &[String],
    ) -> BTreeMap<String, String> {
        if !self.profile.is_active(subject, client) {
            return BTreeMap::new();
        }
        let requested: Vec<String> = self
            .resources
            .find_identity_resources_by_scope(scopes)
            .into_iter()
            .flat_map(|r| r.user_claims)
            .collect();
        let mut claims = Self::session_claims(subject);
        claims.extend(self.profile.profile_data(subject, &requested));
        claims.remove(claim_types::SUBJECT);
        claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{ApiScope, IdentityResource};
    use crate::stores::{InMemoryResourceStore, Resources};

    fn service() -> DefaultClaimsService {
        DefaultClaimsService {
            profile: Arc::new(DefaultProfileService),
            resources: Arc::new(InMemoryResourceStore::new(Resources {
                identity_resources: vec![IdentityResource {
                    name: "profile".into(),
                    user_claims: vec!["name".into()],
                }],
                api_resources: vec![],
                api_scopes: vec![ApiScope {
                    name: "orders".into(),
                    user_claims: vec!["email".into()],
                }],
            })),
        }
    }

    fn alice() -> Principal {
        Principal::new("alice")
            .with_claim("name", "Alice")
            .with_claim("email", "alice@example.com")
            .with_claim("idp", "local")
    }

    #[test]
    fn identity_claims_follow_identity_scopes() {
        let claims =
            service().identity_token_claims(&alice(), &Client::new("web"), &["profile".into()]);
        assert_eq!(claims.get("name").map(String::as_str), Some("Alice"));
        assert_eq!(claims.get("idp").map(String::as_str), Some("local"));
        assert!(!claims.contains_key("email"));
    }

    #[test]
    fn access_claims_follow_api_scopes() {
        let alice = alice();
        let claims =
            service().access_token_claims(Some(&alice), &Client::new("web"), &["orders".into()]);
        assert_eq!(claims.get("email").map(String::as_str), Some("alice@example.com"));
        assert!(!claims.contains_key("name"));
    }

    #[test]
    fn client_only_tokens_carry_no_user_claims() {
        assert!(service()
            .access_token_claims(None, &Client::new("svc"), &["orders".into()])
            .is_empty());
    }
}
