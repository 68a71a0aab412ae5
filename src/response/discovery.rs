//! OpenID Provider metadata (OpenID Connect Discovery 1.0 §3) and the JWK set.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::constants::{
    code_challenge_methods, endpoint_names, grant_types, response_types, route_paths,
};
use crate::services::{KeyMaterialService, SIGNING_ALGORITHM};
use crate::stores::ResourceStore;
use crate::validation::secrets::SecretsListParser;
use crate::validation::ExtensionGrantValidator;

pub trait DiscoveryResponseGenerator: Send + Sync {
    fn create_discovery_document(&self, issuer: &str) -> Value;
    fn create_jwk_document(&self) -> Value;
}

pub struct DefaultDiscoveryResponseGenerator {
    options: Arc<ServerOptions>,
    resources: Arc<dyn ResourceStore>,
    keys: Arc<dyn KeyMaterialService>,
    secret_parsers: Arc<dyn SecretsListParser>,
    extension_grants: Arc<ExtensionGrantValidator>,
}

impl Component for DefaultDiscoveryResponseGenerator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            options: resolver.resolve()?,
            resources: resolver.resolve()?,
            keys: resolver.resolve()?,
            secret_parsers: resolver.resolve()?,
            extension_grants: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultDiscoveryResponseGenerator => dyn DiscoveryResponseGenerator);

impl DefaultDiscoveryResponseGenerator {
    fn endpoint_urls(&self, issuer: &str) -> Map<String, Value> {
        let endpoints = &self.options.endpoints;
        let url = |path: &str| Value::String(format!("{}/{}", issuer, path));
        let mut doc = Map::new();
        let entries = [
            (endpoint_names::AUTHORIZE, "authorization_endpoint", route_paths::AUTHORIZE),
            (endpoint_names::TOKEN, "token_endpoint", route_paths::TOKEN),
            (endpoint_names::USER_INFO, "userinfo_endpoint", route_paths::USER_INFO),
            (endpoint_names::END_SESSION, "end_session_endpoint", route_paths::END_SESSION),
            (endpoint_names::CHECK_SESSION, "check_session_iframe", route_paths::CHECK_SESSION),
            (endpoint_names::REVOCATION, "revocation_endpoint", route_paths::REVOCATION),
            (endpoint_names::INTROSPECTION, "introspection_endpoint", route_paths::INTROSPECTION),
            (
                endpoint_names::DEVICE_AUTHORIZATION,
                "device_authorization_endpoint",
                route_paths::DEVICE_AUTHORIZATION,
            ),
        ];
        for (name, key, path) in entries {
            if endpoints.is_enabled(name) {
                doc.insert(key.into(), url(path));
            }
        }
        if endpoints.is_enabled(endpoint_names::DISCOVERY) {
            doc.insert("jwks_uri".into(), url(route_paths::DISCOVERY_WEB_KEYS));
        }
        doc
    }
}

impl DiscoveryResponseGenerator for DefaultDiscoveryResponseGenerator {
    fn create_discovery_document(&self, issuer: &str) -> Value {
        let mut doc = Map::new();
        doc.insert("issuer".into(), json!(issuer));
        doc.extend(self.endpoint_urls(issuer));

        let resources = self.resources.get_all_resources();
        let mut claims: Vec<String> = resources
            .identity_resources
            .iter()
            .flat_map(|r| r.user_claims.iter().cloned())
            .chain(resources.api_scopes.iter().flat_map(|s| s.user_claims.iter().cloned()))
            .collect();
        claims.sort();
        claims.dedup();
        let mut scopes = resources.scope_names();
        scopes.push(crate::services::resources::OFFLINE_ACCESS_SCOPE.into());

        let mut grants: Vec<String> = [
            grant_types::AUTHORIZATION_CODE,
            grant_types::CLIENT_CREDENTIALS,
            grant_types::REFRESH_TOKEN,
            grant_types::PASSWORD,
            grant_types::DEVICE_CODE,
        ]
        .iter()
        .map(|g| g.to_string())
        .collect();
        grants.extend(self.extension_grants.supported_grant_types());

        doc.insert("scopes_supported".into(), json!(scopes));
        doc.insert("claims_supported".into(), json!(claims));
        doc.insert("grant_types_supported".into(), json!(grants));
        doc.insert("response_types_supported".into(), json!([response_types::CODE]));
        doc.insert("response_modes_supported".into(), json!(["query"]));
        doc.insert("subject_types_supported".into(), json!(["public"]));
        doc.insert(
            "id_token_signing_alg_values_supported".into(),
            json!([SIGNING_ALGORITHM]),
        );
        doc.insert(
            "code_challenge_methods_supported".into(),
            json!([code_challenge_methods::SHA256]),
        );
        doc.insert(
            "token_endpoint_auth_methods_supported".into(),
            json!(self.secret_parsers.available_authentication_methods()),
        );
        if self.options.endpoints.enable_end_session_endpoint {
            doc.insert("backchannel_logout_supported".into(), json!(true));
            doc.insert("backchannel_logout_session_supported".into(), json!(true));
        }
        Value::Object(doc)
    }

    fn create_jwk_document(&self) -> Value {
        json!({ "keys": self.keys.validation_keys() })
    }
}
