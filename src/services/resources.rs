use std::sync::Arc;

use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::models::Client;
use crate::stores::{ResourceStore, Resources};

pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// A requested scope value, split into its name and optional parameter
/// (`transaction:42` → `transaction`, `42`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScope {
    pub raw: String,
    pub name: String,
    pub parameter: Option<String>,
}

pub trait ScopeParser: Send + Sync {
    fn parse_scope_values(&self, scopes: &[String]) -> Vec<ParsedScope>;
}

/// Scope values are plain names; nothing is parameterized.
pub struct DefaultScopeParser;

impl ScopeParser for DefaultScopeParser {
    fn parse_scope_values(&self, scopes: &[String]) -> Vec<ParsedScope> {
        scopes
            .iter()
            .map(|s| ParsedScope {
                raw: s.clone(),
                name: s.clone(),
                parameter: None,
            })
            .collect()
    }
}

impl Component for DefaultScopeParser {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(DefaultScopeParser => dyn ScopeParser);

#[derive(Debug, Clone, Default)]
pub struct ResourceValidationResult {
    pub resources: Resources,
    pub scopes: Vec<String>,
    pub offline_access: bool,
    pub invalid_scopes: Vec<String>,
}

impl ResourceValidationResult {
    pub fn succeeded(&self) -> bool {
        self.invalid_scopes.is_empty()
    }
}

/// Checks requested scopes against the client's allowances and the known
/// resources.
pub trait ResourceValidator: Send + Sync {
    fn validate_requested_resources(
        &self,
        client: &Client,
        scopes: &[String],
    ) -> ResourceValidationResult;
}

pub struct DefaultResourceValidator {
    parser: Arc<dyn ScopeParser>,
    store: Arc<dyn ResourceStore>,
}

impl DefaultResourceValidator {
    pub fn new(parser: Arc<dyn ScopeParser>, store: Arc<dyn ResourceStore>) -> Self {
        Self { parser, store }
    }
}

impl Component for DefaultResourceValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            parser: resolver.resolve()?,
            store: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultResourceValidator => dyn ResourceValidator);

impl ResourceValidator for DefaultResourceValidator {
    fn validate_requested_resources(
        &self,
        client: &Client,
        scopes: &[String],
    ) -> ResourceValidationResult {
        let mut result = ResourceValidationResult::default();

        for parsed in self.parser.parse_scope_values(scopes) {
            if parsed.name == OFFLINE_ACCESS_SCOPE {
                if client.allow_offline_access {
                    result.offline_access = true;
                    result.scopes.push(parsed.raw);
                } else {
                    result.invalid_scopes.push(parsed.raw);
                }
                continue;
            }
            if !client.allowed_scopes.contains(&parsed.name) {
                result.invalid_scopes.push(parsed.raw);
                continue;
            }

            let name = std::slice::from_ref(&parsed.name);
            let identity = self.store.find_identity_resources_by_scope(name);
            let api_scopes = self.store.find_api_scopes_by_name(name);
            if identity.is_empty() && api_scopes.is_empty() {
                result.invalid_scopes.push(parsed.raw);
                continue;
            }

            result.resources.identity_resources.extend(identity);
            if !api_scopes.is_empty() {
                for api in self.store.find_api_resources_by_scope(name) {
                    if !result.resources.api_resources.iter().any(|a| a.name == api.name) {
                        result.resources.api_resources.push(api);
                    }
                }
                result.resources.api_scopes.extend(api_scopes);
            }
            result.scopes.push(parsed.raw);
        }

        if !result.succeeded() {
            log::debug!(
                "resources:validate client={} invalid={}",
                client.client_id,
                result.invalid_scopes.join(" ")
            );
        }
        result
    }
}
