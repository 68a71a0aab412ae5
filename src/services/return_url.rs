use std::sync::Arc;

use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::parse_urlencoded;
use crate::protocol::constants::{ensure_leading_slash, route_paths};
use crate::protocol::messages::AuthorizeRequest;

/// Recognizes return URLs that point back into a protocol flow.
pub trait ReturnUrlParser: Send + Sync {
    fn is_valid_return_url(&self, return_url: &str) -> bool;
    fn parse(&self, return_url: &str) -> Option<AuthorizeRequest>;
}

fn is_local_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}

/// Return URLs that resume an authorize request through the callback endpoint.
pub struct OidcReturnUrlParser;

impl OidcReturnUrlParser {
    fn split(return_url: &str) -> Option<(&str, &str)> {
        if !is_local_url(return_url) {
            return None;
        }
        let (path, query) = return_url.split_once('?').unwrap_or((return_url, ""));
        let callback = ensure_leading_slash(route_paths::AUTHORIZE_CALLBACK);
        let authorize = ensure_leading_slash(route_paths::AUTHORIZE);
        let matches = |p: &str| path.eq_ignore_ascii_case(p);
        (matches(&callback) || matches(&authorize)).then_some((path, query))
    }
}

impl ReturnUrlParser for OidcReturnUrlParser {
    fn is_valid_return_url(&self, return_url: &str) -> bool {
        Self::split(return_url).is_some()
    }

    fn parse(&self, return_url: &str) -> Option<AuthorizeRequest> {
        let (_, query) = Self::split(return_url)?;
        let request = AuthorizeRequest::from_params(&parse_urlencoded(query.as_bytes()));
        (!request.client_id.is_empty()).then_some(request)
    }
}

impl Component for OidcReturnUrlParser {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(OidcReturnUrlParser => dyn ReturnUrlParser);

/// Asks every registered [`ReturnUrlParser`] in turn.
pub struct ReturnUrlParsers {
    parsers: Vec<Arc<dyn ReturnUrlParser>>,
}

impl ReturnUrlParsers {
    pub fn new(parsers: Vec<Arc<dyn ReturnUrlParser>>) -> Self {
        Self { parsers }
    }

    pub fn is_valid_return_url(&self, return_url: &str) -> bool {
        let valid = self.parsers.iter().any(|p| p.is_valid_return_url(return_url));
        if !valid {
            log::debug!("return_url:invalid url={}", return_url);
        }
        valid
    }

    pub fn parse(&self, return_url: &str) -> Option<AuthorizeRequest> {
        self.parsers.iter().find_map(|p| p.parse(return_url))
    }
}

impl Component for ReturnUrlParsers {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve_all()?))
    }
}
