//! Locating a bearer token on a request (RFC 6750 §2.1 and §2.2).
//!
//! Per RFC 7235 §2.1, the auth-scheme ("Bearer") comparison is
//! case-insensitive.

use axum::http::header;

use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerTokenUsage {
    /// `Authorization: Bearer <token>`.
    Header(String),
    /// `access_token` in a form-encoded POST body.
    PostBody(String),
    Missing,
}

impl BearerTokenUsage {
    pub fn token(&self) -> Option<&str> {
        match self {
            BearerTokenUsage::Header(t) | BearerTokenUsage::PostBody(t) => Some(t),
            BearerTokenUsage::Missing => None,
        }
    }
}

pub struct BearerTokenUsageValidator;

impl BearerTokenUsageValidator {
    pub fn validate(&self, context: &RequestContext) -> BearerTokenUsage {
        let bearer = context.header(header::AUTHORIZATION).and_then(|v| {
            if v.len() > 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        });
        if let Some(token) = bearer.filter(|t| !t.is_empty()) {
            return BearerTokenUsage::Header(token.to_string());
        }

        if context.is_form_post() {
            if let Some(token) = context.form.get("access_token").filter(|t| !t.is_empty()) {
                return BearerTokenUsage::PostBody(token.clone());
            }
        }
        BearerTokenUsage::Missing
    }
}

impl Component for BearerTokenUsageValidator {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_returns_missing() {
        let ctx = RequestContext::get("/connect/userinfo");
        assert_eq!(BearerTokenUsageValidator.validate(&ctx), BearerTokenUsage::Missing);
    }

    #[test]
    fn non_bearer_header_returns_missing() {
        let ctx = RequestContext::get("/connect/userinfo")
            .with_header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz");
        assert_eq!(BearerTokenUsageValidator.validate(&ctx), BearerTokenUsage::Missing);
    }

    #[test]
    fn scheme_is_case_insensitive() {
        for scheme in ["Bearer", "bearer", "BEARER"] {
            let ctx = RequestContext::get("/connect/userinfo")
                .with_header(header::AUTHORIZATION, &format!("{} abc", scheme));
            assert_eq!(
                BearerTokenUsageValidator.validate(&ctx),
                BearerTokenUsage::Header("abc".into())
            );
        }
    }

    #[test]
    fn form_body_token_needs_a_form_post() {
        let post = RequestContext::post("/connect/userinfo")
            .with_header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .with_form("access_token", "abc");
        assert_eq!(BearerTokenUsageValidator.validate(&post).token(), Some("abc"));

        let get = RequestContext::get("/connect/userinfo").with_form("access_token", "abc");
        assert_eq!(BearerTokenUsageValidator.validate(&get), BearerTokenUsage::Missing);
    }
}
