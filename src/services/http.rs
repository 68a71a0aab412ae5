//! Named outbound HTTP clients.
//!
//! Each purpose gets its own type with its own request timeout. All of them
//! send through the shared platform `reqwest::Client`, so a host that
//! replaces that client (proxy, TLS roots) changes every outbound call.

use std::sync::Arc;
use std::time::Duration;

use crate::container::{Component, ResolutionError, Resolver};

const JWT_REQUEST_URI_TIMEOUT_SECS: u64 = 30;
const BACK_CHANNEL_LOGOUT_TIMEOUT_SECS: u64 = 10;

/// Fetches `request_uri` objects (RFC 9101 §5.2).
///
/// No default validator calls this. It is registered for hosts that plug in
/// their own request-object validation.
#[derive(Clone)]
pub struct JwtRequestUriHttpClient {
    client: Arc<reqwest::Client>,
    timeout: Duration,
}

impl JwtRequestUriHttpClient {
    pub fn new(client: Arc<reqwest::Client>) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(JWT_REQUEST_URI_TIMEOUT_SECS),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET the request object at `url`. Non-2xx answers are errors.
    pub async fn get_jwt(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/oauth-authz-req+jwt")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

impl Component for JwtRequestUriHttpClient {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?))
    }
}

/// Posts logout tokens to clients' back-channel endpoints.
#[derive(Clone)]
pub struct BackChannelLogoutHttpClient {
    client: Arc<reqwest::Client>,
    timeout: Duration,
}

impl BackChannelLogoutHttpClient {
    pub fn new(client: Arc<reqwest::Client>) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(BACK_CHANNEL_LOGOUT_TIMEOUT_SECS),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<reqwest::StatusCode, reqwest::Error> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;
        Ok(response.status())
    }
}

impl Component for BackChannelLogoutHttpClient {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve()?))
    }
}
