use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::container::ConfigurationError;
use crate::error::TollgateResult;
use crate::protocol::constants::{
    endpoint_names, DEFAULT_COOKIE_AUTHENTICATION_SCHEME, EXTERNAL_COOKIE_AUTHENTICATION_SCHEME,
};
use crate::protocol::models::{
    ApiResource, ApiScope, Client, IdentityResource, MAX_LIFETIME_SECS,
};

/// Named options consumed while the server is assembled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Fixed issuer. When unset, the issuer is taken from the request's host.
    pub issuer_uri: Option<String>,
    pub authentication: AuthenticationOptions,
    pub endpoints: EndpointsOptions,
    pub cors: CorsOptions,
    pub events: EventsOptions,
    pub device_flow: DeviceFlowOptions,
    pub user_interaction: UserInteractionOptions,
    pub clients: Vec<Client>,
    pub identity_resources: Vec<IdentityResource>,
    pub api_resources: Vec<ApiResource>,
    pub api_scopes: Vec<ApiScope>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            issuer_uri: None,
            authentication: AuthenticationOptions::default(),
            endpoints: EndpointsOptions::default(),
            cors: CorsOptions::default(),
            events: EventsOptions::default(),
            device_flow: DeviceFlowOptions::default(),
            user_interaction: UserInteractionOptions::default(),
            clients: Vec::new(),
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
            api_resources: Vec::new(),
            api_scopes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationOptions {
    pub cookie_scheme: String,
    pub external_cookie_scheme: String,
    /// Schemes whose sign-out is propagated to the upstream provider.
    pub federated_signout_schemes: Vec<String>,
    pub cookie_lifetime_secs: u64,
}

impl Default for AuthenticationOptions {
    fn default() -> Self {
        Self {
            cookie_scheme: DEFAULT_COOKIE_AUTHENTICATION_SCHEME.into(),
            external_cookie_scheme: EXTERNAL_COOKIE_AUTHENTICATION_SCHEME.into(),
            federated_signout_schemes: Vec::new(),
            cookie_lifetime_secs: 10 * 60 * 60,
        }
    }
}

/// One enable flag per protocol endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsOptions {
    pub enable_authorize_endpoint: bool,
    pub enable_token_endpoint: bool,
    pub enable_discovery_endpoint: bool,
    pub enable_userinfo_endpoint: bool,
    pub enable_end_session_endpoint: bool,
    pub enable_check_session_endpoint: bool,
    pub enable_token_revocation_endpoint: bool,
    pub enable_introspection_endpoint: bool,
    pub enable_device_authorization_endpoint: bool,
}

impl Default for EndpointsOptions {
    fn default() -> Self {
        Self {
            enable_authorize_endpoint: true,
            enable_token_endpoint: true,
            enable_discovery_endpoint: true,
            enable_userinfo_endpoint: true,
            enable_end_session_endpoint: true,
            enable_check_session_endpoint: true,
            enable_token_revocation_endpoint: true,
            enable_introspection_endpoint: true,
            enable_device_authorization_endpoint: true,
        }
    }
}

impl EndpointsOptions {
    /// Whether the endpoint with this logical name is enabled. Names without
    /// a flag (host-added endpoints) are always enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        match name {
            endpoint_names::AUTHORIZE => self.enable_authorize_endpoint,
            endpoint_names::TOKEN => self.enable_token_endpoint,
            endpoint_names::DISCOVERY => self.enable_discovery_endpoint,
            endpoint_names::USER_INFO => self.enable_userinfo_endpoint,
            endpoint_names::END_SESSION => self.enable_end_session_endpoint,
            endpoint_names::CHECK_SESSION => self.enable_check_session_endpoint,
            endpoint_names::REVOCATION => self.enable_token_revocation_endpoint,
            endpoint_names::INTROSPECTION => self.enable_introspection_endpoint,
            endpoint_names::DEVICE_AUTHORIZATION => self.enable_device_authorization_endpoint,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsOptions {
    /// Paths the server's own CORS policy applies to.
    pub cors_paths: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub allow_all: bool,
}

impl Default for CorsOptions {
    fn default() -> Self {
        use crate::protocol::constants::route_paths;
        Self {
            cors_paths: [
                route_paths::DISCOVERY_CONFIGURATION,
                route_paths::DISCOVERY_WEB_KEYS,
                route_paths::TOKEN,
                route_paths::USER_INFO,
                route_paths::REVOCATION,
            ]
            .iter()
            .map(|p| crate::protocol::constants::ensure_leading_slash(p))
            .collect(),
            allowed_origins: Vec::new(),
            allow_all: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsOptions {
    pub raise_success_events: bool,
    pub raise_failure_events: bool,
    pub raise_information_events: bool,
    pub raise_error_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFlowOptions {
    pub interval_secs: u64,
    pub lifetime_secs: u64,
    pub user_code_type: String,
}

impl Default for DeviceFlowOptions {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            lifetime_secs: 300,
            user_code_type: crate::services::device::NUMERIC_USER_CODE_TYPE.into(),
        }
    }
}

/// Where the host's own pages live. The protocol endpoints redirect there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInteractionOptions {
    pub login_url: String,
    pub consent_url: String,
    pub logout_url: String,
    pub error_url: String,
    pub device_verification_url: String,
    pub device_verification_user_code_parameter: String,
    pub login_return_url_parameter: String,
    pub logout_id_parameter: String,
    pub error_id_parameter: String,
}

impl Default for UserInteractionOptions {
    fn default() -> Self {
        Self {
            login_url: "/account/login".into(),
            consent_url: "/consent".into(),
            logout_url: "/account/logout".into(),
            error_url: "/home/error".into(),
            device_verification_url: "/device".into(),
            device_verification_user_code_parameter: "userCode".into(),
            login_return_url_parameter: "ReturnUrl".into(),
            logout_id_parameter: "logoutId".into(),
            error_id_parameter: "errorId".into(),
        }
    }
}

impl ServerOptions {
    /// Read options from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> TollgateResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let options: ServerOptions = serde_json::from_str(&data)?;
        log::info!(
            "options:load path={} clients={} issuer={}",
            path.display(),
            options.clients.len(),
            options.issuer_uri.as_deref().unwrap_or("<from request>")
        );
        Ok(options)
    }

    /// Check that the named options the assembly depends on are present.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let auth = &self.authentication;
        if auth.cookie_scheme.trim().is_empty() {
            return Err(invalid("authentication.cookie_scheme", "must not be empty"));
        }
        if auth.external_cookie_scheme.trim().is_empty() {
            return Err(invalid(
                "authentication.external_cookie_scheme",
                "must not be empty",
            ));
        }
        if auth.cookie_scheme == auth.external_cookie_scheme {
            return Err(invalid(
                "authentication.external_cookie_scheme",
                "must differ from the cookie scheme",
            ));
        }
        if let Some(issuer) = &self.issuer_uri {
            if url::Url::parse(issuer).is_err() {
                return Err(invalid("issuer_uri", "must be an absolute URL"));
            }
        }
        if self.device_flow.interval_secs == 0 {
            return Err(invalid("device_flow.interval_secs", "must be positive"));
        }
        check_lifetime("authentication.cookie_lifetime_secs", auth.cookie_lifetime_secs)?;
        check_lifetime("device_flow.interval_secs", self.device_flow.interval_secs)?;
        check_lifetime("device_flow.lifetime_secs", self.device_flow.lifetime_secs)?;
        let pages = &self.user_interaction;
        for (option, url) in [
            ("user_interaction.login_url", &pages.login_url),
            ("user_interaction.consent_url", &pages.consent_url),
            ("user_interaction.logout_url", &pages.logout_url),
            ("user_interaction.error_url", &pages.error_url),
            ("user_interaction.device_verification_url", &pages.device_verification_url),
        ] {
            if url.trim().is_empty() {
                return Err(invalid(option, "must not be empty"));
            }
        }
        for path in &self.cors.cors_paths {
            if !path.starts_with('/') {
                return Err(invalid("cors.cors_paths", "paths must start with '/'"));
            }
        }
        for client in &self.clients {
            if client.client_id.trim().is_empty() {
                return Err(invalid("clients", "client_id must not be empty"));
            }
            check_lifetime("clients.access_token_lifetime", client.access_token_lifetime)?;
            check_lifetime("clients.refresh_token_lifetime", client.refresh_token_lifetime)?;
        }
        Ok(())
    }
}

fn check_lifetime(option: &str, secs: u64) -> Result<(), ConfigurationError> {
    if secs > MAX_LIFETIME_SECS {
        return Err(invalid(option, "exceeds one hundred years"));
    }
    Ok(())
}

fn invalid(option: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidOption {
        option: option.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_every_endpoint() {
        let options = ServerOptions::default();
        for name in [
            endpoint_names::AUTHORIZE,
            endpoint_names::TOKEN,
            endpoint_names::DISCOVERY,
            endpoint_names::USER_INFO,
            endpoint_names::END_SESSION,
            endpoint_names::CHECK_SESSION,
            endpoint_names::REVOCATION,
            endpoint_names::INTROSPECTION,
            endpoint_names::DEVICE_AUTHORIZATION,
        ] {
            assert!(options.endpoints.is_enabled(name), "{}", name);
        }
        assert!(options.endpoints.is_enabled("Custom"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn load_fills_missing_fields_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tollgate.json");
        std::fs::write(
            &path,
            r#"{
                "issuer_uri": "https://login.example.com",
                "endpoints": { "enable_token_endpoint": false },
                "clients": [{ "client_id": "svc", "allowed_grant_types": ["client_credentials"] }]
            }"#,
        )
        .unwrap();

        let options = ServerOptions::load(&path).unwrap();
        assert_eq!(options.authentication.cookie_scheme, "idsrv");
        assert!(!options.endpoints.enable_token_endpoint);
        assert!(options.endpoints.enable_discovery_endpoint);
        assert_eq!(options.clients[0].client_id, "svc");
        assert!(options.clients[0].enabled);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ServerOptions::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, crate::error::TollgateError::Io(_)));
    }

    #[test]
    fn empty_cookie_scheme_is_rejected() {
        let mut options = ServerOptions::default();
        options.authentication.cookie_scheme = " ".into();
        match options.validate() {
            Err(ConfigurationError::InvalidOption { option, .. }) => {
                assert_eq!(option, "authentication.cookie_scheme")
            }
            other => panic!("expected InvalidOption, got {:?}", other),
        }
    }

    #[test]
    fn identical_cookie_schemes_are_rejected() {
        let mut options = ServerOptions::default();
        options.authentication.external_cookie_scheme = "idsrv".into();
        assert!(options.validate().is_err());
    }

    #[test]
    fn oversized_lifetimes_are_rejected() {
        let mut options = ServerOptions::default();
        options.authentication.cookie_lifetime_secs = 10_000_000_000_000_000;
        assert!(matches!(
            options.validate(),
            Err(ConfigurationError::InvalidOption { option, .. })
                if option == "authentication.cookie_lifetime_secs"
        ));

        let mut client = Client::new("svc");
        client.refresh_token_lifetime = u64::MAX;
        let options = ServerOptions {
            clients: vec![client],
            ..ServerOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigurationError::InvalidOption { option, .. })
                if option == "clients.refresh_token_lifetime"
        ));
    }

    #[test]
    fn relative_issuer_is_rejected() {
        let options = ServerOptions {
            issuer_uri: Some("login.example.com".into()),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
