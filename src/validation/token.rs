//! Token endpoint request validation (RFC 6749 §4.1.3, §4.3, §4.4, §6 and
//! RFC 8628 §3.4).

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{
    ClientConfigurationValidator, CustomRequestValidator, DeviceCodeValidator, RequestValidator,
};
use super::secrets::ClientSecretValidator;
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::RequestContext;
use crate::protocol::constants::{claim_types, grant_types};
use crate::protocol::messages::{split_scopes, TokenRequest};
use crate::protocol::models::{AuthorizationCode, Client, GrantItem, Principal};
use crate::protocol::{ProtocolError, Validated};
use crate::services::resources::ResourceValidator;
use crate::services::{Clock, GrantStore, ProfileService, RefreshTokenService};

/// PKCE S256 verification: base64url(sha256(verifier)) == challenge.
pub fn verify_pkce(code_verifier: &str, code_challenge: &str) -> bool {
    let computed = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}

// ---------------------------------------------------------------------------
// Resource owner password
// ---------------------------------------------------------------------------

pub trait ResourceOwnerPasswordValidator: Send + Sync {
    fn validate(
        &self,
        username: &str,
        password: &str,
        client: &Client,
    ) -> Result<Principal, ProtocolError>;
}

/// Default until the host supplies a user store.
pub struct NotSupportedResourceOwnerPasswordValidator;

impl ResourceOwnerPasswordValidator for NotSupportedResourceOwnerPasswordValidator {
    fn validate(&self, _: &str, _: &str, client: &Client) -> Result<Principal, ProtocolError> {
        log::warn!(
            "token:password no password validator registered client={}",
            client.client_id
        );
        Err(ProtocolError::unsupported_grant_type(grant_types::PASSWORD))
    }
}

impl Component for NotSupportedResourceOwnerPasswordValidator {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(NotSupportedResourceOwnerPasswordValidator => dyn ResourceOwnerPasswordValidator);

// ---------------------------------------------------------------------------
// Extension grants
// ---------------------------------------------------------------------------

/// Validates one custom grant type. Returns the subject the grant acts for,
/// if any.
pub trait ExtensionGrantTypeValidator: Send + Sync {
    fn grant_type(&self) -> &str;
    fn validate(
        &self,
        context: &RequestContext,
        client: &Client,
    ) -> Result<Option<Principal>, ProtocolError>;
}

/// Dispatches to every registered [`ExtensionGrantTypeValidator`].
pub struct ExtensionGrantValidator {
    validators: Vec<Arc<dyn ExtensionGrantTypeValidator>>,
}

impl ExtensionGrantValidator {
    pub fn new(validators: Vec<Arc<dyn ExtensionGrantTypeValidator>>) -> Self {
        Self { validators }
    }

    pub fn supported_grant_types(&self) -> Vec<String> {
        self.validators.iter().map(|v| v.grant_type().to_string()).collect()
    }

    /// `None` when no validator handles `grant_type`.
    pub fn validate(
        &self,
        grant_type: &str,
        context: &RequestContext,
        client: &Client,
    ) -> Option<Result<Option<Principal>, ProtocolError>> {
        self.validators
            .iter()
            .find(|v| v.grant_type() == grant_type)
            .map(|v| v.validate(context, client))
    }
}

impl Component for ExtensionGrantValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new(resolver.resolve_all()?))
    }
}

// ---------------------------------------------------------------------------
// Token request validator
// ---------------------------------------------------------------------------

const BUILT_IN_GRANT_TYPES: [&str; 5] = [
    grant_types::AUTHORIZATION_CODE,
    grant_types::CLIENT_CREDENTIALS,
    grant_types::REFRESH_TOKEN,
    grant_types::PASSWORD,
    grant_types::DEVICE_CODE,
];

pub struct TokenRequestValidator {
    secrets: Arc<dyn ClientSecretValidator>,
    configuration: Arc<dyn ClientConfigurationValidator>,
    resources: Arc<dyn ResourceValidator>,
    codes: Arc<dyn GrantStore<AuthorizationCode>>,
    refresh_tokens: Arc<dyn RefreshTokenService>,
    device_codes: Arc<dyn DeviceCodeValidator>,
    passwords: Arc<dyn ResourceOwnerPasswordValidator>,
    extensions: Arc<ExtensionGrantValidator>,
    profile: Arc<dyn ProfileService>,
    custom: Arc<dyn CustomRequestValidator<TokenRequest>>,
    clock: Arc<dyn Clock>,
}

impl Component for TokenRequestValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            secrets: resolver.resolve()?,
            configuration: resolver.resolve()?,
            resources: resolver.resolve()?,
            codes: resolver.resolve()?,
            refresh_tokens: resolver.resolve()?,
            device_codes: resolver.resolve()?,
            passwords: resolver.resolve()?,
            extensions: resolver.resolve()?,
            profile: resolver.resolve()?,
            custom: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(TokenRequestValidator => dyn RequestValidator<TokenRequest>);

impl TokenRequestValidator {
    /// Requested scopes, or everything the client may ask for when none were sent.
    fn validate_scopes(
        &self,
        client: &Client,
        requested: Option<&str>,
    ) -> Result<Vec<String>, ProtocolError> {
        let scopes = match requested.map(split_scopes) {
            Some(scopes) if !scopes.is_empty() => scopes,
            _ => client.allowed_scopes.clone(),
        };
        if scopes.is_empty() {
            return Err(ProtocolError::invalid_scope("no scopes requested or allowed"));
        }
        let result = self.resources.validate_requested_resources(client, &scopes);
        if !result.succeeded() {
            return Err(ProtocolError::invalid_scope(format!(
                "invalid scopes: {}",
                result.invalid_scopes.join(" ")
            )));
        }
        Ok(result.scopes)
    }

    fn client_credentials(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<Validated<TokenRequest>, ProtocolError> {
        let scopes = match request.scope.as_deref().map(split_scopes) {
            Some(scopes) if !scopes.is_empty() => scopes,
            _ => client.allowed_scopes.clone(),
        };
        let result = self.resources.validate_requested_resources(&client, &scopes);
        if !result.succeeded() {
            return Err(ProtocolError::invalid_scope(format!(
                "invalid scopes: {}",
                result.invalid_scopes.join(" ")
            )));
        }
        if !result.resources.identity_resources.is_empty() || result.offline_access {
            return Err(ProtocolError::invalid_scope(
                "client credentials cannot request identity or offline scopes",
            ));
        }
        if result.scopes.is_empty() {
            return Err(ProtocolError::invalid_scope("no scopes requested or allowed"));
        }
        Ok(Validated::new(request).with_client(client).with_scopes(result.scopes))
    }

    fn authorization_code(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<Validated<TokenRequest>, ProtocolError> {
        let handle = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProtocolError::invalid_request("code is missing"))?;
        let code = self
            .codes
            .get(handle)
            .ok_or_else(|| ProtocolError::invalid_grant("invalid authorization code"))?;
        // One-time use, whatever the outcome below.
        self.codes.remove(handle);

        if code.client_id != client.client_id {
            log::warn!(
                "token:code client_mismatch expected={} got={}",
                code.client_id,
                client.client_id
            );
            return Err(ProtocolError::invalid_grant("code issued to another client"));
        }
        if let Some(expiration) = code.expiration() {
            if expiration <= self.clock.now() {
                return Err(ProtocolError::invalid_grant("authorization code expired"));
            }
        }
        if request.redirect_uri.as_deref() != Some(code.redirect_uri.as_str()) {
            return Err(ProtocolError::invalid_grant("redirect_uri does not match"));
        }
        match (&code.code_challenge, request.code_verifier.as_deref()) {
            (Some(challenge), Some(verifier)) => {
                if !verify_pkce(verifier, challenge) {
                    return Err(ProtocolError::invalid_grant("code_verifier does not match"));
                }
            }
            (Some(_), None) => return Err(ProtocolError::invalid_grant("code_verifier is missing")),
            (None, _) if client.require_pkce => {
                return Err(ProtocolError::invalid_grant("client requires PKCE"))
            }
            (None, _) => {}
        }
        if !self.profile.is_active(&code.subject, &client) {
            return Err(ProtocolError::invalid_grant("user is not active"));
        }

        let mut validated = Validated::new(request)
            .with_client(client)
            .with_subject(code.subject)
            .with_scopes(code.scopes);
        validated.nonce = code.nonce;
        Ok(validated)
    }

    fn refresh_token(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<Validated<TokenRequest>, ProtocolError> {
        let handle = request
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProtocolError::invalid_request("refresh_token is missing"))?;
        let grant = self.refresh_tokens.validate_refresh_token(handle, &client)?;

        let scopes = match request.scope.as_deref().map(split_scopes) {
            Some(requested) if !requested.is_empty() => {
                if let Some(extra) =
                    requested.iter().find(|s| !grant.access_token.scopes.contains(s))
                {
                    return Err(ProtocolError::invalid_scope(format!(
                        "scope '{}' was not originally granted",
                        extra
                    )));
                }
                requested
            }
            _ => grant.access_token.scopes.clone(),
        };

        let mut validated = Validated::new(request).with_client(client).with_scopes(scopes);
        if let Some(sub) = &grant.access_token.subject {
            let mut subject = Principal::new(sub);
            if let Some(sid) = &grant.access_token.session_id {
                subject = subject.with_claim(claim_types::SESSION_ID, sid.clone());
            }
            validated = validated.with_subject(subject);
        }
        Ok(validated.with_token(grant.access_token))
    }

    fn device_code(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<Validated<TokenRequest>, ProtocolError> {
        let device_code = request
            .device_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProtocolError::invalid_request("device_code is missing"))?;
        let details = self.device_codes.validate(device_code, &client)?;
        let subject = details
            .subject
            .ok_or_else(|| ProtocolError::invalid_grant("device code has no subject"))?;
        Ok(Validated::new(request)
            .with_client(client)
            .with_subject(subject)
            .with_scopes(details.scopes))
    }

    fn password(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<Validated<TokenRequest>, ProtocolError> {
        let credentials = (request.username.as_deref(), request.password.as_deref());
        let (username, password) = match credentials {
            (Some(u), Some(p)) if !u.is_empty() => (u, p),
            _ => return Err(ProtocolError::invalid_request("username and password are required")),
        };
        let subject = self.passwords.validate(username, password, &client)?;
        let scopes = self.validate_scopes(&client, request.scope.as_deref())?;
        Ok(Validated::new(request)
            .with_client(client)
            .with_subject(subject)
            .with_scopes(scopes))
    }

    fn extension(
        &self,
        context: &RequestContext,
        request: TokenRequest,
        client: Client,
    ) -> Result<Validated<TokenRequest>, ProtocolError> {
        let subject = self
            .extensions
            .validate(&request.grant_type, context, &client)
            .unwrap_or_else(|| Err(ProtocolError::unsupported_grant_type(&request.grant_type)))?;
        let scopes = self.validate_scopes(&client, request.scope.as_deref())?;
        let mut validated = Validated::new(request).with_client(client).with_scopes(scopes);
        if let Some(subject) = subject {
            validated = validated.with_subject(subject);
        }
        Ok(validated)
    }
}

impl RequestValidator<TokenRequest> for TokenRequestValidator {
    fn validate(
        &self,
        context: &RequestContext,
        request: TokenRequest,
    ) -> Result<Validated<TokenRequest>, ProtocolError> {
        if request.grant_type.is_empty() {
            return Err(ProtocolError::invalid_request("grant_type is missing"));
        }
        let grant_type = request.grant_type.clone();
        let built_in = BUILT_IN_GRANT_TYPES.contains(&grant_type.as_str());
        if !built_in && !self.extensions.supported_grant_types().contains(&grant_type) {
            return Err(ProtocolError::unsupported_grant_type(&grant_type));
        }

        let client = self.secrets.validate(context)?;
        self.configuration.validate(&client)?;
        if !client.allows_grant_type(&grant_type) {
            log::warn!(
                "token:validate grant not allowed client={} grant_type={}",
                client.client_id,
                grant_type
            );
            return Err(ProtocolError::unauthorized_client(format!(
                "client may not use grant type '{}'",
                grant_type
            )));
        }

        let mut validated = match grant_type.as_str() {
            grant_types::CLIENT_CREDENTIALS => self.client_credentials(request, client)?,
            grant_types::AUTHORIZATION_CODE => self.authorization_code(request, client)?,
            grant_types::REFRESH_TOKEN => self.refresh_token(request, client)?,
            grant_types::DEVICE_CODE => self.device_code(request, client)?,
            grant_types::PASSWORD => self.password(request, client)?,
            _ => self.extension(context, request, client)?,
        };
        self.custom.validate(&mut validated)?;
        log::debug!(
            "token:validate ok client={} grant_type={}",
            validated.client_id().unwrap_or_default(),
            grant_type
        );
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{ApiResource, ApiScope, IdentityResource};
    use crate::services::resources::{DefaultResourceValidator, DefaultScopeParser};
    use crate::services::{
        DefaultGrantStore, DefaultHandleGenerationService, DefaultProfileService,
        JsonGrantSerializer, SystemClock,
    };
    use crate::stores::{
        InMemoryClientStore, InMemoryPersistedGrantStore, InMemoryResourceStore, Resources,
    };
    use crate::stores::ClientStore;
    use crate::validation::{DefaultClientConfigurationValidator, DefaultCustomRequestValidator};
    use chrono::Utc;

    /// Trusts `client_id` from the form; secret checks are covered elsewhere.
    struct FormClientId(InMemoryClientStore);

    impl ClientSecretValidator for FormClientId {
        fn validate(&self, context: &RequestContext) -> Result<Client, ProtocolError> {
            context
                .form
                .get("client_id")
                .and_then(|id| self.0.find_client_by_id(id))
                .ok_or_else(|| ProtocolError::invalid_client("unknown client"))
        }
    }

    struct NoRefresh;

    impl RefreshTokenService for NoRefresh {
        fn create_refresh_token(
            &self,
            _: &crate::protocol::Token,
            _: &Client,
        ) -> crate::error::TollgateResult<String> {
            Ok("rt".into())
        }
        fn validate_refresh_token(
            &self,
            _: &str,
            _: &Client,
        ) -> Result<crate::protocol::models::RefreshTokenGrant, ProtocolError> {
            Err(ProtocolError::invalid_grant("unknown refresh token"))
        }
        fn update_refresh_token(
            &self,
            _: &str,
            _: &crate::protocol::Token,
            _: &Client,
        ) -> crate::error::TollgateResult<String> {
            Ok("rt".into())
        }
    }

    struct NoDevice;

    impl DeviceCodeValidator for NoDevice {
        fn validate(
            &self,
            _: &str,
            _: &Client,
        ) -> Result<crate::protocol::models::DeviceCode, ProtocolError> {
            Err(ProtocolError::invalid_grant("unknown device code"))
        }
    }

    struct Delegation;

    impl ExtensionGrantTypeValidator for Delegation {
        fn grant_type(&self) -> &str {
            "delegation"
        }
        fn validate(
            &self,
            context: &RequestContext,
            _: &Client,
        ) -> Result<Option<Principal>, ProtocolError> {
            match context.form.get("token") {
                Some(t) if t == "upstream" => Ok(Some(Principal::new("bob"))),
                _ => Err(ProtocolError::invalid_grant("bad upstream token")),
            }
        }
    }

    struct Fixture {
        validator: TokenRequestValidator,
        codes: Arc<dyn GrantStore<AuthorizationCode>>,
    }

    fn fixture() -> Fixture {
        let mut svc = Client::new("svc");
        svc.allowed_grant_types = vec![grant_types::CLIENT_CREDENTIALS.into(), "delegation".into()];
        svc.allowed_scopes = vec!["orders".into(), "openid".into()];
        let mut web = Client::new("web");
        web.allowed_grant_types =
            vec![grant_types::AUTHORIZATION_CODE.into(), grant_types::PASSWORD.into()];
        web.redirect_uris = vec!["https://web.example.com/cb".into()];
        web.allowed_scopes = vec!["openid".into(), "orders".into()];

        let resources = Arc::new(InMemoryResourceStore::new(Resources {
            identity_resources: vec![IdentityResource {
                name: "openid".into(),
                user_claims: vec!["sub".into()],
            }],
            api_resources: vec![ApiResource {
                name: "orders-api".into(),
                scopes: vec!["orders".into()],
                api_secrets: vec![],
            }],
            api_scopes: vec![ApiScope {
                name: "orders".into(),
                user_claims: vec![],
            }],
        }));
        let codes: Arc<dyn GrantStore<AuthorizationCode>> =
            Arc::new(DefaultGrantStore::<AuthorizationCode>::new(
                Arc::new(InMemoryPersistedGrantStore::new()),
                Arc::new(DefaultHandleGenerationService),
                Arc::new(JsonGrantSerializer),
            ));
        Fixture {
            validator: TokenRequestValidator {
                secrets: Arc::new(FormClientId(InMemoryClientStore::new(vec![svc, web]))),
                configuration: Arc::new(DefaultClientConfigurationValidator),
                resources: Arc::new(DefaultResourceValidator::new(
                    Arc::new(DefaultScopeParser),
                    resources,
                )),
                codes: codes.clone(),
                refresh_tokens: Arc::new(NoRefresh),
                device_codes: Arc::new(NoDevice),
                passwords: Arc::new(NotSupportedResourceOwnerPasswordValidator),
                extensions: Arc::new(ExtensionGrantValidator::new(vec![Arc::new(Delegation)])),
                profile: Arc::new(DefaultProfileService),
                custom: Arc::new(DefaultCustomRequestValidator::default()),
                clock: Arc::new(SystemClock),
            },
            codes,
        }
    }

    fn ctx(client_id: &str) -> RequestContext {
        RequestContext::post("/connect/token").with_form("client_id", client_id)
    }

    fn request(grant_type: &str) -> TokenRequest {
        TokenRequest {
            grant_type: grant_type.into(),
            ..Default::default()
        }
    }

    #[test]
    fn pkce_matches_rfc_7636_example() {
        assert!(verify_pkce(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        ));
        assert!(!verify_pkce("wrong", "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"));
    }

    #[test]
    fn client_credentials_defaults_to_allowed_api_scopes() {
        let f = fixture();
        let mut req = request(grant_types::CLIENT_CREDENTIALS);
        req.scope = Some("orders".into());
        let validated = f.validator.validate(&ctx("svc"), req).unwrap();
        assert_eq!(validated.scopes, vec!["orders"]);
        assert!(validated.subject.is_none());

        let mut identity = request(grant_types::CLIENT_CREDENTIALS);
        identity.scope = Some("openid".into());
        assert_eq!(
            f.validator.validate(&ctx("svc"), identity).unwrap_err().error,
            "invalid_scope"
        );
    }

    #[test]
    fn grant_type_checks() {
        let f = fixture();
        assert_eq!(
            f.validator.validate(&ctx("svc"), request("")).unwrap_err().error,
            "invalid_request"
        );
        assert_eq!(
            f.validator.validate(&ctx("svc"), request("magic")).unwrap_err().error,
            "unsupported_grant_type"
        );
        assert_eq!(
            f.validator
                .validate(&ctx("web"), request(grant_types::CLIENT_CREDENTIALS))
                .unwrap_err()
                .error,
            "unauthorized_client"
        );
    }

    #[test]
    fn authorization_code_is_single_use_and_checks_pkce() {
        let f = fixture();
        let code = AuthorizationCode {
            client_id: "web".into(),
            subject: Principal::new("alice"),
            redirect_uri: "https://web.example.com/cb".into(),
            scopes: vec!["openid".into()],
            code_challenge: Some("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM".into()),
            nonce: Some("n-1".into()),
            creation_time: Utc::now(),
            lifetime: 300,
        };
        let exchange = |handle: &str, verifier: &str| TokenRequest {
            grant_type: grant_types::AUTHORIZATION_CODE.into(),
            code: Some(handle.into()),
            redirect_uri: Some("https://web.example.com/cb".into()),
            code_verifier: Some(verifier.into()),
            ..Default::default()
        };

        let bad = f.codes.store(&code).unwrap();
        let err = f.validator.validate(&ctx("web"), exchange(&bad, "nope")).unwrap_err();
        assert_eq!(err.error, "invalid_grant");

        let good = f.codes.store(&code).unwrap();
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let validated = f.validator.validate(&ctx("web"), exchange(&good, verifier)).unwrap();
        assert_eq!(validated.subject.as_ref().unwrap().subject, "alice");
        assert_eq!(validated.nonce.as_deref(), Some("n-1"));

        let replay = f.validator.validate(&ctx("web"), exchange(&good, verifier));
        assert_eq!(replay.unwrap_err().error, "invalid_grant");
    }

    #[test]
    fn password_grant_is_unsupported_by_default() {
        let f = fixture();
        let mut req = request(grant_types::PASSWORD);
        req.username = Some("alice".into());
        req.password = Some("pw".into());
        assert_eq!(
            f.validator.validate(&ctx("web"), req).unwrap_err().error,
            "unsupported_grant_type"
        );
    }

    #[test]
    fn extension_grant_supplies_the_subject() {
        let f = fixture();
        let mut req = request("delegation");
        req.scope = Some("orders".into());
        let validated = f
            .validator
            .validate(&ctx("svc").with_form("token", "upstream"), req.clone())
            .unwrap();
        assert_eq!(validated.subject.unwrap().subject, "bob");
        assert_eq!(
            f.validator.validate(&ctx("svc"), req).unwrap_err().error,
            "invalid_grant"
        );
    }
}
