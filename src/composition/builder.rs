use std::sync::Arc;

use super::IdentityServer;
use crate::config::ServerOptions;
use crate::container::{
    Component, ConfigurationError, Lifetime, Registration, RegistrationPolicy, ResolutionError,
    ServiceCollection, Upcast,
};
use crate::endpoints::handlers::{
    AuthorizeCallbackEndpoint, AuthorizeEndpoint, CheckSessionEndpoint,
    DeviceAuthorizationEndpoint, DiscoveryEndpoint, DiscoveryKeyEndpoint,
    EndSessionCallbackEndpoint, EndSessionEndpoint, IntrospectionEndpoint,
    TokenRevocationEndpoint, TokenEndpoint, UserInfoEndpoint,
};
use crate::endpoints::{
    DefaultEndpointRouter, EndpointHandler, EndpointRegistry, EndpointRouter,
};
use crate::error::TollgateResult;
use crate::protocol::constants::{endpoint_names, route_paths};
use crate::protocol::messages::{
    AuthorizeRequest, DeviceAuthorizationRequest, EndSessionRequest, IntrospectionRequest,
    RevocationRequest, TokenRequest, UserInfoRequest,
};
use crate::protocol::models::{
    AuthorizationCode, Consent, ErrorMessage, LogoutMessage, LogoutNotificationContext,
    RefreshTokenGrant,
};
use crate::protocol::Token;
use crate::response::{
    AuthorizeInteractionResponseGenerator, AuthorizeResponseGenerator,
    DefaultAuthorizeInteractionResponseGenerator, DefaultAuthorizeResponseGenerator,
    DefaultDeviceAuthorizationResponseGenerator, DefaultDiscoveryResponseGenerator,
    DefaultIntrospectionResponseGenerator, DefaultTokenResponseGenerator,
    DefaultTokenRevocationResponseGenerator, DefaultUserInfoResponseGenerator,
    DeviceAuthorizationResponseGenerator, DiscoveryResponseGenerator,
    IntrospectionResponseGenerator, TokenResponseGenerator, TokenRevocationResponseGenerator,
    UserInfoResponseGenerator,
};
use crate::services::device::{
    DefaultDeviceFlowCodeService, DefaultUserCodeService, DeviceFlowCodeService,
    DeviceFlowThrottlingService, DistributedDeviceFlowThrottlingService, NumericUserCodeGenerator,
    UserCodeGenerator, UserCodeService,
};
use crate::services::http::{BackChannelLogoutHttpClient, JwtRequestUriHttpClient};
use crate::services::interaction::{
    DefaultDeviceFlowInteractionService, DefaultInteractionService, DeviceFlowInteractionService,
    InteractionService,
};
use crate::services::logout::{
    BackChannelLogoutService, DefaultBackChannelLogoutService, DefaultLogoutNotificationService,
    LogoutNotificationService,
};
use crate::services::messages::{MessageStore, ProtectedDataMessageStore};
use crate::services::resources::{
    DefaultResourceValidator, DefaultScopeParser, ResourceValidator, ScopeParser,
};
use crate::services::return_url::{OidcReturnUrlParser, ReturnUrlParser, ReturnUrlParsers};
use crate::services::tools::ServerTools;
use crate::services::{
    AuthenticationHandlerProvider, AuthenticationService, ClaimsService, Clock,
    ConfiguredHandlerProvider, ConsentService, CookieAuthenticationService, CorsPolicyProvider,
    CorsPolicyService, DefaultClaimsService, DefaultConsentService, DefaultCorsPolicyProvider,
    DefaultCorsPolicyService, DefaultEventService, DefaultGrantStore,
    DefaultHandleGenerationService, DefaultKeyMaterialService, DefaultPersistedGrantService,
    DefaultProfileService, DefaultRefreshTokenService, DefaultTokenCreationService,
    DefaultTokenService, DefaultUserSession, DevelopmentSigningCredentialStore, DistributedCache,
    EventService, EventSink, FederatedSignoutHandlerProvider, GrantStore,
    HandleGenerationService, IdentityServerAuthenticationService,
    IdentityServerCorsPolicyProvider, JsonGrantSerializer, KeyMaterialService, LogEventSink,
    MemoryDistributedCache, PersistedGrantSerializer, PersistedGrantService, ProfileService,
    RefreshTokenService, SigningCredentialStore, SystemClock, TokenCreationService, TokenService,
    UserSession,
};
use crate::stores::{
    ClientStore, DeviceFlowStore, InMemoryClientStore, InMemoryDeviceFlowStore,
    InMemoryPersistedGrantStore, InMemoryResourceStore, PersistedGrantStore, ResourceStore,
};
use crate::validation::secrets::{
    ApiSecretValidator, BasicAuthenticationSecretParser, ClientSecretValidator,
    DefaultApiSecretValidator, DefaultClientSecretValidator, DefaultSecretsListParser,
    DefaultSecretsListValidator, HashedSharedSecretValidator, PostBodySecretParser, SecretParser,
    SecretValidator, SecretsListParser, SecretsListValidator,
};
use crate::validation::{
    AuthorizeRequestValidator, BearerTokenUsageValidator, ClientConfigurationValidator,
    CustomRequestValidator, CustomTokenValidator, DefaultClientConfigurationValidator,
    DefaultCustomRequestValidator, DefaultCustomTokenValidator, DefaultDeviceCodeValidator,
    DefaultTokenValidator, DeviceAuthorizationRequestValidator, DeviceCodeValidator,
    EndSessionRequestValidator, ExtensionGrantValidator, IntrospectionRequestValidator,
    NotSupportedResourceOwnerPasswordValidator, RedirectUriValidator, RequestValidator,
    ResourceOwnerPasswordValidator, StrictRedirectUriValidator, TokenRequestValidator,
    TokenRevocationRequestValidator, TokenValidator, UserInfoRequestValidator,
};

const NOT_FOR_PRODUCTION: &str = "not for production use";

/// Assembles the server's services and route table, one phase at a time.
///
/// The builder starts from whatever the host already registered. Defaults are
/// try-added, so a host registration made before a phase runs always wins.
/// Capabilities that cooperate rather than replace each other (secret parsers
/// and validators) are appended.
pub struct IdentityServerBuilder {
    services: ServiceCollection,
    endpoints: EndpointRegistry,
    options: Arc<ServerOptions>,
}

impl IdentityServerBuilder {
    pub fn new(services: ServiceCollection, options: ServerOptions) -> Self {
        Self {
            services,
            endpoints: EndpointRegistry::new(),
            options: Arc::new(options),
        }
    }

    pub fn services(&self) -> &ServiceCollection {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut ServiceCollection {
        &mut self.services
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    fn try_add<C, I>(&mut self, lifetime: Lifetime) -> bool
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        self.services.try_add(Registration::of_type::<C, I>(lifetime))
    }

    fn append<C, I>(&mut self, lifetime: Lifetime)
    where
        C: ?Sized + Send + Sync + 'static,
        I: Component + Upcast<C>,
    {
        self.services
            .register(Registration::of_type::<C, I>(lifetime), RegistrationPolicy::Append);
    }

    // -----------------------------------------------------------------------
    // Phases, in the order `assemble` runs them
    // -----------------------------------------------------------------------

    /// Options, clock and the shared outbound HTTP client.
    pub fn add_required_platform_services(mut self) -> Self {
        // Appended: the builder's options are the ones every phase read.
        self.services.add(Registration::instance(self.options.clone()));
        self.try_add::<dyn Clock, SystemClock>(Lifetime::Singleton);
        self.services.try_add(Registration::factory::<reqwest::Client, _>(
            Lifetime::Singleton,
            |_| {
                reqwest::Client::builder()
                    .build()
                    .map(Arc::new)
                    .map_err(|e| ResolutionError::construction("reqwest::Client", e))
            },
        ));
        log::debug!("compose:phase name=platform services={}", self.services.len());
        self
    }

    /// Cookie sign-in for the local and external schemes, then the server's
    /// session bookkeeping and federated sign-out layered on top.
    pub fn add_cookie_authentication(mut self) -> Result<Self, ConfigurationError> {
        self.try_add::<dyn AuthenticationService, CookieAuthenticationService>(Lifetime::Singleton);
        self.try_add::<dyn AuthenticationHandlerProvider, ConfiguredHandlerProvider>(
            Lifetime::Singleton,
        );
        self.services
            .add_transient_decorator::<
                dyn AuthenticationService,
                IdentityServerAuthenticationService,
            >()?;
        self.services
            .add_transient_decorator::<
                dyn AuthenticationHandlerProvider,
                FederatedSignoutHandlerProvider,
            >()?;
        self.services
            .require::<dyn Clock>("CookieAuthenticationService");
        self.services
            .require::<dyn UserSession>("IdentityServerAuthenticationService");
        log::debug!(
            "compose:phase name=authentication scheme={}",
            self.options.authentication.cookie_scheme
        );
        Ok(self)
    }

    /// Always-on services: secret parsing, bearer tokens, return URLs, the user
    /// session and CORS.
    pub fn add_core_services(mut self) -> Result<Self, ConfigurationError> {
        self.try_add::<dyn SecretsListParser, DefaultSecretsListParser>(Lifetime::Transient);
        self.try_add::<dyn SecretsListValidator, DefaultSecretsListValidator>(Lifetime::Transient);
        self.try_add::<ExtensionGrantValidator, ExtensionGrantValidator>(Lifetime::Transient);
        self.try_add::<BearerTokenUsageValidator, BearerTokenUsageValidator>(Lifetime::Transient);
        self.try_add::<ReturnUrlParsers, ReturnUrlParsers>(Lifetime::Transient);
        self.try_add::<ServerTools, ServerTools>(Lifetime::Transient);
        self.append::<dyn ReturnUrlParser, OidcReturnUrlParser>(Lifetime::Transient);
        self.try_add::<dyn UserSession, DefaultUserSession>(Lifetime::Scoped);

        self.try_add::<dyn CorsPolicyProvider, DefaultCorsPolicyProvider>(Lifetime::Transient);
        self.services
            .add_transient_decorator::<dyn CorsPolicyProvider, IdentityServerCorsPolicyProvider>()?;
        self.services
            .require::<dyn CorsPolicyService>("IdentityServerCorsPolicyProvider");
        self.services.require::<dyn DistributedCache>("DefaultUserSession");
        self.services.require::<dyn KeyMaterialService>("ServerTools");
        log::debug!("compose:phase name=core services={}", self.services.len());
        Ok(self)
    }

    /// The protocol route table and the router that consults it.
    pub fn add_default_endpoints(mut self) -> Result<Self, ConfigurationError> {
        self.try_add::<dyn EndpointRouter, DefaultEndpointRouter>(Lifetime::Transient);

        self = self
            .add_endpoint::<AuthorizeCallbackEndpoint>(
                endpoint_names::AUTHORIZE,
                route_paths::AUTHORIZE_CALLBACK,
            )?
            .add_endpoint::<AuthorizeEndpoint>(endpoint_names::AUTHORIZE, route_paths::AUTHORIZE)?
            .add_endpoint::<CheckSessionEndpoint>(
                endpoint_names::CHECK_SESSION,
                route_paths::CHECK_SESSION,
            )?
            .add_endpoint::<DeviceAuthorizationEndpoint>(
                endpoint_names::DEVICE_AUTHORIZATION,
                route_paths::DEVICE_AUTHORIZATION,
            )?
            .add_endpoint::<DiscoveryKeyEndpoint>(
                endpoint_names::DISCOVERY,
                route_paths::DISCOVERY_WEB_KEYS,
            )?
            .add_endpoint::<DiscoveryEndpoint>(
                endpoint_names::DISCOVERY,
                route_paths::DISCOVERY_CONFIGURATION,
            )?
            .add_endpoint::<EndSessionCallbackEndpoint>(
                endpoint_names::END_SESSION,
                route_paths::END_SESSION_CALLBACK,
            )?
            .add_endpoint::<EndSessionEndpoint>(
                endpoint_names::END_SESSION,
                route_paths::END_SESSION,
            )?
            .add_endpoint::<IntrospectionEndpoint>(
                endpoint_names::INTROSPECTION,
                route_paths::INTROSPECTION,
            )?
            .add_endpoint::<TokenRevocationEndpoint>(
                endpoint_names::REVOCATION,
                route_paths::REVOCATION,
            )?
            .add_endpoint::<TokenEndpoint>(endpoint_names::TOKEN, route_paths::TOKEN)?
            .add_endpoint::<UserInfoEndpoint>(endpoint_names::USER_INFO, route_paths::USER_INFO)?;

        log::debug!("compose:phase name=endpoints count={}", self.endpoints.len());
        Ok(self)
    }

    /// Add one protocol surface. Hosts use this for their own endpoints too.
    pub fn add_endpoint<H>(mut self, name: &str, path: &str) -> Result<Self, ConfigurationError>
    where
        H: EndpointHandler + Component + Upcast<H>,
    {
        self.endpoints
            .add_endpoint::<H>(&mut self.services, name, path)?;
        Ok(self)
    }

    /// Replaceable defaults for everything the endpoints depend on.
    pub fn add_pluggable_services(mut self) -> Self {
        use Lifetime::{Singleton, Transient};

        self.try_add::<dyn PersistedGrantService, DefaultPersistedGrantService>(Transient);
        self.try_add::<dyn KeyMaterialService, DefaultKeyMaterialService>(Transient);
        self.try_add::<dyn TokenService, DefaultTokenService>(Transient);
        self.try_add::<dyn TokenCreationService, DefaultTokenCreationService>(Transient);
        self.try_add::<dyn ClaimsService, DefaultClaimsService>(Transient);
        self.try_add::<dyn RefreshTokenService, DefaultRefreshTokenService>(Transient);
        self.try_add::<dyn DeviceFlowCodeService, DefaultDeviceFlowCodeService>(Transient);
        self.try_add::<dyn ConsentService, DefaultConsentService>(Transient);
        self.try_add::<dyn CorsPolicyService, DefaultCorsPolicyService>(Transient);
        self.try_add::<dyn ProfileService, DefaultProfileService>(Transient);

        // Each store signs with its own per-process key, so it has to be shared.
        self.try_add::<dyn MessageStore<LogoutMessage>, ProtectedDataMessageStore<LogoutMessage>>(
            Singleton,
        );
        self.try_add::<
            dyn MessageStore<LogoutNotificationContext>,
            ProtectedDataMessageStore<LogoutNotificationContext>,
        >(Singleton);
        self.try_add::<dyn MessageStore<ErrorMessage>, ProtectedDataMessageStore<ErrorMessage>>(
            Singleton,
        );

        self.try_add::<dyn InteractionService, DefaultInteractionService>(Transient);
        self.try_add::<dyn DeviceFlowInteractionService, DefaultDeviceFlowInteractionService>(
            Transient,
        );
        self.try_add::<dyn GrantStore<AuthorizationCode>, DefaultGrantStore<AuthorizationCode>>(
            Transient,
        );
        self.try_add::<dyn GrantStore<RefreshTokenGrant>, DefaultGrantStore<RefreshTokenGrant>>(
            Transient,
        );
        self.try_add::<dyn GrantStore<Token>, DefaultGrantStore<Token>>(Transient);
        self.try_add::<dyn GrantStore<Consent>, DefaultGrantStore<Consent>>(Transient);
        self.try_add::<dyn HandleGenerationService, DefaultHandleGenerationService>(Transient);
        self.try_add::<dyn PersistedGrantSerializer, JsonGrantSerializer>(Transient);
        self.try_add::<dyn EventService, DefaultEventService>(Transient);
        self.try_add::<dyn EventSink, LogEventSink>(Transient);
        self.try_add::<dyn UserCodeService, DefaultUserCodeService>(Transient);
        self.try_add::<dyn UserCodeGenerator, NumericUserCodeGenerator>(Transient);
        self.try_add::<dyn LogoutNotificationService, DefaultLogoutNotificationService>(Transient);
        self.try_add::<dyn BackChannelLogoutService, DefaultBackChannelLogoutService>(Transient);
        self.try_add::<dyn ResourceValidator, DefaultResourceValidator>(Transient);
        self.try_add::<dyn ScopeParser, DefaultScopeParser>(Transient);

        // Both send through the platform client. Nothing built in fetches
        // request objects; that client is for host-supplied validators.
        self.try_add::<JwtRequestUriHttpClient, JwtRequestUriHttpClient>(Singleton);
        self.try_add::<BackChannelLogoutHttpClient, BackChannelLogoutHttpClient>(Singleton);

        // Added unconditionally; the last registration is the one resolved.
        self.append::<dyn ClientSecretValidator, DefaultClientSecretValidator>(Transient);
        self.append::<dyn ApiSecretValidator, DefaultApiSecretValidator>(Transient);

        self.try_add::<dyn DeviceFlowThrottlingService, DistributedDeviceFlowThrottlingService>(
            Transient,
        );
        self.try_add::<dyn DistributedCache, MemoryDistributedCache>(Singleton);

        self.services
            .require::<dyn PersistedGrantStore>("DefaultGrantStore");
        self.services
            .require::<dyn DeviceFlowStore>("DefaultDeviceFlowCodeService");
        self.services
            .require::<dyn ClientStore>("DefaultClientSecretValidator");
        self.services
            .require::<dyn ResourceStore>("DefaultResourceValidator");
        log::debug!("compose:phase name=pluggable services={}", self.services.len());
        self
    }

    pub fn add_validators(mut self) -> Self {
        use Lifetime::Transient;

        self.try_add::<dyn RequestValidator<EndSessionRequest>, EndSessionRequestValidator>(
            Transient,
        );
        self.try_add::<dyn RequestValidator<RevocationRequest>, TokenRevocationRequestValidator>(
            Transient,
        );
        self.try_add::<dyn RequestValidator<AuthorizeRequest>, AuthorizeRequestValidator>(
            Transient,
        );
        self.try_add::<dyn RequestValidator<TokenRequest>, TokenRequestValidator>(Transient);
        self.try_add::<dyn RedirectUriValidator, StrictRedirectUriValidator>(Transient);
        self.try_add::<dyn TokenValidator, DefaultTokenValidator>(Transient);
        self.try_add::<dyn RequestValidator<IntrospectionRequest>, IntrospectionRequestValidator>(
            Transient,
        );
        self.try_add::<
            dyn ResourceOwnerPasswordValidator,
            NotSupportedResourceOwnerPasswordValidator,
        >(
            Transient,
        );
        self.try_add::<
            dyn CustomRequestValidator<TokenRequest>,
            DefaultCustomRequestValidator<TokenRequest>,
        >(Transient);
        self.try_add::<dyn RequestValidator<UserInfoRequest>, UserInfoRequestValidator>(Transient);
        self.try_add::<dyn ClientConfigurationValidator, DefaultClientConfigurationValidator>(
            Transient,
        );
        self.try_add::<
            dyn RequestValidator<DeviceAuthorizationRequest>,
            DeviceAuthorizationRequestValidator,
        >(Transient);
        self.try_add::<dyn DeviceCodeValidator, DefaultDeviceCodeValidator>(Transient);
        self.try_add::<dyn CustomTokenValidator, DefaultCustomTokenValidator>(Transient);
        self.try_add::<
            dyn CustomRequestValidator<AuthorizeRequest>,
            DefaultCustomRequestValidator<AuthorizeRequest>,
        >(Transient);
        log::debug!("compose:phase name=validators services={}", self.services.len());
        self
    }

    pub fn add_response_generators(mut self) -> Self {
        use Lifetime::Transient;

        self.try_add::<dyn TokenResponseGenerator, DefaultTokenResponseGenerator>(Transient);
        self.try_add::<dyn UserInfoResponseGenerator, DefaultUserInfoResponseGenerator>(Transient);
        self.try_add::<dyn IntrospectionResponseGenerator, DefaultIntrospectionResponseGenerator>(
            Transient,
        );
        self.try_add::<
            dyn AuthorizeInteractionResponseGenerator,
            DefaultAuthorizeInteractionResponseGenerator,
        >(Transient);
        self.try_add::<dyn AuthorizeResponseGenerator, DefaultAuthorizeResponseGenerator>(
            Transient,
        );
        self.try_add::<dyn DiscoveryResponseGenerator, DefaultDiscoveryResponseGenerator>(
            Transient,
        );
        self.try_add::<
            dyn TokenRevocationResponseGenerator,
            DefaultTokenRevocationResponseGenerator,
        >(Transient);
        self.try_add::<
            dyn DeviceAuthorizationResponseGenerator,
            DefaultDeviceAuthorizationResponseGenerator,
        >(Transient);
        log::debug!("compose:phase name=response_generators services={}", self.services.len());
        self
    }

    /// Basic authentication first, then the form body. The first parser that
    /// finds a secret wins.
    pub fn add_default_secret_parsers(mut self) -> Self {
        self.append::<dyn SecretParser, BasicAuthenticationSecretParser>(Lifetime::Transient);
        self.append::<dyn SecretParser, PostBodySecretParser>(Lifetime::Transient);
        self
    }

    pub fn add_default_secret_validators(mut self) -> Self {
        self.append::<dyn SecretValidator, HashedSharedSecretValidator>(Lifetime::Transient);
        self
    }

    // -----------------------------------------------------------------------
    // Storage defaults
    // -----------------------------------------------------------------------

    /// In-memory grant and device flow storage. Everything is lost on restart.
    pub fn add_in_memory_persisted_grants(mut self) -> Self {
        if self.try_add::<dyn PersistedGrantStore, InMemoryPersistedGrantStore>(Lifetime::Singleton)
        {
            log::warn!(
                "compose:storage capability=PersistedGrantStore binding=in_memory ({})",
                NOT_FOR_PRODUCTION
            );
        }
        if self.try_add::<dyn DeviceFlowStore, InMemoryDeviceFlowStore>(Lifetime::Singleton) {
            log::warn!(
                "compose:storage capability=DeviceFlowStore binding=in_memory ({})",
                NOT_FOR_PRODUCTION
            );
        }
        self
    }

    /// Clients from `ServerOptions::clients`.
    pub fn add_in_memory_clients(mut self) -> Self {
        if self.try_add::<dyn ClientStore, InMemoryClientStore>(Lifetime::Singleton) {
            log::warn!(
                "compose:storage capability=ClientStore binding=in_memory clients={} ({})",
                self.options.clients.len(),
                NOT_FOR_PRODUCTION
            );
        }
        self
    }

    /// Identity resources, API resources and API scopes from the options.
    pub fn add_in_memory_resources(mut self) -> Self {
        if self.try_add::<dyn ResourceStore, InMemoryResourceStore>(Lifetime::Singleton) {
            log::warn!(
                "compose:storage capability=ResourceStore binding=in_memory ({})",
                NOT_FOR_PRODUCTION
            );
        }
        self
    }

    /// A signing key generated at startup. Tokens it signed stop validating
    /// once the process exits.
    pub fn add_developer_signing_credential(mut self) -> Self {
        if self.try_add::<dyn SigningCredentialStore, DevelopmentSigningCredentialStore>(
            Lifetime::Singleton,
        ) {
            log::warn!(
                "compose:storage capability=SigningCredentialStore binding=development ({})",
                NOT_FOR_PRODUCTION
            );
        }
        self
    }

    /// Every storage default a bare server needs to answer requests.
    pub fn add_storage_defaults(self) -> Self {
        self.add_in_memory_persisted_grants()
            .add_in_memory_clients()
            .add_in_memory_resources()
            .add_developer_signing_credential()
    }

    /// Freeze the registrations. Fails if a recorded prerequisite is missing.
    pub fn build(mut self) -> TollgateResult<IdentityServer> {
        let endpoints = Arc::new(self.endpoints);
        self.services.replace(Registration::instance(endpoints.clone()));
        let registrations = self.services.len();
        let provider = self.services.build()?;
        log::info!(
            "compose:build registrations={} endpoints={}",
            registrations,
            endpoints.len()
        );
        Ok(IdentityServer::new(provider, endpoints, self.options))
    }
}
