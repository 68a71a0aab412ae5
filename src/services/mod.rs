//! Capability contracts consumed by the endpoints, and the default
//! implementations wired in during assembly.

mod authentication;
mod cache;
mod claims;
mod clock;
mod consent;
mod cors;
pub mod device;
mod events;
mod grants;
pub mod http;
pub mod interaction;
mod keys;
pub mod logout;
pub mod messages;
pub mod resources;
pub mod return_url;
mod session;
pub mod tokens;
pub mod tools;

pub use authentication::{
    AuthenticationHandlerProvider, AuthenticationService, ConfiguredHandlerProvider,
    CookieAuthenticationService, FederatedSignoutHandlerProvider,
    IdentityServerAuthenticationService, SchemeHandler,
};
pub use cache::{DistributedCache, MemoryDistributedCache};
pub use claims::{ClaimsService, DefaultClaimsService, DefaultProfileService, ProfileService};
pub use clock::{Clock, FixedClock, SystemClock};
pub use consent::{ConsentService, DefaultConsentService};
pub use cors::{
    CorsPolicy, CorsPolicyProvider, CorsPolicyService, DefaultCorsPolicyProvider,
    DefaultCorsPolicyService, IdentityServerCorsPolicyProvider,
};
pub use events::{DefaultEventService, Event, EventCategory, EventService, EventSink, LogEventSink};
pub use grants::{
    DefaultGrantStore, DefaultHandleGenerationService, DefaultPersistedGrantService, GrantStore,
    GrantSummary, HandleGenerationService, JsonGrantSerializer, PersistedGrantSerializer,
    PersistedGrantService, DEFAULT_HANDLE_LENGTH,
};
pub use keys::{
    DefaultKeyMaterialService, DevelopmentSigningCredentialStore, JsonWebKey, KeyMaterialService,
    SigningCredential, SigningCredentialStore, SIGNING_ALGORITHM,
};
pub use session::{DefaultUserSession, UserSession};
pub use tokens::{
    DefaultRefreshTokenService, DefaultTokenCreationService, DefaultTokenService,
    RefreshTokenService, TokenCreationRequest, TokenCreationService, TokenService,
};
