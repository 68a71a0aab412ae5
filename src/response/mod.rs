//! Response generators: turn a validated request into the protocol response
//! the endpoint renders.

mod authorize;
mod device;
mod discovery;
mod introspection;
mod revocation;
mod token;
mod userinfo;

pub use authorize::{
    AuthorizeInteractionResponseGenerator, AuthorizeResponse, AuthorizeResponseGenerator,
    DefaultAuthorizeInteractionResponseGenerator, DefaultAuthorizeResponseGenerator,
    InteractionResponse, AUTHORIZATION_CODE_LIFETIME,
};
pub use device::{
    DefaultDeviceAuthorizationResponseGenerator, DeviceAuthorizationResponse,
    DeviceAuthorizationResponseGenerator,
};
pub use discovery::{DefaultDiscoveryResponseGenerator, DiscoveryResponseGenerator};
pub use introspection::{DefaultIntrospectionResponseGenerator, IntrospectionResponseGenerator};
pub use revocation::{
    DefaultTokenRevocationResponseGenerator, RevocationOutcome, TokenRevocationResponseGenerator,
};
pub use token::{DefaultTokenResponseGenerator, TokenResponse, TokenResponseGenerator};
pub use userinfo::{DefaultUserInfoResponseGenerator, UserInfoResponseGenerator};
