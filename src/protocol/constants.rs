/// Logical endpoint names. Several paths may share one name
/// (e.g. authorize and its callback).
pub mod endpoint_names {
    pub const AUTHORIZE: &str = "Authorize";
    pub const TOKEN: &str = "Token";
    pub const DEVICE_AUTHORIZATION: &str = "DeviceAuthorization";
    pub const DISCOVERY: &str = "Discovery";
    pub const INTROSPECTION: &str = "Introspection";
    pub const REVOCATION: &str = "Revocation";
    pub const END_SESSION: &str = "Endsession";
    pub const CHECK_SESSION: &str = "Checksession";
    pub const USER_INFO: &str = "Userinfo";
}

/// Protocol route paths, relative (no leading slash).
pub mod route_paths {
    pub const CONNECT_PATH_PREFIX: &str = "connect";
    pub const AUTHORIZE: &str = "connect/authorize";
    pub const AUTHORIZE_CALLBACK: &str = "connect/authorize/callback";
    pub const DISCOVERY_CONFIGURATION: &str = ".well-known/openid-configuration";
    pub const DISCOVERY_WEB_KEYS: &str = ".well-known/openid-configuration/jwks";
    pub const TOKEN: &str = "connect/token";
    pub const REVOCATION: &str = "connect/revocation";
    pub const USER_INFO: &str = "connect/userinfo";
    pub const INTROSPECTION: &str = "connect/introspect";
    pub const END_SESSION: &str = "connect/endsession";
    pub const END_SESSION_CALLBACK: &str = "connect/endsession/callback";
    pub const CHECK_SESSION: &str = "connect/checksession";
    pub const DEVICE_AUTHORIZATION: &str = "connect/deviceauthorization";
}

pub const DEFAULT_COOKIE_AUTHENTICATION_SCHEME: &str = "idsrv";
pub const EXTERNAL_COOKIE_AUTHENTICATION_SCHEME: &str = "idsrv.external";
pub const DEFAULT_CHECK_SESSION_COOKIE_NAME: &str = "idsrv.session";
pub const LOCAL_IDENTITY_PROVIDER: &str = "local";
pub const OPENID_SCOPE: &str = "openid";

pub mod grant_types {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const PASSWORD: &str = "password";
    pub const DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
}

pub mod persisted_grant_types {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const REFERENCE_TOKEN: &str = "reference_token";
    pub const USER_CONSENT: &str = "user_consent";
    pub const DEVICE_CODE: &str = "device_code";
}

pub mod claim_types {
    pub const SUBJECT: &str = "sub";
    pub const CLIENT_ID: &str = "client_id";
    pub const SCOPE: &str = "scope";
    pub const ISSUER: &str = "iss";
    pub const AUDIENCE: &str = "aud";
    pub const EXPIRATION: &str = "exp";
    pub const ISSUED_AT: &str = "iat";
    pub const NOT_BEFORE: &str = "nbf";
    pub const JWT_ID: &str = "jti";
    pub const AUTHENTICATION_TIME: &str = "auth_time";
    pub const IDENTITY_PROVIDER: &str = "idp";
    pub const AUTHENTICATION_METHOD: &str = "amr";
    pub const SESSION_ID: &str = "sid";
    pub const NAME: &str = "name";
}

pub mod errors {
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INVALID_CLIENT: &str = "invalid_client";
    pub const INVALID_GRANT: &str = "invalid_grant";
    pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
    pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
    pub const UNSUPPORTED_RESPONSE_TYPE: &str = "unsupported_response_type";
    pub const INVALID_SCOPE: &str = "invalid_scope";
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const LOGIN_REQUIRED: &str = "login_required";
    pub const CONSENT_REQUIRED: &str = "consent_required";
    pub const SLOW_DOWN: &str = "slow_down";
    pub const AUTHORIZATION_PENDING: &str = "authorization_pending";
    pub const EXPIRED_TOKEN: &str = "expired_token";
    pub const ACCESS_DENIED: &str = "access_denied";
    pub const INSUFFICIENT_SCOPE: &str = "insufficient_scope";
    pub const UNSUPPORTED_TOKEN_TYPE: &str = "unsupported_token_type";
    pub const SERVER_ERROR: &str = "server_error";
}

pub mod secret_types {
    pub const SHARED_SECRET: &str = "SharedSecret";
    /// Public client identified by `client_id` alone.
    pub const NO_SECRET: &str = "NoSecret";
}

pub mod authentication_methods {
    pub const BASIC: &str = "client_secret_basic";
    pub const POST_BODY: &str = "client_secret_post";
}

pub mod code_challenge_methods {
    pub const SHA256: &str = "S256";
}

pub mod token_type_hints {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

pub mod response_types {
    pub const CODE: &str = "code";
}

/// Prefix a path with `/` unless it already has one.
pub fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
