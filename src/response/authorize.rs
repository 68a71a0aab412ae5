use std::sync::Arc;

use crate::container::{Component, ResolutionError, Resolver};
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::errors;
use crate::protocol::messages::AuthorizeRequest;
use crate::protocol::models::{AuthorizationCode, Principal};
use crate::protocol::{ProtocolError, Validated};
use crate::services::{Clock, ConsentService, GrantStore, ProfileService};

pub const AUTHORIZATION_CODE_LIFETIME: u64 = 300;

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

/// What the user has to do before the authorization request can complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionResponse {
    /// Nothing: issue the code.
    None,
    Login,
    Consent,
    Error(ProtocolError),
}

pub trait AuthorizeInteractionResponseGenerator: Send + Sync {
    fn process(
        &self,
        request: &Validated<AuthorizeRequest>,
        user: Option<&Principal>,
    ) -> InteractionResponse;
}

pub struct DefaultAuthorizeInteractionResponseGenerator {
    consent: Arc<dyn ConsentService>,
    profile: Arc<dyn ProfileService>,
}

impl Component for DefaultAuthorizeInteractionResponseGenerator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            consent: resolver.resolve()?,
            profile: resolver.resolve()?,
        })
    }
}

crate::provides!(
    DefaultAuthorizeInteractionResponseGenerator => dyn AuthorizeInteractionResponseGenerator
);

impl AuthorizeInteractionResponseGenerator for DefaultAuthorizeInteractionResponseGenerator {
    fn process(
        &self,
        request: &Validated<AuthorizeRequest>,
        user: Option<&Principal>,
    ) -> InteractionResponse {
        let prompt = request.request.prompt.as_deref().unwrap_or_default();
        let prompt_none = prompt.split_whitespace().any(|p| p == "none");

        let user = match user {
            Some(user) if !prompt.split_whitespace().any(|p| p == "login") => user,
            _ if prompt_none => {
                return InteractionResponse::Error(ProtocolError::new(
                    errors::LOGIN_REQUIRED,
                    "user is not signed in",
                ))
            }
            _ => return InteractionResponse::Login,
        };
        let Some(client) = request.client.as_ref() else {
            return InteractionResponse::Error(ProtocolError::server_error("request has no client"));
        };
        if !self.profile.is_active(user, client) {
            log::info!("authorize:interaction inactive user sub={}", user.subject);
            return InteractionResponse::Login;
        }

        let forced = prompt.split_whitespace().any(|p| p == "consent");
        if forced || self.consent.requires_consent(user, client, &request.scopes) {
            if prompt_none {
                return InteractionResponse::Error(ProtocolError::new(
                    errors::CONSENT_REQUIRED,
                    "user has not consented",
                ));
            }
            return InteractionResponse::Consent;
        }
        InteractionResponse::None
    }
}

// ---------------------------------------------------------------------------
// Code response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeResponse {
    pub redirect_uri: String,
    pub code: String,
    pub state: Option<String>,
}

impl AuthorizeResponse {
    /// Query-mode redirect back to the client.
    pub fn redirect_params(&self) -> Vec<(&str, &str)> {
        let mut params = vec![("code", self.code.as_str())];
        if let Some(state) = &self.state {
            params.push(("state", state.as_str()));
        }
        params
    }
}

pub trait AuthorizeResponseGenerator: Send + Sync {
    fn process(&self, request: &Validated<AuthorizeRequest>) -> TollgateResult<AuthorizeResponse>;
}

pub struct DefaultAuthorizeResponseGenerator {
    codes: Arc<dyn GrantStore<AuthorizationCode>>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultAuthorizeResponseGenerator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            codes: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultAuthorizeResponseGenerator => dyn AuthorizeResponseGenerator);

impl AuthorizeResponseGenerator for DefaultAuthorizeResponseGenerator {
    fn process(&self, request: &Validated<AuthorizeRequest>) -> TollgateResult<AuthorizeResponse> {
        let (client, subject) = match (&request.client, &request.subject) {
            (Some(client), Some(subject)) => (client, subject),
            _ => {
                return Err(TollgateError::Other(
                    "authorization code needs a client and a subject".into(),
                ))
            }
        };
        let code = AuthorizationCode {
            client_id: client.client_id.clone(),
            subject: subject.clone(),
            redirect_uri: request.request.redirect_uri.clone(),
            scopes: request.scopes.clone(),
            code_challenge: request.request.code_challenge.clone().filter(|c| !c.is_empty()),
            nonce: request.request.nonce.clone(),
            creation_time: self.clock.now(),
            lifetime: AUTHORIZATION_CODE_LIFETIME,
        };
        let handle = self.codes.store(&code)?;
        log::debug!(
            "authorize:code client={} sub={}",
            client.client_id,
            subject.subject
        );
        Ok(AuthorizeResponse {
            redirect_uri: request.request.redirect_uri.clone(),
            code: handle,
            state: request.request.state.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{Client, Consent};
    use crate::services::{
        DefaultConsentService, DefaultGrantStore, DefaultHandleGenerationService,
        DefaultProfileService, JsonGrantSerializer, SystemClock,
    };
    use crate::stores::{InMemoryPersistedGrantStore, PersistedGrantStore};

    fn generator(
        require_consent: bool,
    ) -> (DefaultAuthorizeInteractionResponseGenerator, Validated<AuthorizeRequest>) {
        let raw: Arc<dyn PersistedGrantStore> = Arc::new(InMemoryPersistedGrantStore::new());
        let store: Arc<dyn GrantStore<Consent>> = Arc::new(DefaultGrantStore::<Consent>::new(
            raw,
            Arc::new(DefaultHandleGenerationService),
            Arc::new(JsonGrantSerializer),
        ));
        let mut services = crate::container::ServiceCollection::new();
        services
            .add_instance::<dyn GrantStore<Consent>>(store)
            .add_singleton::<dyn Clock, SystemClock>()
            .add_singleton::<dyn ConsentService, DefaultConsentService>();
        let provider = services.build().unwrap();

        let mut client = Client::new("web");
        client.require_consent = require_consent;
        let request = Validated::new(AuthorizeRequest::default())
            .with_client(client)
            .with_scopes(vec!["openid".into()]);
        (
            DefaultAuthorizeInteractionResponseGenerator {
                consent: provider.resolve().unwrap(),
                profile: Arc::new(DefaultProfileService),
            },
            request,
        )
    }

    #[test]
    fn anonymous_user_must_log_in() {
        let (generator, mut request) = generator(false);
        assert_eq!(generator.process(&request, None), InteractionResponse::Login);

        request.request.prompt = Some("none".into());
        match generator.process(&request, None) {
            InteractionResponse::Error(e) => assert_eq!(e.error, "login_required"),
            other => panic!("expected login_required, got {:?}", other),
        }
    }

    #[test]
    fn signed_in_user_goes_straight_through_or_to_consent() {
        let alice = Principal::new("alice");
        let (generator, mut request) = generator(false);
        assert_eq!(generator.process(&request, Some(&alice)), InteractionResponse::None);

        request.request.prompt = Some("login".into());
        assert_eq!(generator.process(&request, Some(&alice)), InteractionResponse::Login);

        let (generator, request) = self::generator(true);
        assert_eq!(generator.process(&request, Some(&alice)), InteractionResponse::Consent);
    }

    #[test]
    fn code_is_stored_with_the_request_details() {
        let codes: Arc<dyn GrantStore<AuthorizationCode>> =
            Arc::new(DefaultGrantStore::<AuthorizationCode>::new(
                Arc::new(InMemoryPersistedGrantStore::new()),
                Arc::new(DefaultHandleGenerationService),
                Arc::new(JsonGrantSerializer),
            ));
        let generator = DefaultAuthorizeResponseGenerator {
            codes: codes.clone(),
            clock: Arc::new(SystemClock),
        };
        let request = Validated::new(AuthorizeRequest {
            redirect_uri: "https://web.example.com/cb".into(),
            state: Some("xyz".into()),
            nonce: Some("n".into()),
            code_challenge: Some("challenge".into()),
            ..Default::default()
        })
        .with_client(Client::new("web"))
        .with_subject(Principal::new("alice"))
        .with_scopes(vec!["openid".into()]);

        let response = generator.process(&request).unwrap();
        assert_eq!(
            response.redirect_params(),
            vec![("code", response.code.as_str()), ("state", "xyz")]
        );
        let stored = codes.get(&response.code).unwrap();
        assert_eq!(stored.subject.subject, "alice");
        assert_eq!(stored.code_challenge.as_deref(), Some("challenge"));

        let anonymous = Validated::new(AuthorizeRequest::default()).with_client(Client::new("web"));
        assert!(generator.process(&anonymous).is_err());
    }
}
