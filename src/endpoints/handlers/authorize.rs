use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use super::{check_method, ErrorPage, HandlerResult};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::{EndpointHandler, RedirectResult, RequestContext};
use crate::protocol::constants::{ensure_leading_slash, route_paths};
use crate::protocol::messages::AuthorizeRequest;
use crate::protocol::models::Principal;
use crate::protocol::{ProtocolError, Validated};
use crate::response::{
    AuthorizeInteractionResponseGenerator, AuthorizeResponseGenerator, InteractionResponse,
};
use crate::services::{AuthenticationService, UserSession};
use crate::validation::RequestValidator;

/// The authorize pipeline shared by the front door and the callback the login
/// and consent pages return to.
struct AuthorizeFlow {
    options: Arc<ServerOptions>,
    validator: Arc<dyn RequestValidator<AuthorizeRequest>>,
    authentication: Arc<dyn AuthenticationService>,
    session: Arc<dyn UserSession>,
    interaction: Arc<dyn AuthorizeInteractionResponseGenerator>,
    responses: Arc<dyn AuthorizeResponseGenerator>,
    error_page: ErrorPage,
}

impl Component for AuthorizeFlow {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        Ok(Self {
            options: options.clone(),
            validator: resolver.resolve()?,
            authentication: resolver.resolve()?,
            session: resolver.resolve()?,
            interaction: resolver.resolve()?,
            responses: resolver.resolve()?,
            error_page: ErrorPage {
                options,
                errors: resolver.resolve()?,
                clock: resolver.resolve()?,
            },
        })
    }
}

impl AuthorizeFlow {
    /// Local URL that resumes this request once the user is done with a page.
    fn return_url(params: &HashMap<String, String>) -> String {
        let sorted: BTreeMap<_, _> = params.iter().collect();
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in sorted {
            query.append_pair(k, v);
        }
        format!(
            "{}?{}",
            ensure_leading_slash(route_paths::AUTHORIZE_CALLBACK),
            query.finish()
        )
    }

    fn interaction_page(&self, page: &str, params: &HashMap<String, String>) -> HandlerResult {
        let return_url = Self::return_url(params);
        let parameter = self.options.user_interaction.login_return_url_parameter.as_str();
        Ok(Box::new(RedirectResult::with_query(page, &[(parameter, return_url.as_str())])))
    }

    fn client_error(
        &self,
        validated: &Validated<AuthorizeRequest>,
        error: ProtocolError,
    ) -> HandlerResult {
        log::info!(
            "authorize:error client={} error={}",
            validated.request.client_id,
            error.error
        );
        let mut params = vec![
            ("error", error.error.as_str()),
            ("error_description", error.error_description.as_str()),
        ];
        if let Some(state) = &validated.request.state {
            params.push(("state", state.as_str()));
        }
        Ok(Box::new(RedirectResult::with_query(&validated.request.redirect_uri, &params)))
    }

    fn process(&self, context: &RequestContext, params: HashMap<String, String>) -> HandlerResult {
        let request = AuthorizeRequest::from_params(&params);
        // The redirect URI is unproven until validation succeeds, so failures
        // go to the local error page rather than back to the client.
        let mut validated = match self.validator.validate(context, request) {
            Ok(validated) => validated,
            Err(error) => return self.error_page.redirect(&error),
        };

        let user: Option<Principal> = self
            .authentication
            .authenticate(context, &self.options.authentication.cookie_scheme);
        let pages = &self.options.user_interaction;
        let user = match self.interaction.process(&validated, user.as_ref()) {
            InteractionResponse::Login => return self.interaction_page(&pages.login_url, &params),
            InteractionResponse::Consent => {
                return self.interaction_page(&pages.consent_url, &params)
            }
            InteractionResponse::Error(error) => return self.client_error(&validated, error),
            InteractionResponse::None => match user {
                Some(user) => user,
                None => return self.interaction_page(&pages.login_url, &params),
            },
        };

        validated.subject = Some(user);
        let response = self.responses.process(&validated)?;
        self.session.add_client_id(&validated.request.client_id);
        Ok(Box::new(RedirectResult::with_query(
            &response.redirect_uri,
            &response.redirect_params(),
        )))
    }
}

/// `GET|POST /connect/authorize`.
pub struct AuthorizeEndpoint {
    flow: AuthorizeFlow,
}

impl Component for AuthorizeEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            flow: AuthorizeFlow::construct(resolver)?,
        })
    }
}

#[async_trait]
impl EndpointHandler for AuthorizeEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET, Method::POST]) {
            return Ok(rejected);
        }
        self.flow.process(context, context.params().clone())
    }
}

/// `GET /connect/authorize/callback`: where login and consent pages send the
/// user back.
pub struct AuthorizeCallbackEndpoint {
    flow: AuthorizeFlow,
}

impl Component for AuthorizeCallbackEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            flow: AuthorizeFlow::construct(resolver)?,
        })
    }
}

#[async_trait]
impl EndpointHandler for AuthorizeCallbackEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET]) {
            return Ok(rejected);
        }
        // The prompt was honored on the way out. Keeping it would send a
        // `prompt=login` request back to the login page forever.
        let mut params = context.params().clone();
        params.remove("prompt");
        self.flow.process(context, params)
    }
}
