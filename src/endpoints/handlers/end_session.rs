use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use super::{check_method, HandlerResult};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::endpoints::{EndpointHandler, HtmlResult, RedirectResult, RequestContext};
use crate::protocol::constants::DEFAULT_CHECK_SESSION_COOKIE_NAME;
use crate::protocol::messages::EndSessionRequest;
use crate::protocol::models::{LogoutMessage, LogoutNotificationContext, Message};
use crate::protocol::Validated;
use crate::services::logout::BackChannelLogoutService;
use crate::services::messages::MessageStore;
use crate::services::{AuthenticationService, Clock, Event, EventService, UserSession};
use crate::validation::RequestValidator;

/// `GET|POST /connect/endsession` (OIDC RP-Initiated Logout).
///
/// Records what is being logged out and hands the browser to the host's
/// logout page. Signing the user out is the page's job.
pub struct EndSessionEndpoint {
    options: Arc<ServerOptions>,
    validator: Arc<dyn RequestValidator<EndSessionRequest>>,
    authentication: Arc<dyn AuthenticationService>,
    session: Arc<dyn UserSession>,
    logouts: Arc<dyn MessageStore<LogoutMessage>>,
    clock: Arc<dyn Clock>,
}

impl Component for EndSessionEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            options: resolver.resolve()?,
            validator: resolver.resolve()?,
            authentication: resolver.resolve()?,
            session: resolver.resolve()?,
            logouts: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for EndSessionEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET, Method::POST]) {
            return Ok(rejected);
        }
        let params = context.params();
        let request = EndSessionRequest {
            id_token_hint: params.get("id_token_hint").cloned(),
            post_logout_redirect_uri: params.get("post_logout_redirect_uri").cloned(),
            state: params.get("state").cloned(),
        };
        // A bad hint must not keep the user signed in: log out without
        // returning to the client.
        let validated = self.validator.validate(context, request).unwrap_or_else(|error| {
            log::warn!(
                "endsession:validate error={} desc={}",
                error.error,
                error.error_description
            );
            Validated::new(EndSessionRequest::default())
        });

        let user = self
            .authentication
            .authenticate(context, &self.options.authentication.cookie_scheme);
        let subject_id = user
            .map(|u| u.subject)
            .or_else(|| validated.subject.as_ref().map(|s| s.subject.clone()));
        let client_id = validated.client.as_ref().map(|c| c.client_id.clone());
        let message = LogoutMessage {
            post_logout_redirect_uri: client_id
                .as_ref()
                .and(validated.request.post_logout_redirect_uri.clone()),
            client_id,
            subject_id,
            session_id: self.session.session_id(),
            client_ids: self.session.client_ids(),
        };
        let id = self.logouts.write(Message::new(message, self.clock.now()))?;

        let pages = &self.options.user_interaction;
        Ok(Box::new(RedirectResult::with_query(
            &pages.logout_url,
            &[(pages.logout_id_parameter.as_str(), id.as_str())],
        )))
    }
}

/// `GET /connect/endsession/callback`: the logout page calls this once the
/// user is signed out, and every participating client is told over the back
/// channel.
pub struct EndSessionCallbackEndpoint {
    options: Arc<ServerOptions>,
    logouts: Arc<dyn MessageStore<LogoutMessage>>,
    back_channel: Arc<dyn BackChannelLogoutService>,
    events: Arc<dyn EventService>,
}

impl Component for EndSessionCallbackEndpoint {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            options: resolver.resolve()?,
            logouts: resolver.resolve()?,
            back_channel: resolver.resolve()?,
            events: resolver.resolve()?,
        })
    }
}

#[async_trait]
impl EndpointHandler for EndSessionCallbackEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET]) {
            return Ok(rejected);
        }
        let parameter = &self.options.user_interaction.logout_id_parameter;
        let message = context
            .query
            .get(parameter)
            .and_then(|id| self.logouts.read(id))
            .map(|m| m.data);

        let mut notified = 0;
        if let Some(LogoutMessage {
            subject_id: Some(subject_id),
            session_id: Some(session_id),
            client_ids,
            ..
        }) = message
        {
            let notification = LogoutNotificationContext {
                subject_id: subject_id.clone(),
                session_id,
                client_ids,
            };
            let issuer = context.issuer(&self.options);
            notified = self
                .back_channel
                .send_logout_notifications(&issuer, &notification)
                .await;
            self.events.raise(Event::user_logout(&subject_id));
        }
        log::info!("endsession:callback notified={}", notified);
        Ok(Box::new(HtmlResult {
            html: "<!DOCTYPE html><html><body></body></html>".to_string(),
        }))
    }
}

/// `GET /connect/checksession`: the OP iframe of OIDC Session Management.
pub struct CheckSessionEndpoint;

impl Component for CheckSessionEndpoint {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

impl CheckSessionEndpoint {
    fn page(cookie_name: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>check session</title></head>
<body>
<script>
(function () {{
  function sessionState() {{
    var match = document.cookie.match(/(?:^|; ){cookie}=([^;]*)/);
    return match ? decodeURIComponent(match[1]) : "";
  }}
  window.addEventListener("message", function (e) {{
    if (typeof e.data !== "string") {{ return; }}
    var parts = e.data.split(" ");
    if (parts.length !== 2) {{ e.source.postMessage("error", e.origin); return; }}
    e.source.postMessage(parts[1] === sessionState() ? "unchanged" : "changed", e.origin);
  }}, false);
}})();
</script>
</body>
</html>"#,
            cookie = cookie_name.replace('.', "\\.")
        )
    }
}

#[async_trait]
impl EndpointHandler for CheckSessionEndpoint {
    async fn process(&self, context: &RequestContext) -> HandlerResult {
        if let Some(rejected) = check_method(context, &[Method::GET]) {
            return Ok(rejected);
        }
        Ok(Box::new(HtmlResult {
            html: Self::page(DEFAULT_CHECK_SESSION_COOKIE_NAME),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_session_page_reads_the_session_cookie() {
        let page = CheckSessionEndpoint::page("idsrv.session");
        assert!(page.contains(r"idsrv\.session=([^;]*)"));
        assert!(page.contains("\"unchanged\""));
    }
}
