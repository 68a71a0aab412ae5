use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map};

use super::http::BackChannelLogoutHttpClient;
use super::tools::ServerTools;
use super::HandleGenerationService;
use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::constants::claim_types;
use crate::protocol::models::LogoutNotificationContext;
use crate::stores::ClientStore;

const LOGOUT_TOKEN_LIFETIME_SECS: i64 = 300;
const BACK_CHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

/// One client to be told that a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackChannelLogoutRequest {
    pub client_id: String,
    pub logout_uri: String,
    pub subject_id: String,
    pub session_id: String,
}

/// Works out which clients participated in a session and how to reach them.
pub trait LogoutNotificationService: Send + Sync {
    fn back_channel_logout_requests(
        &self,
        context: &LogoutNotificationContext,
    ) -> Vec<BackChannelLogoutRequest>;
}

pub struct DefaultLogoutNotificationService {
    clients: Arc<dyn ClientStore>,
}

impl Component for DefaultLogoutNotificationService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            clients: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultLogoutNotificationService => dyn LogoutNotificationService);

impl LogoutNotificationService for DefaultLogoutNotificationService {
    fn back_channel_logout_requests(
        &self,
        context: &LogoutNotificationContext,
    ) -> Vec<BackChannelLogoutRequest> {
        context
            .client_ids
            .iter()
            .filter_map(|id| self.clients.find_client_by_id(id))
            .filter(|c| c.enabled)
            .filter_map(|c| {
                let logout_uri = c.back_channel_logout_uri?;
                Some(BackChannelLogoutRequest {
                    client_id: c.client_id,
                    logout_uri,
                    subject_id: context.subject_id.clone(),
                    session_id: context.session_id.clone(),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Back-channel delivery
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BackChannelLogoutService: Send + Sync {
    /// Post a logout token to every participating client. Returns how many
    /// accepted it; failures are logged, never raised.
    async fn send_logout_notifications(
        &self,
        issuer: &str,
        context: &LogoutNotificationContext,
    ) -> usize;
}

pub struct DefaultBackChannelLogoutService {
    notifications: Arc<dyn LogoutNotificationService>,
    tools: Arc<ServerTools>,
    handles: Arc<dyn HandleGenerationService>,
    http: Arc<BackChannelLogoutHttpClient>,
}

impl DefaultBackChannelLogoutService {
    fn logout_token(&self, issuer: &str, request: &BackChannelLogoutRequest) -> Option<String> {
        let mut claims = Map::new();
        claims.insert(claim_types::ISSUER.into(), json!(issuer));
        claims.insert(claim_types::AUDIENCE.into(), json!(request.client_id));
        claims.insert(claim_types::SUBJECT.into(), json!(request.subject_id));
        claims.insert(claim_types::SESSION_ID.into(), json!(request.session_id));
        claims.insert(claim_types::JWT_ID.into(), json!(self.handles.create_handle(16)));
        claims.insert("events".into(), json!({ BACK_CHANNEL_LOGOUT_EVENT: {} }));
        match self.tools.issue_jwt(LOGOUT_TOKEN_LIFETIME_SECS, claims) {
            Ok(token) => Some(token),
            Err(e) => {
                log::error!("logout:token client={} error={}", request.client_id, e);
                None
            }
        }
    }
}

impl Component for DefaultBackChannelLogoutService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            notifications: resolver.resolve()?,
            tools: resolver.resolve()?,
            handles: resolver.resolve()?,
            http: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultBackChannelLogoutService => dyn BackChannelLogoutService);

#[async_trait]
impl BackChannelLogoutService for DefaultBackChannelLogoutService {
    async fn send_logout_notifications(
        &self,
        issuer: &str,
        context: &LogoutNotificationContext,
    ) -> usize {
        let mut delivered = 0;
        for request in self.notifications.back_channel_logout_requests(context) {
            let Some(token) = self.logout_token(issuer, &request) else {
                continue;
            };
            match self
                .http
                .post_form(&request.logout_uri, &[("logout_token", token.as_str())])
                .await
            {
                Ok(status) if status.is_success() => {
                    log::debug!("logout:back_channel client={} ok", request.client_id);
                    delivered += 1;
                }
                Ok(status) => {
                    log::warn!(
                        "logout:back_channel client={} status={}",
                        request.client_id,
                        status
                    );
                }
                Err(e) => {
                    log::warn!("logout:back_channel client={} error={}", request.client_id, e);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::Client;
    use crate::stores::InMemoryClientStore;

    #[test]
    fn only_clients_with_a_logout_uri_are_notified() {
        let mut web = Client::new("web");
        web.back_channel_logout_uri = Some("https://web.example.com/logout".into());
        let mut disabled = Client::new("old");
        disabled.enabled = false;
        disabled.back_channel_logout_uri = Some("https://old.example.com/logout".into());

        let service = DefaultLogoutNotificationService {
            clients: Arc::new(InMemoryClientStore::new(vec![
                web,
                Client::new("spa"),
                disabled,
            ])),
        };
        let requests = service.back_channel_logout_requests(&LogoutNotificationContext {
            subject_id: "alice".into(),
            session_id: "S1".into(),
            client_ids: vec!["web".into(), "spa".into(), "old".into(), "unknown".into()],
        });

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].client_id, "web");
        assert_eq!(requests[0].session_id, "S1");
    }
}
