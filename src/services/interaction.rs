//! Entry points for the host's own login, consent, logout and error pages.

use std::sync::Arc;

use super::device::DeviceFlowCodeService;
use super::messages::MessageStore;
use super::return_url::ReturnUrlParsers;
use super::{Clock, ConsentService, PersistedGrantService, UserSession};
use crate::container::{Component, ResolutionError, Resolver};
use crate::error::TollgateResult;
use crate::protocol::messages::AuthorizeRequest;
use crate::protocol::models::{DeviceCode, ErrorMessage, LogoutMessage, Message, Principal};
use crate::protocol::ProtocolError;
use crate::stores::ClientStore;

pub trait InteractionService: Send + Sync {
    fn authorization_context(&self, return_url: &str) -> Option<AuthorizeRequest>;
    fn is_valid_return_url(&self, return_url: &str) -> bool;
    fn error_context(&self, error_id: &str) -> Option<ErrorMessage>;
    /// The pending logout identified by `logout_id`, or one describing the
    /// current session when there is none.
    fn logout_context(&self, logout_id: Option<&str>) -> LogoutMessage;
    /// Snapshot the current session for a later logout. `None` when nobody is
    /// signed in or no client needs telling.
    fn create_logout_context(&self) -> TollgateResult<Option<String>>;
    fn grant_consent(
        &self,
        subject: &Principal,
        client_id: &str,
        scopes: &[String],
    ) -> TollgateResult<()>;
    fn revoke_user_consent(&self, subject_id: &str, client_id: &str) -> TollgateResult<usize>;
}

pub struct DefaultInteractionService {
    return_urls: Arc<ReturnUrlParsers>,
    errors: Arc<dyn MessageStore<ErrorMessage>>,
    logouts: Arc<dyn MessageStore<LogoutMessage>>,
    session: Arc<dyn UserSession>,
    consent: Arc<dyn ConsentService>,
    clients: Arc<dyn ClientStore>,
    grants: Arc<dyn PersistedGrantService>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultInteractionService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            return_urls: resolver.resolve()?,
            errors: resolver.resolve()?,
            logouts: resolver.resolve()?,
            session: resolver.resolve()?,
            consent: resolver.resolve()?,
            clients: resolver.resolve()?,
            grants: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultInteractionService => dyn InteractionService);

impl InteractionService for DefaultInteractionService {
    fn authorization_context(&self, return_url: &str) -> Option<AuthorizeRequest> {
        self.return_urls.parse(return_url)
    }

    fn is_valid_return_url(&self, return_url: &str) -> bool {
        self.return_urls.is_valid_return_url(return_url)
    }

    fn error_context(&self, error_id: &str) -> Option<ErrorMessage> {
        self.errors.read(error_id).map(|m| m.data)
    }

    fn logout_context(&self, logout_id: Option<&str>) -> LogoutMessage {
        if let Some(message) = logout_id.and_then(|id| self.logouts.read(id)) {
            return message.data;
        }
        match self.session.user() {
            Some(user) => LogoutMessage {
                subject_id: Some(user.subject),
                session_id: self.session.session_id(),
                client_ids: self.session.client_ids(),
                ..Default::default()
            },
            None => LogoutMessage::default(),
        }
    }

    fn create_logout_context(&self) -> TollgateResult<Option<String>> {
        let Some(user) = self.session.user() else {
            return Ok(None);
        };
        let client_ids = self.session.client_ids();
        if client_ids.is_empty() {
            return Ok(None);
        }
        let message = LogoutMessage {
            subject_id: Some(user.subject),
            session_id: self.session.session_id(),
            client_ids,
            ..Default::default()
        };
        self.logouts
            .write(Message::new(message, self.clock.now()))
            .map(Some)
    }

    fn grant_consent(
        &self,
        subject: &Principal,
        client_id: &str,
        scopes: &[String],
    ) -> TollgateResult<()> {
        let Some(client) = self.clients.find_client_by_id(client_id) else {
            log::warn!("interaction:consent unknown client={}", client_id);
            return Ok(());
        };
        self.consent.update_consent(subject, &client, Some(scopes))
    }

    fn revoke_user_consent(&self, subject_id: &str, client_id: &str) -> TollgateResult<usize> {
        self.grants.remove_all_grants(subject_id, Some(client_id))
    }
}

// ---------------------------------------------------------------------------
// Device flow
// ---------------------------------------------------------------------------

pub trait DeviceFlowInteractionService: Send + Sync {
    /// The pending authorization behind a user code, if still usable.
    fn authorization_context(&self, user_code: &str) -> Option<DeviceCode>;
    /// Record the user's decision for `user_code`.
    fn handle_request(
        &self,
        user_code: &str,
        subject: &Principal,
        scopes_consented: &[String],
    ) -> Result<(), ProtocolError>;
}

pub struct DefaultDeviceFlowInteractionService {
    codes: Arc<dyn DeviceFlowCodeService>,
    session: Arc<dyn UserSession>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultDeviceFlowInteractionService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            codes: resolver.resolve()?,
            session: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultDeviceFlowInteractionService => dyn DeviceFlowInteractionService);

impl DeviceFlowInteractionService for DefaultDeviceFlowInteractionService {
    fn authorization_context(&self, user_code: &str) -> Option<DeviceCode> {
        self.codes
            .find_by_user_code(user_code)
            .filter(|c| !c.is_authorized && !c.is_expired(self.clock.now()))
    }

    fn handle_request(
        &self,
        user_code: &str,
        subject: &Principal,
        scopes_consented: &[String],
    ) -> Result<(), ProtocolError> {
        let mut code = self
            .authorization_context(user_code)
            .ok_or_else(|| ProtocolError::invalid_request("unknown or expired user code"))?;

        code.scopes.retain(|s| scopes_consented.contains(s));
        code.is_authorized = true;
        code.subject = Some(subject.clone());

        self.codes
            .update_by_user_code(user_code, code.clone())
            .map_err(|e| ProtocolError::server_error(e.to_string()))?;
        self.session.add_client_id(&code.client_id);
        log::info!(
            "device:authorized client={} sub={} scopes={}",
            code.client_id,
            subject.subject,
            code.scopes.join(" ")
        );
        Ok(())
    }
}
