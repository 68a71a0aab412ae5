use std::sync::Arc;

use super::{Clock, GrantStore};
use crate::container::{Component, ResolutionError, Resolver};
use crate::error::TollgateResult;
use crate::protocol::models::{Client, Consent, Principal};

pub trait ConsentService: Send + Sync {
    fn requires_consent(&self, subject: &Principal, client: &Client, scopes: &[String]) -> bool;
    /// Remember (or, with `None`, forget) what the user agreed to for `client`.
    fn update_consent(
        &self,
        subject: &Principal,
        client: &Client,
        scopes: Option<&[String]>,
    ) -> TollgateResult<()>;
}

pub struct DefaultConsentService {
    store: Arc<dyn GrantStore<Consent>>,
    clock: Arc<dyn Clock>,
}

impl DefaultConsentService {
    fn handle(subject: &Principal, client: &Client) -> String {
        format!("{}|{}", client.client_id, subject.subject)
    }
}

impl Component for DefaultConsentService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            store: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultConsentService => dyn ConsentService);

impl ConsentService for DefaultConsentService {
    fn requires_consent(&self, subject: &Principal, client: &Client, scopes: &[String]) -> bool {
        if !client.require_consent || scopes.is_empty() {
            return false;
        }
        match self.store.get(&Self::handle(subject, client)) {
            Some(consent) => {
                let expired = consent.expiration.is_some_and(|e| e <= self.clock.now());
                expired || !scopes.iter().all(|s| consent.scopes.contains(s))
            }
            None => true,
        }
    }

    fn update_consent(
        &self,
        subject: &Principal,
        client: &Client,
        scopes: Option<&[String]>,
    ) -> TollgateResult<()> {
        let handle = Self::handle(subject, client);
        match scopes {
            Some(scopes) if !scopes.is_empty() => {
                log::info!(
                    "consent:update sub={} client={} scopes={}",
                    subject.subject,
                    client.client_id,
                    scopes.join(" ")
                );
                self.store.store_as(
                    &handle,
                    &Consent {
                        subject_id: subject.subject.clone(),
                        client_id: client.client_id.clone(),
                        scopes: scopes.to_vec(),
                        creation_time: self.clock.now(),
                        expiration: None,
                    },
                )
            }
            _ => {
                log::info!(
                    "consent:remove sub={} client={}",
                    subject.subject,
                    client.client_id
                );
                self.store.remove(&handle);
                Ok(())
            }
        }
    }
}
