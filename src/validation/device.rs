use std::sync::Arc;

use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::constants::errors;
use crate::protocol::models::{Client, DeviceCode};
use crate::protocol::ProtocolError;
use crate::services::device::{DeviceFlowCodeService, DeviceFlowThrottlingService};
use crate::services::Clock;

/// Checks a polled device code (RFC 8628 §3.5).
pub trait DeviceCodeValidator: Send + Sync {
    /// The approved authorization, consumed on success.
    fn validate(&self, device_code: &str, client: &Client) -> Result<DeviceCode, ProtocolError>;
}

pub struct DefaultDeviceCodeValidator {
    codes: Arc<dyn DeviceFlowCodeService>,
    throttling: Arc<dyn DeviceFlowThrottlingService>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultDeviceCodeValidator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            codes: resolver.resolve()?,
            throttling: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultDeviceCodeValidator => dyn DeviceCodeValidator);

impl DeviceCodeValidator for DefaultDeviceCodeValidator {
    fn validate(&self, device_code: &str, client: &Client) -> Result<DeviceCode, ProtocolError> {
        let details = self
            .codes
            .find_by_device_code(device_code)
            .ok_or_else(|| ProtocolError::invalid_grant("unknown device code"))?;

        if details.client_id != client.client_id {
            log::warn!(
                "device:validate client_mismatch expected={} got={}",
                details.client_id,
                client.client_id
            );
            return Err(ProtocolError::invalid_grant("device code issued to another client"));
        }
        if details.is_expired(self.clock.now()) {
            self.codes.remove_by_device_code(device_code);
            return Err(ProtocolError::new(errors::EXPIRED_TOKEN, "device code expired"));
        }
        if self.throttling.should_slow_down(device_code, &details) {
            return Err(ProtocolError::new(errors::SLOW_DOWN, "polling too frequently"));
        }
        if !details.is_authorized {
            return Err(ProtocolError::new(
                errors::AUTHORIZATION_PENDING,
                "user has not yet approved the request",
            ));
        }
        if details.subject.is_none() {
            return Err(ProtocolError::new(
                errors::ACCESS_DENIED,
                "no user attached to device code",
            ));
        }

        self.codes.remove_by_device_code(device_code);
        Ok(details)
    }
}
