use std::sync::Arc;

use serde::Serialize;

use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::error::{TollgateError, TollgateResult};
use crate::protocol::constants::ensure_leading_slash;
use crate::protocol::messages::DeviceAuthorizationRequest;
use crate::protocol::models::DeviceCode;
use crate::protocol::Validated;
use crate::services::device::{DeviceFlowCodeService, UserCodeService};
use crate::services::Clock;

/// RFC 8628 §3.2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_in: u64,
    pub interval: u64,
}

pub trait DeviceAuthorizationResponseGenerator: Send + Sync {
    fn process(
        &self,
        issuer: &str,
        request: &Validated<DeviceAuthorizationRequest>,
    ) -> TollgateResult<DeviceAuthorizationResponse>;
}

pub struct DefaultDeviceAuthorizationResponseGenerator {
    options: Arc<ServerOptions>,
    user_codes: Arc<dyn UserCodeService>,
    device_codes: Arc<dyn DeviceFlowCodeService>,
    clock: Arc<dyn Clock>,
}

impl Component for DefaultDeviceAuthorizationResponseGenerator {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            options: resolver.resolve()?,
            user_codes: resolver.resolve()?,
            device_codes: resolver.resolve()?,
            clock: resolver.resolve()?,
        })
    }
}

crate::provides!(
    DefaultDeviceAuthorizationResponseGenerator => dyn DeviceAuthorizationResponseGenerator
);

impl DefaultDeviceAuthorizationResponseGenerator {
    /// A user code nobody else is currently holding.
    fn unique_user_code(&self) -> TollgateResult<String> {
        let code_type = &self.options.device_flow.user_code_type;
        let generator = self.user_codes.generator(code_type).ok_or_else(|| {
            TollgateError::Other(format!("no user code generator for type '{}'", code_type))
        })?;
        for _ in 0..=generator.retry_limit() {
            let candidate = generator.generate();
            if self.device_codes.find_by_user_code(&candidate).is_none() {
                return Ok(candidate);
            }
            log::debug!("device:user_code collision type={}", code_type);
        }
        Err(TollgateError::Other("unable to create a unique user code".into()))
    }
}

impl DeviceAuthorizationResponseGenerator for DefaultDeviceAuthorizationResponseGenerator {
    fn process(
        &self,
        issuer: &str,
        request: &Validated<DeviceAuthorizationRequest>,
    ) -> TollgateResult<DeviceAuthorizationResponse> {
        let client = request
            .client
            .as_ref()
            .ok_or_else(|| TollgateError::Other("device request has no client".into()))?;
        let flow = &self.options.device_flow;
        let interaction = &self.options.user_interaction;

        let user_code = self.unique_user_code()?;
        let device_code = self.device_codes.store_device_authorization(
            &user_code,
            DeviceCode {
                client_id: client.client_id.clone(),
                user_code: user_code.clone(),
                scopes: request.scopes.clone(),
                creation_time: self.clock.now(),
                lifetime: flow.lifetime_secs,
                is_authorized: false,
                subject: None,
            },
        )?;

        let verification_uri = if interaction.device_verification_url.starts_with("http") {
            interaction.device_verification_url.clone()
        } else {
            format!("{}{}", issuer, ensure_leading_slash(&interaction.device_verification_url))
        };
        let complete = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(&interaction.device_verification_user_code_parameter, &user_code)
            .finish();
        log::info!(
            "device:authorize client={} scopes={}",
            client.client_id,
            request.scopes.join(" ")
        );

        Ok(DeviceAuthorizationResponse {
            device_code,
            verification_uri_complete: format!("{}?{}", verification_uri, complete),
            verification_uri,
            user_code,
            expires_in: flow.lifetime_secs,
            interval: flow.interval_secs,
        })
    }
}
