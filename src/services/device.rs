//! Device authorization flow (RFC 8628) collaborators.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use super::{Clock, DistributedCache, HandleGenerationService, DEFAULT_HANDLE_LENGTH};
use crate::config::ServerOptions;
use crate::container::{Component, ResolutionError, Resolver};
use crate::error::TollgateResult;
use crate::protocol::models::{expires_at, lifetime_duration, DeviceCode};
use crate::stores::DeviceFlowStore;

pub const NUMERIC_USER_CODE_TYPE: &str = "Numeric";

// ---------------------------------------------------------------------------
// User codes
// ---------------------------------------------------------------------------

pub trait UserCodeGenerator: Send + Sync {
    fn user_code_type(&self) -> &str;
    /// How many collisions to tolerate before giving up.
    fn retry_limit(&self) -> u32;
    fn generate(&self) -> String;
}

/// Nine random digits.
pub struct NumericUserCodeGenerator;

impl UserCodeGenerator for NumericUserCodeGenerator {
    fn user_code_type(&self) -> &str {
        NUMERIC_USER_CODE_TYPE
    }

    fn retry_limit(&self) -> u32 {
        5
    }

    fn generate(&self) -> String {
        rand::rng().random_range(100_000_000u32..1_000_000_000).to_string()
    }
}

impl Component for NumericUserCodeGenerator {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self)
    }
}

crate::provides!(NumericUserCodeGenerator => dyn UserCodeGenerator);

pub trait UserCodeService: Send + Sync {
    fn generator(&self, user_code_type: &str) -> Option<Arc<dyn UserCodeGenerator>>;
}

pub struct DefaultUserCodeService {
    generators: Vec<Arc<dyn UserCodeGenerator>>,
}

impl Component for DefaultUserCodeService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            generators: resolver.resolve_all()?,
        })
    }
}

crate::provides!(DefaultUserCodeService => dyn UserCodeService);

impl UserCodeService for DefaultUserCodeService {
    fn generator(&self, user_code_type: &str) -> Option<Arc<dyn UserCodeGenerator>> {
        self.generators
            .iter()
            .find(|g| g.user_code_type() == user_code_type)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Device codes
// ---------------------------------------------------------------------------

pub trait DeviceFlowCodeService: Send + Sync {
    /// Persist a pending authorization. Returns the device code for the client.
    fn store_device_authorization(
        &self,
        user_code: &str,
        data: DeviceCode,
    ) -> TollgateResult<String>;
    fn find_by_user_code(&self, user_code: &str) -> Option<DeviceCode>;
    fn find_by_device_code(&self, device_code: &str) -> Option<DeviceCode>;
    fn update_by_user_code(&self, user_code: &str, data: DeviceCode) -> TollgateResult<()>;
    fn remove_by_device_code(&self, device_code: &str);
}

/// Device codes are random handles; only their hash reaches the store.
pub struct DefaultDeviceFlowCodeService {
    store: Arc<dyn DeviceFlowStore>,
    handles: Arc<dyn HandleGenerationService>,
}

impl DefaultDeviceFlowCodeService {
    pub fn new(store: Arc<dyn DeviceFlowStore>, handles: Arc<dyn HandleGenerationService>) -> Self {
        Self { store, handles }
    }

    fn hash(device_code: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(device_code.as_bytes()))
    }
}

impl Component for DefaultDeviceFlowCodeService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self {
            store: resolver.resolve()?,
            handles: resolver.resolve()?,
        })
    }
}

crate::provides!(DefaultDeviceFlowCodeService => dyn DeviceFlowCodeService);

impl DeviceFlowCodeService for DefaultDeviceFlowCodeService {
    fn store_device_authorization(
        &self,
        user_code: &str,
        data: DeviceCode,
    ) -> TollgateResult<String> {
        let device_code = self.handles.create_handle(DEFAULT_HANDLE_LENGTH);
        self.store
            .store_device_authorization(&Self::hash(&device_code), user_code, data)?;
        Ok(device_code)
    }

    fn find_by_user_code(&self, user_code: &str) -> Option<DeviceCode> {
        self.store.find_by_user_code(user_code)
    }

    fn find_by_device_code(&self, device_code: &str) -> Option<DeviceCode> {
        self.store.find_by_device_code(&Self::hash(device_code))
    }

    fn update_by_user_code(&self, user_code: &str, data: DeviceCode) -> TollgateResult<()> {
        Ok(self.store.update_by_user_code(user_code, data)?)
    }

    fn remove_by_device_code(&self, device_code: &str) {
        self.store.remove_by_device_code(&Self::hash(device_code));
    }
}

// ---------------------------------------------------------------------------
// Polling throttle
// ---------------------------------------------------------------------------

pub trait DeviceFlowThrottlingService: Send + Sync {
    /// Whether the client polled faster than the advertised interval.
    fn should_slow_down(&self, device_code: &str, details: &DeviceCode) -> bool;
}

/// Remembers the last poll per device code in the distributed cache.
pub struct DistributedDeviceFlowThrottlingService {
    cache: Arc<dyn DistributedCache>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Component for DistributedDeviceFlowThrottlingService {
    fn construct(resolver: &Resolver<'_>) -> Result<Self, ResolutionError> {
        let options = resolver.resolve::<ServerOptions>()?;
        let interval = lifetime_duration(options.device_flow.interval_secs).ok_or_else(|| {
            ResolutionError::construction(
                "DistributedDeviceFlowThrottlingService",
                "device_flow.interval_secs is out of range",
            )
        })?;
        Ok(Self {
            cache: resolver.resolve()?,
            clock: resolver.resolve()?,
            interval,
        })
    }
}

crate::provides!(DistributedDeviceFlowThrottlingService => dyn DeviceFlowThrottlingService);

impl DeviceFlowThrottlingService for DistributedDeviceFlowThrottlingService {
    fn should_slow_down(&self, device_code: &str, details: &DeviceCode) -> bool {
        let key = format!("devicecode_{}", device_code);
        let now = self.clock.now();
        let remaining = expires_at(details.creation_time, details.lifetime)
            .map_or_else(Duration::zero, |expiry| expiry - now);

        let last_poll = self
            .cache
            .get(&key)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc));

        self.cache
            .set(&key, now.to_rfc3339().into_bytes(), remaining.max(self.interval));

        match last_poll {
            Some(last) if now < last + self.interval => {
                log::debug!("device:slow_down client={}", details.client_id);
                true
            }
            _ => false,
        }
    }
}
