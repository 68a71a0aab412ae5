use std::collections::HashMap;
use std::sync::Mutex;

use super::{DeviceFlowStore, StoreError, StoreResult};
use crate::container::{Component, ResolutionError, Resolver};
use crate::protocol::models::DeviceCode;

struct Entry {
    device_code: String,
    data: DeviceCode,
}

/// Device authorizations held in process memory, keyed by user code.
#[derive(Default)]
pub struct InMemoryDeviceFlowStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryDeviceFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Component for InMemoryDeviceFlowStore {
    fn construct(_: &Resolver<'_>) -> Result<Self, ResolutionError> {
        Ok(Self::new())
    }
}

crate::provides!(InMemoryDeviceFlowStore => dyn DeviceFlowStore);

impl DeviceFlowStore for InMemoryDeviceFlowStore {
    fn store_device_authorization(
        &self,
        device_code: &str,
        user_code: &str,
        data: DeviceCode,
    ) -> StoreResult<()> {
        let mut entries = self.lock();
        if entries.contains_key(user_code) {
            return Err(StoreError::Conflict(format!("user code {}", user_code)));
        }
        entries.insert(
            user_code.to_string(),
            Entry {
                device_code: device_code.to_string(),
                data,
            },
        );
        Ok(())
    }

    fn find_by_user_code(&self, user_code: &str) -> Option<DeviceCode> {
        self.lock().get(user_code).map(|e| e.data.clone())
    }

    fn find_by_device_code(&self, device_code: &str) -> Option<DeviceCode> {
        self.lock()
            .values()
            .find(|e| e.device_code == device_code)
            .map(|e| e.data.clone())
    }

    fn update_by_user_code(&self, user_code: &str, data: DeviceCode) -> StoreResult<()> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(user_code)
            .ok_or_else(|| StoreError::NotFound(format!("user code {}", user_code)))?;
        entry.data = data;
        Ok(())
    }

    fn remove_by_device_code(&self, device_code: &str) {
        self.lock().retain(|_, e| e.device_code != device_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pending(client_id: &str) -> DeviceCode {
        DeviceCode {
            client_id: client_id.into(),
            user_code: "123456789".into(),
            scopes: vec!["openid".into()],
            creation_time: Utc::now(),
            lifetime: 300,
            is_authorized: false,
            subject: None,
        }
    }

    #[test]
    fn lookup_by_either_code() {
        let store = InMemoryDeviceFlowStore::new();
        store
            .store_device_authorization("dev-hash", "123456789", pending("tv"))
            .unwrap();
        assert_eq!(store.find_by_user_code("123456789").unwrap().client_id, "tv");
        assert_eq!(store.find_by_device_code("dev-hash").unwrap().client_id, "tv");
    }

    #[test]
    fn duplicate_user_code_conflicts() {
        let store = InMemoryDeviceFlowStore::new();
        store.store_device_authorization("a", "111", pending("tv")).unwrap();
        assert!(matches!(
            store.store_device_authorization("b", "111", pending("tv")),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn update_then_remove() {
        let store = InMemoryDeviceFlowStore::new();
        store.store_device_authorization("a", "111", pending("tv")).unwrap();

        let mut approved = pending("tv");
        approved.is_authorized = true;
        store.update_by_user_code("111", approved).unwrap();
        assert!(store.find_by_device_code("a").unwrap().is_authorized);

        store.remove_by_device_code("a");
        assert!(store.find_by_user_code("111").is_none());
        assert!(store.update_by_user_code("111", pending("tv")).is_err());
    }
}
