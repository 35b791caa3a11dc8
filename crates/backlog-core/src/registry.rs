use std::collections::HashMap;
use std::sync::Arc;

use backlog_protocol::{ServiceAdapter, ServiceApi};

/// Maps capability keys to the adapter serving them. One adapter may register
/// several capabilities; the dispatcher rejects anything unregistered with
/// `UnsupportedService` before touching the store.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<ServiceApi, Arc<dyn ServiceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ServiceAdapter>) {
        for service_api in adapter.service_apis() {
            self.adapters.insert(service_api, adapter.clone());
        }
    }

    pub fn adapter(&self, service_api: &ServiceApi) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.get(service_api).cloned()
    }

    pub fn is_supported(&self, service_api: &ServiceApi) -> bool {
        self.adapters.contains_key(service_api)
    }

    pub fn service_apis(&self) -> Vec<ServiceApi> {
        self.adapters.keys().cloned().collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("service_apis", &self.service_apis())
            .finish()
    }
}
