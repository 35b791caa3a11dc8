use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use backlog_protocol::{BacklogResult, JobEvent, NotificationPublisher, ServiceApi};
use tokio::sync::broadcast;

pub const DEFAULT_SERVICE_BUFFER_CAPACITY: usize = 64;
pub const DEFAULT_GLOBAL_BUFFER_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobEventBusConfig {
    pub service_buffer_capacity: usize,
    pub global_buffer_capacity: usize,
}

impl Default for JobEventBusConfig {
    fn default() -> Self {
        Self {
            service_buffer_capacity: DEFAULT_SERVICE_BUFFER_CAPACITY,
            global_buffer_capacity: DEFAULT_GLOBAL_BUFFER_CAPACITY,
        }
    }
}

/// Fans lifecycle events out to per-service subscribers (retry drivers
/// watching one capability) and global subscribers (observability tooling).
///
/// Events carry their own identity (`service_api`, `id`, `kind`), so the bus
/// delivers them as-is; per-channel ordering is whatever `broadcast` gives,
/// and slow subscribers see lag rather than stalling publishers.
#[derive(Debug)]
pub struct JobEventBus {
    config: JobEventBusConfig,
    service_senders: Mutex<HashMap<ServiceApi, broadcast::Sender<JobEvent>>>,
    global_sender: broadcast::Sender<JobEvent>,
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(JobEventBusConfig::default())
    }
}

impl JobEventBus {
    pub fn new(config: JobEventBusConfig) -> Self {
        // broadcast::channel panics on zero capacity; fail with our own
        // message before it does. Config normalization already clamps these.
        assert!(
            config.service_buffer_capacity > 0,
            "service buffer capacity must be at least 1"
        );
        assert!(
            config.global_buffer_capacity > 0,
            "global buffer capacity must be at least 1"
        );

        let (global_sender, _) = broadcast::channel(config.global_buffer_capacity);
        Self {
            config,
            service_senders: Mutex::new(HashMap::new()),
            global_sender,
        }
    }

    /// Events for one capability only. The channel is created lazily on first
    /// subscription; events published before anyone subscribes are dropped.
    pub fn subscribe_service(
        &self,
        service_api: ServiceApi,
    ) -> broadcast::Receiver<JobEvent> {
        self.service_senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(service_api)
            .or_insert_with(|| broadcast::channel(self.config.service_buffer_capacity).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<JobEvent> {
        self.global_sender.subscribe()
    }

    /// Drops the service's channel, closing its current subscribers. A later
    /// `subscribe_service` starts a fresh channel.
    pub fn remove_service(&self, service_api: &ServiceApi) -> bool {
        self.service_senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(service_api)
            .is_some()
    }

    pub fn publish(&self, event: JobEvent) {
        let service_sender = self
            .service_senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event.service_api)
            .cloned();

        // A send error only means nobody is listening on that channel.
        if let Some(sender) = service_sender {
            let _ = sender.send(event.clone());
        }
        let _ = self.global_sender.send(event);
    }
}

/// Dispatcher-facing glue: publishing into the bus never fails, so the
/// fire-and-forget contract is trivially honored.
#[async_trait]
impl NotificationPublisher for JobEventBus {
    async fn publish(&self, event: JobEvent) -> BacklogResult<()> {
        JobEventBus::publish(self, event);
        Ok(())
    }
}
