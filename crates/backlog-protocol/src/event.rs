use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BacklogResult;
use crate::ids::{JobId, ServiceApi};
use crate::record::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEventKind {
    Queued,
    Started,
    Completed,
    Error,
}

impl From<JobStatus> for JobEventKind {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => JobEventKind::Queued,
            JobStatus::Started => JobEventKind::Started,
            JobStatus::Completed => JobEventKind::Completed,
            JobStatus::Error => JobEventKind::Error,
        }
    }
}

/// Lifecycle notification emitted on every dispatch decision. Consumed by the
/// retry driver and by observability tooling; never load-bearing for
/// dispatcher correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub kind: JobEventKind,
    pub service_api: ServiceApi,
    pub id: JobId,
    pub detail: Option<String>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, service_api: ServiceApi, id: JobId) -> Self {
        Self {
            kind,
            service_api,
            id,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Fire-and-forget sink for lifecycle events. A failing publisher is logged
/// and ignored by the dispatcher.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, event: JobEvent) -> BacklogResult<()>;
}
