use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{DownstreamJobId, JobId, ServiceApi};

/// How a downstream submission failure is classified. The mapping from the
/// service's native error vocabulary to these kinds is owned by each adapter
/// (table-driven), never by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The service's own admission control rejected the job. Authoritative,
    /// even when the local quota tracker believed there was room.
    QuotaExceeded,
    /// A job with this idempotency token already exists on the service side.
    Conflict,
    /// Anything else, including timeouts.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("downstream {service_api} failure{}: {message}", .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
pub struct AdapterError {
    pub service_api: ServiceApi,
    pub kind: FailureKind,
    pub code: Option<String>,
    pub message: String,
}

impl AdapterError {
    pub fn other(service_api: ServiceApi, message: impl Into<String>) -> Self {
        Self {
            service_api,
            kind: FailureKind::Other,
            code: None,
            message: message.into(),
        }
    }
}

/// Status of a job as the downstream service itself reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownstreamJobState {
    Running,
    Queued,
    Completed,
    Failed,
}

impl DownstreamJobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DownstreamJobState::Completed | DownstreamJobState::Failed)
    }
}

/// Uniform contract every downstream capability implements. One adapter may
/// serve several capabilities (the registry indexes by `service_apis`).
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    /// Capability keys this adapter serves.
    fn service_apis(&self) -> Vec<ServiceApi>;

    /// Submit a job, using `id` as the idempotency token. Adapters decide per
    /// capability whether `id` is also reused verbatim as the downstream job
    /// name. Errors arrive pre-classified through the adapter's own table.
    async fn submit(
        &self,
        service_api: &ServiceApi,
        id: &JobId,
        params: &Value,
    ) -> Result<DownstreamJobId, AdapterError>;

    /// Ask the service for the job's real status, keyed by the same token
    /// `submit` used.
    async fn query_status(
        &self,
        service_api: &ServiceApi,
        id: &JobId,
    ) -> Result<DownstreamJobState, AdapterError>;

    /// Map a native error code to a failure kind.
    fn classify(&self, code: &str) -> FailureKind;
}
