use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{DownstreamJobId, JobId, ServiceApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Started,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Primary key of a job record. The caller-assigned id is unique within a
/// service-api namespace, never globally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub service_api: ServiceApi,
    pub id: JobId,
}

impl JobKey {
    pub fn new(service_api: ServiceApi, id: JobId) -> Self {
        Self { service_api, id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub service_api: ServiceApi,
    pub params: Value,
    pub params_fingerprint: u64,
    pub status: JobStatus,
    pub downstream_job_id: Option<DownstreamJobId>,
    pub created_at: i64,
    pub updated_at: i64,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl JobRecord {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.service_api.clone(), self.id.clone())
    }
}

/// Stable fingerprint over the submission payload, used to tell an idempotent
/// replay apart from an id reused with different params. FNV-1a over the
/// serialized JSON; serde_json orders object keys, so equal payloads hash
/// equal regardless of how the caller built them.
pub fn params_fingerprint(params: &Value) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let rendered = params.to_string();
    let mut hash = FNV_OFFSET;
    for byte in rendered.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
