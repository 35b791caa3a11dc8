use backlog_protocol::{
    BacklogResult, DownstreamJobId, JobKey, JobRecord, JobStatus, ServiceApi,
};
use serde_json::Value;

mod codec;
mod sqlite_impl;

pub use sqlite_impl::SqliteJobStore;

/// Insert request for a fresh registration. Fingerprint, timestamps, and the
/// initial `Queued` status are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub key: JobKey,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(JobRecord),
    /// A record with this key and the same params fingerprint already exists.
    /// A fingerprint mismatch is a `CreationConflict` error, not an outcome.
    Existing(JobRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Updated(JobRecord),
    /// The record was not in the expected status; carries the current record
    /// so callers can observe who won the race.
    Mismatch(JobRecord),
}

/// Fields written alongside a status transition. `None` leaves the stored
/// value untouched.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub downstream_job_id: Option<DownstreamJobId>,
    pub last_error: Option<String>,
    pub bump_retry_count: bool,
}

impl StatusPatch {
    pub fn downstream(downstream_job_id: DownstreamJobId) -> Self {
        Self {
            downstream_job_id: Some(downstream_job_id),
            ..Self::default()
        }
    }

    pub fn failure(last_error: impl Into<String>) -> Self {
        Self {
            last_error: Some(last_error.into()),
            ..Self::default()
        }
    }

    pub fn requeue(last_error: impl Into<String>) -> Self {
        Self {
            last_error: Some(last_error.into()),
            bump_retry_count: true,
            ..Self::default()
        }
    }
}

/// Single source of truth for job lifecycle state, shared by every dispatcher
/// replica. All transitions go through conditional writes; nothing in memory
/// is authoritative.
pub trait JobRecordStore: Send {
    fn create_if_absent(&mut self, new: NewJobRecord) -> BacklogResult<CreateOutcome>;

    fn compare_and_swap_status(
        &mut self,
        key: &JobKey,
        expected: JobStatus,
        next: JobStatus,
        patch: StatusPatch,
    ) -> BacklogResult<CasOutcome>;

    fn get(&self, key: &JobKey) -> BacklogResult<Option<JobRecord>>;

    /// Queued records for one service, oldest first, for retry sweeps.
    fn list_queued(&self, service_api: &ServiceApi) -> BacklogResult<Vec<JobRecord>>;

    fn count_with_status(
        &self,
        service_api: &ServiceApi,
        status: JobStatus,
    ) -> BacklogResult<usize>;
}
