use std::sync::Arc;

use backlog_protocol::{
    AdapterError, BacklogError, BacklogResult, FailureKind, JobEvent, JobEventKind, JobId, JobKey,
    JobRecord, JobStatus, NotificationPublisher, ServiceAdapter, ServiceApi,
};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::quota::QuotaTracker;
use crate::registry::AdapterRegistry;
use crate::resolver::{resolve_submission_conflict, ConflictVerdict};
use crate::store::{CasOutcome, CreateOutcome, JobRecordStore, NewJobRecord, StatusPatch};

/// Terminal outcome reported by the external completion notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed,
    Error,
}

impl TerminalOutcome {
    fn status(self) -> JobStatus {
        match self {
            TerminalOutcome::Completed => JobStatus::Completed,
            TerminalOutcome::Error => JobStatus::Error,
        }
    }
}

/// Result of one retry sweep over a service's backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetrySweepReport {
    pub examined: usize,
    pub started: usize,
    pub still_queued: usize,
    pub failed: usize,
}

/// Orchestrates admission control and idempotent dispatch.
///
/// Every status transition is a compare-and-swap against the record store,
/// and the quota check shares the store lock with the `Queued -> Started`
/// transition, so concurrent calls for the same id produce exactly one
/// downstream submission and concurrent calls for different ids never
/// over-admit. Adapter calls happen outside the store lock; a slow
/// submission delays only its own job.
pub struct BacklogDispatcher {
    store: Arc<Mutex<Box<dyn JobRecordStore>>>,
    registry: AdapterRegistry,
    quota: QuotaTracker,
    publisher: Arc<dyn NotificationPublisher>,
}

impl BacklogDispatcher {
    pub fn new(
        store: Box<dyn JobRecordStore>,
        registry: AdapterRegistry,
        quota: QuotaTracker,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            registry,
            quota,
            publisher,
        }
    }

    /// Register a job and start it if the service has capacity.
    ///
    /// Returns the job record either way; `status` tells the caller whether
    /// the job was `Started` now or `Queued` for a later sweep. Re-invoking
    /// with the same `(id, service_api, params)` is always safe: a terminal
    /// record replays idempotently and an in-flight record is a no-op.
    pub async fn register_and_start(
        &self,
        id: JobId,
        service_api: ServiceApi,
        params: Value,
    ) -> BacklogResult<JobRecord> {
        let Some(adapter) = self.registry.adapter(&service_api) else {
            return Err(BacklogError::UnsupportedService(service_api));
        };
        let key = JobKey::new(service_api, id);

        let record = {
            let mut store = self.store.lock().await;
            match store.create_if_absent(NewJobRecord {
                key: key.clone(),
                params,
            })? {
                CreateOutcome::Created(record) => record,
                CreateOutcome::Existing(record) => record,
            }
        };

        if record.status.is_terminal() {
            // Idempotent replay: the job already ran, return the record
            // without touching the downstream service.
            return Ok(record);
        }
        if record.status == JobStatus::Started {
            // Already in flight; another call owns the submission.
            return Ok(record);
        }

        self.dispatch(adapter.as_ref(), &key, record).await
    }

    /// Conditional `Started -> Completed/Error` transition, exposed for the
    /// external completion notifier. Freeing the slot is what makes queued
    /// jobs dispatchable on the next sweep.
    pub async fn mark_terminal(
        &self,
        id: JobId,
        service_api: ServiceApi,
        outcome: TerminalOutcome,
        detail: Option<String>,
    ) -> BacklogResult<JobRecord> {
        let key = JobKey::new(service_api, id);
        let patch = match &detail {
            Some(detail) if outcome == TerminalOutcome::Error => StatusPatch::failure(detail),
            _ => StatusPatch::default(),
        };

        let record = {
            let mut store = self.store.lock().await;
            match store.compare_and_swap_status(
                &key,
                JobStatus::Started,
                outcome.status(),
                patch,
            )? {
                CasOutcome::Updated(record) => record,
                CasOutcome::Mismatch(current) => {
                    return Err(BacklogError::InvalidTransition {
                        service_api: key.service_api,
                        id: key.id,
                        expected: JobStatus::Started,
                        found: current.status,
                    });
                }
            }
        };

        let kind = JobEventKind::from(record.status);
        let mut event = JobEvent::new(kind, key.service_api, key.id);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.notify(event).await;
        Ok(record)
    }

    /// One pass over the service's queued records, oldest first. The trigger
    /// is external (a periodic poller); the dispatcher never schedules its
    /// own retries. Stops early once admission defers a job again, since
    /// every later record would be deferred too.
    pub async fn retry_queued(&self, service_api: &ServiceApi) -> BacklogResult<RetrySweepReport> {
        if !self.registry.is_supported(service_api) {
            return Err(BacklogError::UnsupportedService(service_api.clone()));
        }

        let queued = {
            let store = self.store.lock().await;
            store.list_queued(service_api)?
        };

        let mut report = RetrySweepReport {
            examined: queued.len(),
            ..RetrySweepReport::default()
        };
        let mut remaining = queued.len();
        for record in queued {
            remaining -= 1;
            match self
                .register_and_start(record.id.clone(), service_api.clone(), record.params.clone())
                .await
            {
                Ok(updated) if updated.status == JobStatus::Started => report.started += 1,
                Ok(updated) if updated.status == JobStatus::Queued => {
                    report.still_queued += 1 + remaining;
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(
                        service_api = %service_api,
                        id = %record.id,
                        error = %error,
                        "retry sweep dispatch failed"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn get_job(
        &self,
        service_api: ServiceApi,
        id: JobId,
    ) -> BacklogResult<Option<JobRecord>> {
        let store = self.store.lock().await;
        store.get(&JobKey::new(service_api, id))
    }

    async fn dispatch(
        &self,
        adapter: &dyn ServiceAdapter,
        key: &JobKey,
        queued_record: JobRecord,
    ) -> BacklogResult<JobRecord> {
        // Admission and the Queued -> Started transition share one lock
        // scope: once a record is Started it is counted, so two concurrent
        // admissions cannot both squeeze into the last slot.
        let admitted = {
            let mut store = self.store.lock().await;
            if !self.quota.can_start(&**store, &key.service_api)? {
                None
            } else {
                match store.compare_and_swap_status(
                    key,
                    JobStatus::Queued,
                    JobStatus::Started,
                    StatusPatch::default(),
                )? {
                    CasOutcome::Updated(record) => Some(record),
                    // A concurrent call won the transition; its record is the
                    // truth now.
                    CasOutcome::Mismatch(current) => return Ok(current),
                }
            }
        };

        let Some(record) = admitted else {
            tracing::debug!(
                service_api = %key.service_api,
                id = %key.id,
                "service at concurrency limit, job deferred"
            );
            self.notify(JobEvent::new(
                JobEventKind::Queued,
                key.service_api.clone(),
                key.id.clone(),
            ))
            .await;
            return Ok(queued_record);
        };

        match adapter
            .submit(&key.service_api, &key.id, &record.params)
            .await
        {
            Ok(downstream_job_id) => {
                let record = self
                    .transition(
                        key,
                        JobStatus::Started,
                        JobStatus::Started,
                        StatusPatch::downstream(downstream_job_id),
                    )
                    .await?;
                self.notify(JobEvent::new(
                    JobEventKind::Started,
                    key.service_api.clone(),
                    key.id.clone(),
                ))
                .await;
                Ok(record)
            }
            Err(error) => self.recover_submit_failure(adapter, key, error).await,
        }
    }

    async fn recover_submit_failure(
        &self,
        adapter: &dyn ServiceAdapter,
        key: &JobKey,
        error: AdapterError,
    ) -> BacklogResult<JobRecord> {
        match error.kind {
            FailureKind::QuotaExceeded => {
                // The local tracker was optimistic; the service's rejection
                // is authoritative. Requeue, never surface.
                tracing::warn!(
                    service_api = %key.service_api,
                    id = %key.id,
                    code = error.code.as_deref().unwrap_or("-"),
                    "downstream quota exhausted, requeueing"
                );
                let record = self
                    .transition(
                        key,
                        JobStatus::Started,
                        JobStatus::Queued,
                        StatusPatch::requeue(error.message.clone()),
                    )
                    .await?;
                self.notify(
                    JobEvent::new(
                        JobEventKind::Queued,
                        key.service_api.clone(),
                        key.id.clone(),
                    )
                    .with_detail(error.message.clone()),
                )
                .await;
                Ok(record)
            }
            FailureKind::Conflict => self.resolve_conflict(adapter, key, error).await,
            FailureKind::Other => {
                self.transition(
                    key,
                    JobStatus::Started,
                    JobStatus::Error,
                    StatusPatch::failure(error.to_string()),
                )
                .await?;
                self.notify(
                    JobEvent::new(
                        JobEventKind::Error,
                        key.service_api.clone(),
                        key.id.clone(),
                    )
                    .with_detail(error.message.clone()),
                )
                .await;
                Err(BacklogError::Submission(error))
            }
        }
    }

    async fn resolve_conflict(
        &self,
        adapter: &dyn ServiceAdapter,
        key: &JobKey,
        original: AdapterError,
    ) -> BacklogResult<JobRecord> {
        match resolve_submission_conflict(adapter, &key.service_api, &key.id).await {
            ConflictVerdict::DuplicateOfActive(downstream_job_id) => {
                let record = self
                    .transition(
                        key,
                        JobStatus::Started,
                        JobStatus::Started,
                        StatusPatch::downstream(downstream_job_id),
                    )
                    .await?;
                self.notify(JobEvent::new(
                    JobEventKind::Started,
                    key.service_api.clone(),
                    key.id.clone(),
                ))
                .await;
                Ok(record)
            }
            ConflictVerdict::DuplicateOfTerminal(state) => {
                let next = if state == backlog_protocol::DownstreamJobState::Completed {
                    JobStatus::Completed
                } else {
                    JobStatus::Error
                };
                self.transition(
                    key,
                    JobStatus::Started,
                    next,
                    StatusPatch::failure(original.message.clone()),
                )
                .await?;
                self.notify(
                    JobEvent::new(
                        JobEventKind::from(next),
                        key.service_api.clone(),
                        key.id.clone(),
                    )
                    .with_detail(original.message.clone()),
                )
                .await;
                Err(BacklogError::TerminalConflict {
                    service_api: key.service_api.clone(),
                    id: key.id.clone(),
                    message: original.message,
                })
            }
            ConflictVerdict::Unresolvable(probe_error) => {
                tracing::warn!(
                    service_api = %key.service_api,
                    id = %key.id,
                    error = %probe_error,
                    "conflict status probe failed"
                );
                self.transition(
                    key,
                    JobStatus::Started,
                    JobStatus::Error,
                    StatusPatch::failure(original.to_string()),
                )
                .await?;
                self.notify(
                    JobEvent::new(
                        JobEventKind::Error,
                        key.service_api.clone(),
                        key.id.clone(),
                    )
                    .with_detail(original.message.clone()),
                )
                .await;
                Err(BacklogError::Submission(original))
            }
        }
    }

    async fn transition(
        &self,
        key: &JobKey,
        expected: JobStatus,
        next: JobStatus,
        patch: StatusPatch,
    ) -> BacklogResult<JobRecord> {
        let mut store = self.store.lock().await;
        match store.compare_and_swap_status(key, expected, next, patch)? {
            CasOutcome::Updated(record) => Ok(record),
            // Post-submit transitions only race the completion notifier;
            // surrender to whatever state it wrote.
            CasOutcome::Mismatch(current) => Ok(current),
        }
    }

    async fn notify(&self, event: JobEvent) {
        if let Err(error) = self.publisher.publish(event.clone()).await {
            tracing::warn!(
                kind = ?event.kind,
                service_api = %event.service_api,
                id = %event.id,
                error = %error,
                "notification publish failed"
            );
        }
    }
}
