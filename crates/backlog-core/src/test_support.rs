//! Hand-rolled fakes for the dispatcher tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use backlog_protocol::{
    AdapterError, BacklogResult, DownstreamJobId, DownstreamJobState, FailureKind, JobEvent, JobId,
    NotificationPublisher, ServiceAdapter, ServiceApi,
};
use serde_json::Value;

/// Adapter whose submit/status outcomes are scripted per call. With an empty
/// script, submits succeed (echoing the id as the downstream name) and status
/// probes report `Running`.
pub struct ScriptedAdapter {
    service_apis: Vec<ServiceApi>,
    submit_script: Mutex<VecDeque<Result<DownstreamJobId, AdapterError>>>,
    status_script: Mutex<VecDeque<Result<DownstreamJobState, AdapterError>>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn for_api(service_api: ServiceApi) -> Self {
        Self {
            service_apis: vec![service_api],
            submit_script: Mutex::new(VecDeque::new()),
            status_script: Mutex::new(VecDeque::new()),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_submit(&self, outcome: Result<DownstreamJobId, AdapterError>) {
        self.submit_script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(outcome);
    }

    pub fn push_status(&self, outcome: Result<DownstreamJobState, AdapterError>) {
        self.status_script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(outcome);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn quota_error(service_api: ServiceApi) -> AdapterError {
        AdapterError {
            service_api,
            kind: FailureKind::QuotaExceeded,
            code: Some("LimitExceededException".to_owned()),
            message: "too many concurrent jobs".to_owned(),
        }
    }

    pub fn conflict_error(service_api: ServiceApi) -> AdapterError {
        AdapterError {
            service_api,
            kind: FailureKind::Conflict,
            code: Some("ConflictException".to_owned()),
            message: "job name already in use".to_owned(),
        }
    }

    pub fn timeout_error(service_api: ServiceApi) -> AdapterError {
        AdapterError {
            service_api,
            kind: FailureKind::Other,
            code: None,
            message: "request timed out".to_owned(),
        }
    }
}

#[async_trait]
impl ServiceAdapter for ScriptedAdapter {
    fn service_apis(&self) -> Vec<ServiceApi> {
        self.service_apis.clone()
    }

    async fn submit(
        &self,
        _service_api: &ServiceApi,
        id: &JobId,
        _params: &Value,
    ) -> Result<DownstreamJobId, AdapterError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .submit_script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        scripted.unwrap_or_else(|| Ok(DownstreamJobId::new(id.as_str())))
    }

    async fn query_status(
        &self,
        _service_api: &ServiceApi,
        _id: &JobId,
    ) -> Result<DownstreamJobState, AdapterError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .status_script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        scripted.unwrap_or(Ok(DownstreamJobState::Running))
    }

    fn classify(&self, code: &str) -> FailureKind {
        match code {
            "LimitExceededException" => FailureKind::QuotaExceeded,
            "ConflictException" => FailureKind::Conflict,
            _ => FailureKind::Other,
        }
    }
}

/// Publisher that records every event it sees.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<JobEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish(&self, event: JobEvent) -> BacklogResult<()> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
        Ok(())
    }
}

/// Publisher whose publish always fails, for exercising the fire-and-forget
/// contract.
pub struct FailingPublisher;

#[async_trait]
impl NotificationPublisher for FailingPublisher {
    async fn publish(&self, _event: JobEvent) -> BacklogResult<()> {
        Err(backlog_protocol::BacklogError::Notification(
            "publisher offline".to_owned(),
        ))
    }
}

/// Dispatcher over an in-memory store, one scripted adapter, and a recording
/// publisher.
pub fn scripted_dispatcher(
    adapter: Arc<ScriptedAdapter>,
    limit: usize,
) -> BacklogResult<(crate::BacklogDispatcher, Arc<RecordingPublisher>)> {
    let mut registry = crate::AdapterRegistry::new();
    let apis = adapter.service_apis();
    registry.register(adapter);

    let mut quota = crate::QuotaTracker::new(limit);
    for api in apis {
        quota = quota.with_limit(api, limit);
    }

    let publisher = Arc::new(RecordingPublisher::default());
    let store = crate::SqliteJobStore::in_memory()?;
    let dispatcher =
        crate::BacklogDispatcher::new(Box::new(store), registry, quota, publisher.clone());
    Ok((dispatcher, publisher))
}
