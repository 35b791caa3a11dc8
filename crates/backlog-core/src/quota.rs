use std::collections::HashMap;

use backlog_protocol::{BacklogResult, JobStatus, ServiceApi};

use crate::store::JobRecordStore;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

/// Advisory per-service admission check. The count is always recomputed from
/// the record store, never cached, so dispatcher replicas cannot drift; the
/// downstream service's own quota rejection remains the authority when the
/// advisory check is stale.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    default_limit: usize,
    limits: HashMap<ServiceApi, usize>,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY_LIMIT)
    }
}

impl QuotaTracker {
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit: default_limit.max(1),
            limits: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, service_api: ServiceApi, limit: usize) -> Self {
        self.limits.insert(service_api, limit.max(1));
        self
    }

    pub fn limit(&self, service_api: &ServiceApi) -> usize {
        self.limits
            .get(service_api)
            .copied()
            .unwrap_or(self.default_limit)
    }

    pub fn can_start(
        &self,
        store: &dyn JobRecordStore,
        service_api: &ServiceApi,
    ) -> BacklogResult<bool> {
        let in_flight = store.count_with_status(service_api, JobStatus::Started)?;
        Ok(in_flight < self.limit(service_api))
    }
}

#[cfg(test)]
mod tests {
    use backlog_protocol::ServiceApi;

    use super::QuotaTracker;

    #[test]
    fn per_service_limit_overrides_the_default() {
        let api = ServiceApi::new("transcribe:start_transcription_job");
        let tracker = QuotaTracker::new(4).with_limit(api.clone(), 2);

        assert_eq!(tracker.limit(&api), 2);
        assert_eq!(tracker.limit(&ServiceApi::new("rekognition:start_face_detection")), 4);
    }

    #[test]
    fn zero_limits_are_clamped_to_one() {
        let api = ServiceApi::new("transcribe:start_transcription_job");
        let tracker = QuotaTracker::new(0).with_limit(api.clone(), 0);

        assert_eq!(tracker.limit(&api), 1);
        assert_eq!(tracker.limit(&ServiceApi::new("other:api")), 1);
    }
}
