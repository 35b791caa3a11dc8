//! Adapter for the transcription service's standard and medical job APIs.
//!
//! The job id doubles as the downstream job name (the service has no client
//! request token), which is what makes its `ConflictException` usable as an
//! idempotency signal.

use std::sync::Arc;

use async_trait::async_trait;
use backlog_protocol::{
    AdapterError, DownstreamJobId, DownstreamJobState, FailureKind, JobId, ServiceAdapter,
    ServiceApi,
};
use serde_json::Value;

pub const SERVICE_API_START_TRANSCRIPTION_JOB: &str = "transcribe:start_transcription_job";
pub const SERVICE_API_START_MEDICAL_TRANSCRIPTION_JOB: &str =
    "transcribe:start_medical_transcription_job";

const CODE_LIMIT_EXCEEDED: &str = "LimitExceededException";
const CODE_CONFLICT: &str = "ConflictException";

const STATUS_QUEUED: &str = "QUEUED";
const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
const STATUS_COMPLETED: &str = "COMPLETED";
const STATUS_FAILED: &str = "FAILED";

/// Native error surfaced by the transcription API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscribeApiError {
    pub code: Option<String>,
    pub message: String,
}

impl TranscribeApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Thin client over the transcription service's start/get calls. Production
/// wires this to the real SDK; tests script it.
#[async_trait]
pub trait TranscribeApi: Send + Sync {
    async fn start_transcription_job(&self, params: Value) -> Result<Value, TranscribeApiError>;

    async fn start_medical_transcription_job(
        &self,
        params: Value,
    ) -> Result<Value, TranscribeApiError>;

    async fn get_transcription_job(&self, job_name: &str) -> Result<Value, TranscribeApiError>;

    async fn get_medical_transcription_job(
        &self,
        job_name: &str,
    ) -> Result<Value, TranscribeApiError>;
}

pub struct TranscribeAdapter {
    client: Arc<dyn TranscribeApi>,
    /// Role substituted into `JobExecutionSettings.DataAccessRoleArn` when the
    /// caller supplied one, so submissions always run under the service's own
    /// data-access role rather than whatever the caller passed.
    data_access_role: Option<String>,
}

impl TranscribeAdapter {
    pub fn new(client: Arc<dyn TranscribeApi>, data_access_role: Option<String>) -> Self {
        Self {
            client,
            data_access_role,
        }
    }

    fn start_api(service_api: &ServiceApi) -> Option<StartApi> {
        match service_api.as_str() {
            SERVICE_API_START_TRANSCRIPTION_JOB => Some(StartApi::Standard),
            SERVICE_API_START_MEDICAL_TRANSCRIPTION_JOB => Some(StartApi::Medical),
            _ => None,
        }
    }

    fn prepare_params(&self, api: StartApi, id: &JobId, params: &Value) -> Value {
        let mut prepared = params.clone();
        if !prepared.is_object() {
            prepared = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = prepared.as_object_mut() {
            map.insert(
                api.job_name_field().to_owned(),
                Value::String(id.as_str().to_owned()),
            );
        }

        if let Some(role) = &self.data_access_role {
            let caller_supplied_role = prepared
                .get("JobExecutionSettings")
                .and_then(|settings| settings.get("DataAccessRoleArn"))
                .is_some();
            if caller_supplied_role {
                if let Some(settings) = prepared
                    .get_mut("JobExecutionSettings")
                    .and_then(Value::as_object_mut)
                {
                    settings.insert(
                        "DataAccessRoleArn".to_owned(),
                        Value::String(role.clone()),
                    );
                }
            }
        }

        prepared
    }

    fn adapter_error(&self, service_api: &ServiceApi, err: TranscribeApiError) -> AdapterError {
        let kind = err
            .code
            .as_deref()
            .map(|code| self.classify(code))
            .unwrap_or(FailureKind::Other);
        AdapterError {
            service_api: service_api.clone(),
            kind,
            code: err.code,
            message: err.message,
        }
    }

    fn parse_job_name(response: &Value) -> Option<&str> {
        response
            .get("TranscriptionJob")
            .and_then(|job| job.get("TranscriptionJobName"))
            .and_then(Value::as_str)
            .or_else(|| {
                response
                    .get("MedicalTranscriptionJob")
                    .and_then(|job| job.get("MedicalTranscriptionJobName"))
                    .and_then(Value::as_str)
            })
    }

    fn parse_job_status(
        service_api: &ServiceApi,
        response: &Value,
    ) -> Result<DownstreamJobState, AdapterError> {
        let status = response
            .get("TranscriptionJob")
            .or_else(|| response.get("MedicalTranscriptionJob"))
            .and_then(|job| job.get("TranscriptionJobStatus"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::other(
                    service_api.clone(),
                    "status response carried no TranscriptionJobStatus",
                )
            })?;

        match status {
            STATUS_QUEUED => Ok(DownstreamJobState::Queued),
            STATUS_IN_PROGRESS => Ok(DownstreamJobState::Running),
            STATUS_COMPLETED => Ok(DownstreamJobState::Completed),
            STATUS_FAILED => Ok(DownstreamJobState::Failed),
            other => Err(AdapterError::other(
                service_api.clone(),
                format!("unrecognized transcription job status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartApi {
    Standard,
    Medical,
}

impl StartApi {
    fn job_name_field(self) -> &'static str {
        match self {
            StartApi::Standard => "TranscriptionJobName",
            StartApi::Medical => "MedicalTranscriptionJobName",
        }
    }
}

#[async_trait]
impl ServiceAdapter for TranscribeAdapter {
    fn service_apis(&self) -> Vec<ServiceApi> {
        vec![
            ServiceApi::new(SERVICE_API_START_TRANSCRIPTION_JOB),
            ServiceApi::new(SERVICE_API_START_MEDICAL_TRANSCRIPTION_JOB),
        ]
    }

    async fn submit(
        &self,
        service_api: &ServiceApi,
        id: &JobId,
        params: &Value,
    ) -> Result<DownstreamJobId, AdapterError> {
        let Some(api) = Self::start_api(service_api) else {
            return Err(AdapterError::other(
                service_api.clone(),
                "capability not served by the transcribe adapter",
            ));
        };
        let prepared = self.prepare_params(api, id, params);

        let response = match api {
            StartApi::Standard => self.client.start_transcription_job(prepared).await,
            StartApi::Medical => self.client.start_medical_transcription_job(prepared).await,
        }
        .map_err(|err| self.adapter_error(service_api, err))?;

        let job_name = Self::parse_job_name(&response).unwrap_or(id.as_str());
        tracing::debug!(
            service_api = %service_api,
            id = %id,
            job_name,
            "transcription job submitted"
        );
        Ok(DownstreamJobId::new(job_name))
    }

    async fn query_status(
        &self,
        service_api: &ServiceApi,
        id: &JobId,
    ) -> Result<DownstreamJobState, AdapterError> {
        let Some(api) = Self::start_api(service_api) else {
            return Err(AdapterError::other(
                service_api.clone(),
                "capability not served by the transcribe adapter",
            ));
        };

        let response = match api {
            StartApi::Standard => self.client.get_transcription_job(id.as_str()).await,
            StartApi::Medical => self.client.get_medical_transcription_job(id.as_str()).await,
        }
        .map_err(|err| self.adapter_error(service_api, err))?;

        Self::parse_job_status(service_api, &response)
    }

    fn classify(&self, code: &str) -> FailureKind {
        match code {
            CODE_LIMIT_EXCEEDED => FailureKind::QuotaExceeded,
            CODE_CONFLICT => FailureKind::Conflict,
            _ => FailureKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    /// Client that records start params and replays canned responses.
    #[derive(Default)]
    struct FakeTranscribeApi {
        start_params: Mutex<Vec<Value>>,
        start_response: Mutex<Option<Result<Value, TranscribeApiError>>>,
        get_response: Mutex<Option<Result<Value, TranscribeApiError>>>,
    }

    impl FakeTranscribeApi {
        fn with_start_response(response: Result<Value, TranscribeApiError>) -> Self {
            Self {
                start_response: Mutex::new(Some(response)),
                ..Self::default()
            }
        }

        fn with_get_response(response: Result<Value, TranscribeApiError>) -> Self {
            Self {
                get_response: Mutex::new(Some(response)),
                ..Self::default()
            }
        }

        fn recorded_start_params(&self) -> Vec<Value> {
            self.start_params.lock().expect("params lock").clone()
        }

        fn start(&self, params: Value) -> Result<Value, TranscribeApiError> {
            self.start_params.lock().expect("params lock").push(params);
            self.start_response
                .lock()
                .expect("response lock")
                .take()
                .unwrap_or_else(|| Ok(json!({})))
        }

        fn get(&self) -> Result<Value, TranscribeApiError> {
            self.get_response
                .lock()
                .expect("response lock")
                .take()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    #[async_trait]
    impl TranscribeApi for FakeTranscribeApi {
        async fn start_transcription_job(
            &self,
            params: Value,
        ) -> Result<Value, TranscribeApiError> {
            self.start(params)
        }

        async fn start_medical_transcription_job(
            &self,
            params: Value,
        ) -> Result<Value, TranscribeApiError> {
            self.start(params)
        }

        async fn get_transcription_job(
            &self,
            _job_name: &str,
        ) -> Result<Value, TranscribeApiError> {
            self.get()
        }

        async fn get_medical_transcription_job(
            &self,
            _job_name: &str,
        ) -> Result<Value, TranscribeApiError> {
            self.get()
        }
    }

    fn standard_api() -> ServiceApi {
        ServiceApi::new(SERVICE_API_START_TRANSCRIPTION_JOB)
    }

    fn medical_api() -> ServiceApi {
        ServiceApi::new(SERVICE_API_START_MEDICAL_TRANSCRIPTION_JOB)
    }

    fn adapter(client: FakeTranscribeApi) -> (TranscribeAdapter, Arc<FakeTranscribeApi>) {
        let client = Arc::new(client);
        (
            TranscribeAdapter::new(client.clone(), None),
            client,
        )
    }

    #[tokio::test]
    async fn submit_injects_the_id_as_the_job_name() {
        let (adapter, client) = adapter(FakeTranscribeApi::default());

        let downstream = adapter
            .submit(
                &standard_api(),
                &JobId::new("job-1"),
                &json!({ "LanguageCode": "en-US" }),
            )
            .await
            .expect("submit");

        assert_eq!(downstream, DownstreamJobId::new("job-1"));
        let recorded = client.recorded_start_params();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0]["TranscriptionJobName"], "job-1");
        assert_eq!(recorded[0]["LanguageCode"], "en-US");
    }

    #[tokio::test]
    async fn medical_submissions_use_the_medical_job_name_field() {
        let (adapter, client) = adapter(FakeTranscribeApi::default());

        adapter
            .submit(&medical_api(), &JobId::new("job-1"), &json!({}))
            .await
            .expect("submit");

        let recorded = client.recorded_start_params();
        assert_eq!(recorded[0]["MedicalTranscriptionJobName"], "job-1");
        assert!(recorded[0].get("TranscriptionJobName").is_none());
    }

    #[tokio::test]
    async fn submit_substitutes_the_configured_data_access_role() {
        let client = Arc::new(FakeTranscribeApi::default());
        let adapter = TranscribeAdapter::new(
            client.clone(),
            Some("arn:aws:iam::123456789012:role/media-access".to_owned()),
        );

        adapter
            .submit(
                &standard_api(),
                &JobId::new("job-1"),
                &json!({
                    "JobExecutionSettings": {
                        "DataAccessRoleArn": "arn:aws:iam::999999999999:role/caller"
                    }
                }),
            )
            .await
            .expect("submit");

        let recorded = client.recorded_start_params();
        assert_eq!(
            recorded[0]["JobExecutionSettings"]["DataAccessRoleArn"],
            "arn:aws:iam::123456789012:role/media-access"
        );
    }

    #[tokio::test]
    async fn submit_leaves_params_without_execution_settings_untouched() {
        let client = Arc::new(FakeTranscribeApi::default());
        let adapter = TranscribeAdapter::new(
            client.clone(),
            Some("arn:aws:iam::123456789012:role/media-access".to_owned()),
        );

        adapter
            .submit(&standard_api(), &JobId::new("job-1"), &json!({}))
            .await
            .expect("submit");

        let recorded = client.recorded_start_params();
        assert!(recorded[0].get("JobExecutionSettings").is_none());
    }

    #[tokio::test]
    async fn submit_prefers_the_job_name_from_the_response() {
        let (adapter, _client) = adapter(FakeTranscribeApi::with_start_response(Ok(json!({
            "TranscriptionJob": { "TranscriptionJobName": "job-1-canonical" }
        }))));

        let downstream = adapter
            .submit(&standard_api(), &JobId::new("job-1"), &json!({}))
            .await
            .expect("submit");

        assert_eq!(downstream, DownstreamJobId::new("job-1-canonical"));
    }

    #[tokio::test]
    async fn submit_errors_arrive_classified() {
        let (adapter, _client) = adapter(FakeTranscribeApi::with_start_response(Err(
            TranscribeApiError::new(CODE_LIMIT_EXCEEDED, "too many concurrent jobs"),
        )));

        let error = adapter
            .submit(&standard_api(), &JobId::new("job-1"), &json!({}))
            .await
            .expect_err("quota rejection");

        assert_eq!(error.kind, FailureKind::QuotaExceeded);
        assert_eq!(error.code.as_deref(), Some(CODE_LIMIT_EXCEEDED));
    }

    #[tokio::test]
    async fn submit_rejects_capabilities_it_does_not_serve() {
        let (adapter, client) = adapter(FakeTranscribeApi::default());

        let error = adapter
            .submit(
                &ServiceApi::new("rekognition:start_face_detection"),
                &JobId::new("job-1"),
                &json!({}),
            )
            .await
            .expect_err("foreign capability");

        assert_eq!(error.kind, FailureKind::Other);
        assert!(client.recorded_start_params().is_empty());
    }

    #[tokio::test]
    async fn query_status_maps_every_native_status() {
        let cases = [
            (STATUS_QUEUED, DownstreamJobState::Queued),
            (STATUS_IN_PROGRESS, DownstreamJobState::Running),
            (STATUS_COMPLETED, DownstreamJobState::Completed),
            (STATUS_FAILED, DownstreamJobState::Failed),
        ];

        for (native, expected) in cases {
            let (adapter, _client) = adapter(FakeTranscribeApi::with_get_response(Ok(json!({
                "TranscriptionJob": { "TranscriptionJobStatus": native }
            }))));

            let state = adapter
                .query_status(&standard_api(), &JobId::new("job-1"))
                .await
                .expect("status");
            assert_eq!(state, expected, "native status {native}");
        }
    }

    #[tokio::test]
    async fn query_status_reads_the_medical_response_shape() {
        let (adapter, _client) = adapter(FakeTranscribeApi::with_get_response(Ok(json!({
            "MedicalTranscriptionJob": { "TranscriptionJobStatus": STATUS_IN_PROGRESS }
        }))));

        let state = adapter
            .query_status(&medical_api(), &JobId::new("job-1"))
            .await
            .expect("status");
        assert_eq!(state, DownstreamJobState::Running);
    }

    #[tokio::test]
    async fn query_status_rejects_unknown_native_statuses() {
        let (adapter, _client) = adapter(FakeTranscribeApi::with_get_response(Ok(json!({
            "TranscriptionJob": { "TranscriptionJobStatus": "SOMETHING_NEW" }
        }))));

        let error = adapter
            .query_status(&standard_api(), &JobId::new("job-1"))
            .await
            .expect_err("unknown status");
        assert_eq!(error.kind, FailureKind::Other);
        assert!(error.message.contains("SOMETHING_NEW"));
    }

    #[test]
    fn classification_table_matches_the_service_error_vocabulary() {
        let (adapter, _client) = adapter(FakeTranscribeApi::default());

        assert_eq!(
            adapter.classify(CODE_LIMIT_EXCEEDED),
            FailureKind::QuotaExceeded
        );
        assert_eq!(adapter.classify(CODE_CONFLICT), FailureKind::Conflict);
        assert_eq!(
            adapter.classify("InternalFailureException"),
            FailureKind::Other
        );
    }
}
