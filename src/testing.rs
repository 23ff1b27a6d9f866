//! In-memory scripted transport.
//!
//! Stores templates in a map, can mark endpoints as down, inject failures and
//! add per-operation latency. Used by the crate's own tests and by callers
//! who want to exercise the client without a BWS account.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tonic::Status;

use crate::endpoint::EndpointAddress;
use crate::error::BwsError;
use crate::proto::face_enrollment_response::EnrollmentAction;
use crate::proto::{
    DeleteTemplateRequest, DeleteTemplateResponse, FaceEnrollmentRequest, FaceEnrollmentResponse,
    FaceTemplateStatus, FaceTemplateStatusRequest, FaceVerificationRequest,
    FaceVerificationResponse, JobStatus, LivenessDetectionRequest, LivenessDetectionResponse,
    SetTemplateTagsRequest, SetTemplateTagsResponse,
};
use crate::transport::BwsTransport;

/// Encoder version reported for templates created by the fake.
pub const FAKE_ENCODER_VERSION: i32 = 5;

/// Channel handed out by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeChannel {
    /// Endpoint the channel was created for
    pub endpoint: String,
    /// Unique channel id
    pub id: u64,
}

/// Remote operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Enroll
    Enroll,
    /// Verify
    Verify,
    /// DeleteTemplate
    DeleteTemplate,
    /// GetTemplateStatus
    TemplateStatus,
    /// SetTemplateTags
    SetTemplateTags,
    /// LivenessDetection
    LivenessDetection,
}

/// One call seen by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Which remote call
    pub operation: Operation,
    /// Endpoint of the channel used
    pub endpoint: String,
    /// Class id, when the request has one
    pub class_id: Option<i64>,
}

#[derive(Debug, Default)]
struct Script {
    failures: VecDeque<Status>,
    down: HashSet<String>,
    latency: HashMap<Operation, Duration>,
    templates: HashMap<i64, FaceTemplateStatus>,
    verification: Option<FaceVerificationResponse>,
    enrollment: Option<FaceEnrollmentResponse>,
    liveness: Option<LivenessDetectionResponse>,
    calls: Vec<RecordedCall>,
}

/// Scripted [`BwsTransport`] with no network access.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    next_channel: AtomicU64,
}

impl ScriptedTransport {
    /// Empty fake: no templates, every endpoint up.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next call (any operation) with `status`. Queued in order.
    pub fn fail_next(&self, status: Status) {
        self.script.lock().failures.push_back(status);
    }

    /// Every call to `endpoint` answers `UNAVAILABLE` until [`set_up`](Self::set_up).
    pub fn set_down(&self, endpoint: &str) {
        self.script.lock().down.insert(endpoint.to_string());
    }

    /// Brings `endpoint` back.
    pub fn set_up(&self, endpoint: &str) {
        self.script.lock().down.remove(endpoint);
    }

    /// Delays every `operation` call by `latency`.
    pub fn set_latency(&self, operation: Operation, latency: Duration) {
        self.script.lock().latency.insert(operation, latency);
    }

    /// Response returned by every verification.
    pub fn set_verification(&self, response: FaceVerificationResponse) {
        self.script.lock().verification = Some(response);
    }

    /// Response returned by every enrollment instead of the template-map behavior.
    pub fn set_enrollment(&self, response: FaceEnrollmentResponse) {
        self.script.lock().enrollment = Some(response);
    }

    /// Response returned by every liveness detection.
    pub fn set_liveness(&self, response: LivenessDetectionResponse) {
        self.script.lock().liveness = Some(response);
    }

    /// Seeds a stored template.
    pub fn insert_template(&self, template: FaceTemplateStatus) {
        self.script.lock().templates.insert(template.class_id, template);
    }

    /// Whether a template is stored for `class_id`.
    pub fn has_template(&self, class_id: i64) -> bool {
        self.script.lock().templates.contains_key(&class_id)
    }

    /// Every call seen so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script.lock().calls.clone()
    }

    /// Number of calls of one kind.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Channels created so far.
    pub fn connect_count(&self) -> u64 {
        self.next_channel.load(Ordering::Relaxed)
    }

    /// Records the call and applies latency, outages and queued failures.
    async fn begin(
        &self,
        operation: Operation,
        channel: &FakeChannel,
        class_id: Option<i64>,
    ) -> Result<(), Status> {
        let latency = {
            let mut script = self.script.lock();
            script.calls.push(RecordedCall {
                operation,
                endpoint: channel.endpoint.clone(),
                class_id,
            });
            script.latency.get(&operation).copied()
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut script = self.script.lock();
        if script.down.contains(&channel.endpoint) {
            return Err(Status::unavailable("connection refused"));
        }
        match script.failures.pop_front() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

fn job_succeeded() -> i32 {
    JobStatus::Succeeded as i32
}

#[async_trait]
impl BwsTransport for ScriptedTransport {
    type Channel = FakeChannel;

    fn connect(&self, endpoint: &EndpointAddress) -> Result<FakeChannel, BwsError> {
        let id = self.next_channel.fetch_add(1, Ordering::Relaxed);
        Ok(FakeChannel {
            endpoint: endpoint.as_str().to_string(),
            id,
        })
    }

    async fn enroll(
        &self,
        channel: FakeChannel,
        request: FaceEnrollmentRequest,
    ) -> Result<FaceEnrollmentResponse, Status> {
        self.begin(Operation::Enroll, &channel, Some(request.class_id))
            .await?;

        let mut script = self.script.lock();
        if let Some(response) = script.enrollment.clone() {
            return Ok(response);
        }

        let images = i32::try_from(request.images.len()).unwrap_or(i32::MAX);
        let tags = request
            .images
            .iter()
            .flat_map(|i| i.tags.iter().cloned())
            .collect();
        let existed = script.templates.contains_key(&request.class_id);
        let template = script
            .templates
            .entry(request.class_id)
            .or_insert_with(|| FaceTemplateStatus {
                class_id: request.class_id,
                available: true,
                encoder_version: FAKE_ENCODER_VERSION,
                enrolled: Some(prost_types::Timestamp::default()),
                ..FaceTemplateStatus::default()
            });
        template.feature_vectors += images;
        template.thumbnails_stored += images;
        template.tags = tags;

        let action = if existed {
            EnrollmentAction::TemplateUpdated
        } else {
            EnrollmentAction::NewTemplateCreated
        };

        Ok(FaceEnrollmentResponse {
            status: job_succeeded(),
            errors: Vec::new(),
            performed_action: action as i32,
            enrolled_images: images,
            template_status: Some(template.clone()),
        })
    }

    async fn verify(
        &self,
        channel: FakeChannel,
        request: FaceVerificationRequest,
    ) -> Result<FaceVerificationResponse, Status> {
        self.begin(Operation::Verify, &channel, Some(request.class_id))
            .await?;

        let script = self.script.lock();
        if let Some(response) = script.verification.clone() {
            return Ok(response);
        }
        if !script.templates.contains_key(&request.class_id) {
            return Err(Status::not_found("TemplateNotFound"));
        }
        Ok(FaceVerificationResponse {
            status: job_succeeded(),
            errors: Vec::new(),
            verified: true,
            score: 0.93,
        })
    }

    async fn delete_template(
        &self,
        channel: FakeChannel,
        request: DeleteTemplateRequest,
    ) -> Result<DeleteTemplateResponse, Status> {
        self.begin(Operation::DeleteTemplate, &channel, Some(request.class_id))
            .await?;

        match self.script.lock().templates.remove(&request.class_id) {
            Some(_) => Ok(DeleteTemplateResponse {}),
            None => Err(Status::not_found("TemplateNotFound")),
        }
    }

    async fn template_status(
        &self,
        channel: FakeChannel,
        request: FaceTemplateStatusRequest,
    ) -> Result<FaceTemplateStatus, Status> {
        self.begin(Operation::TemplateStatus, &channel, Some(request.class_id))
            .await?;

        let script = self.script.lock();
        let Some(template) = script.templates.get(&request.class_id) else {
            return Err(Status::not_found("TemplateNotFound"));
        };
        let mut template = template.clone();
        if !request.download_thumbnails {
            template.thumbnails.clear();
        }
        Ok(template)
    }

    async fn set_template_tags(
        &self,
        channel: FakeChannel,
        request: SetTemplateTagsRequest,
    ) -> Result<SetTemplateTagsResponse, Status> {
        self.begin(Operation::SetTemplateTags, &channel, Some(request.class_id))
            .await?;

        match self.script.lock().templates.get_mut(&request.class_id) {
            Some(template) => {
                template.tags = request.tags;
                Ok(SetTemplateTagsResponse {})
            }
            None => Err(Status::not_found("TemplateNotFound")),
        }
    }

    async fn liveness_detection(
        &self,
        channel: FakeChannel,
        _request: LivenessDetectionRequest,
    ) -> Result<LivenessDetectionResponse, Status> {
        self.begin(Operation::LivenessDetection, &channel, None)
            .await?;

        Ok(self
            .script
            .lock()
            .liveness
            .clone()
            .unwrap_or(LivenessDetectionResponse {
                status: job_succeeded(),
                errors: Vec::new(),
                live: true,
                liveness_score: 0.95,
            }))
    }
}
