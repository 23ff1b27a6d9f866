//! Resilient BWS client
//!
//! Every operation runs through one loop: take a channel from the pool on the
//! endpoint the registry ranks best, call with a deadline, classify the
//! failure, and retry with backoff while the classification allows it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::BwsTokenProvider;
use crate::classifier::classify_job_errors;
use crate::client::models::{
    ClassId, EnrollmentAction, EnrollmentResult, TemplateStatus, VerificationOutcome,
};
use crate::config::ClientConfig;
use crate::endpoint::{EndpointAddress, EndpointHealth, EndpointRegistry};
use crate::error::{BwsError, ErrorCategory, ErrorClassification, ErrorCode};
use crate::health::{HealthMonitor, HealthProbe, HealthState, HealthStatus, MonitorHandle};
use crate::image::{validate_image, validate_images};
use crate::liveness::{LivenessMode, LivenessRequest, LivenessResult, PASSIVE_LIVENESS_BUDGET};
use crate::observability::BwsMetrics;
use crate::pool::{ConnectionPoolManager, ConnectionPoolMetrics};
use crate::proto::{
    DeleteTemplateRequest, FaceEnrollmentRequest, FaceTemplateStatusRequest,
    FaceVerificationRequest, ImageData, JobError, JobStatus, SetTemplateTagsRequest,
};
use crate::retry::RetryPolicy;
use crate::transport::{BwsTransport, GrpcTransport, TransportSettings};

/// Class id used by health probes. Never enroll a real identity under it.
pub const PROBE_CLASS_ID: i64 = i64::MAX;

#[derive(Debug, Clone, Copy)]
struct Timeouts {
    request: Duration,
    verification: Duration,
    enrollment: Duration,
}

/// State shared by the client and its health monitor.
struct ClientCore<T: BwsTransport> {
    pool: ConnectionPoolManager<T>,
    registry: Arc<EndpointRegistry>,
    retry: RetryPolicy,
    timeouts: Timeouts,
    tokens: Option<Arc<BwsTokenProvider>>,
    metrics: Arc<BwsMetrics>,
    tls_default: bool,
}

/// Client for the BWS face recognition and liveness services.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct BwsClient<T: BwsTransport = GrpcTransport> {
    core: Arc<ClientCore<T>>,
    monitor: Arc<HealthMonitor<ClientCore<T>>>,
    health_interval: Duration,
    monitor_task: Mutex<Option<MonitorHandle>>,
}

impl BwsClient<GrpcTransport> {
    /// Builds a client over gRPC from configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when credentials are missing, the key is not base64,
    /// an endpoint does not parse or the mutual TLS files cannot be loaded.
    pub fn new(config: &ClientConfig) -> Result<Self, BwsError> {
        use secrecy::ExposeSecret as _;

        if !config.has_credentials() {
            return Err(BwsError::invalid_config(
                "BWS client id and secret key are required",
            ));
        }
        let tokens = Arc::new(BwsTokenProvider::new(
            &config.client_id,
            config.secret_key.expose_secret(),
            config.jwt_expire_minutes,
        )?);
        let transport = GrpcTransport::new(
            TransportSettings::from_config(config)?,
            Arc::clone(&tokens),
        );
        Self::build(config, Arc::new(transport), Some(tokens))
    }
}

impl<T: BwsTransport> BwsClient<T> {
    /// Builds a client over any transport. No tokens are issued.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the configuration does not validate.
    pub fn with_transport(config: &ClientConfig, transport: Arc<T>) -> Result<Self, BwsError> {
        Self::build(config, transport, None)
    }

    fn build(
        config: &ClientConfig,
        transport: Arc<T>,
        tokens: Option<Arc<BwsTokenProvider>>,
    ) -> Result<Self, BwsError> {
        config.validate()?;
        let (preferred, fallbacks) = config.endpoint_specs()?;
        let registry = Arc::new(EndpointRegistry::new(
            preferred,
            fallbacks,
            config.endpoint_failure_threshold,
        )?);
        let metrics = Arc::new(
            BwsMetrics::new().map_err(|e| BwsError::system(format!("metrics setup failed: {e}")))?,
        );
        let pool = ConnectionPoolManager::new(
            transport,
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.channel_pool_size,
            config.breaker_config(),
        )?;

        let core = Arc::new(ClientCore {
            pool,
            registry,
            retry: RetryPolicy::new(config.retry_config()),
            timeouts: Timeouts {
                request: config.request_timeout,
                verification: config.verification_timeout,
                enrollment: config.enrollment_timeout,
            },
            tokens,
            metrics: Arc::clone(&metrics),
            tls_default: config.tls_enabled,
        });
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&core),
            config.health_thresholds(),
            metrics,
        ));

        info!(
            endpoint = %core.pool.current_endpoint(),
            fallbacks = core.registry.endpoints().len() - 1,
            pool_size = config.channel_pool_size,
            "BWS client initialized"
        );

        Ok(Self {
            core,
            monitor,
            health_interval: config.health_check_interval,
            monitor_task: Mutex::new(None),
        })
    }

    /// Starts the background health monitor. Idempotent; needs a tokio runtime.
    pub fn start_health_monitor(&self) {
        let mut task = self.monitor_task.lock();
        if task.as_ref().is_none_or(MonitorHandle::is_finished) {
            *task = Some(self.monitor.spawn(self.health_interval));
        }
    }

    /// Enrolls one or more images under `class_id`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for no images or an image that is not a JPEG or PNG
    /// of acceptable size; otherwise the classified failure.
    #[instrument(skip(self, images), fields(images = images.len()))]
    pub async fn enroll(
        &self,
        class_id: ClassId,
        images: Vec<Vec<u8>>,
    ) -> Result<EnrollmentResult, BwsError> {
        if images.is_empty() {
            return Err(BwsError::invalid_request("at least one image is required"));
        }
        validate_images(&images)?;

        let count = u32::try_from(images.len()).unwrap_or(u32::MAX);
        let timeout = self.core.timeouts.enrollment.saturating_mul(count);
        let request = FaceEnrollmentRequest {
            class_id: class_id.as_i64(),
            images: images
                .into_iter()
                .map(|image| ImageData {
                    image,
                    tags: Vec::new(),
                })
                .collect(),
        };

        let response = self
            .core
            .execute("enroll", timeout, move |transport, channel| {
                let request = request.clone();
                async move {
                    let response = transport.enroll(channel, request).await?;
                    ensure_job_succeeded(response.status, &response.errors)?;
                    Ok::<_, BwsError>(response)
                }
            })
            .await?;

        let action = EnrollmentAction::from(response.performed_action);
        if action == EnrollmentAction::EnrollmentFailed {
            return Err(ErrorClassification::new(
                ErrorCode::EnrollmentFailed,
                false,
                400,
                ErrorCategory::Validation,
            )
            .into_error(format!("enrollment failed for class id {class_id}")));
        }

        info!(action = ?action, enrolled = response.enrolled_images, "Enrollment completed");
        Ok(EnrollmentResult {
            class_id,
            action,
            enrolled_images: response.enrolled_images,
            template: response
                .template_status
                .map(|t| TemplateStatus::from_proto(class_id, t)),
        })
    }

    /// Enrolls a single image.
    ///
    /// # Errors
    ///
    /// Same as [`enroll`](Self::enroll).
    pub async fn enroll_single(
        &self,
        class_id: ClassId,
        image: Vec<u8>,
    ) -> Result<EnrollmentResult, BwsError> {
        self.enroll(class_id, vec![image]).await
    }

    /// Verifies one image against the template of `class_id`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for an unacceptable image; otherwise the classified failure.
    #[instrument(skip(self, image))]
    pub async fn verify(&self, class_id: ClassId, image: Vec<u8>) -> Result<bool, BwsError> {
        Ok(self.verify_scored(class_id, image).await?.verified)
    }

    /// Verification with the match score.
    ///
    /// # Errors
    ///
    /// Same as [`verify`](Self::verify).
    pub async fn verify_scored(
        &self,
        class_id: ClassId,
        image: Vec<u8>,
    ) -> Result<VerificationOutcome, BwsError> {
        validate_image(0, &image)?;
        let request = FaceVerificationRequest {
            class_id: class_id.as_i64(),
            image: Some(ImageData {
                image,
                tags: Vec::new(),
            }),
        };

        let response = self
            .core
            .execute(
                "verify",
                self.core.timeouts.verification,
                move |transport, channel| {
                    let request = request.clone();
                    async move {
                        let response = transport.verify(channel, request).await?;
                        ensure_job_succeeded(response.status, &response.errors)?;
                        Ok::<_, BwsError>(response)
                    }
                },
            )
            .await?;

        debug!(verified = response.verified, score = response.score, "Verification completed");
        Ok(VerificationOutcome::from_match(response.verified, response.score))
    }

    /// Verification with passive liveness on the same image.
    ///
    /// Both calls run concurrently; liveness gets a small extra budget on top
    /// of the verification timeout. `verified` is set only if the face matched
    /// and was judged live; the raw match stays in `matched`.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for an unacceptable image or a threshold outside `[0, 1]`;
    /// otherwise the verification failure, then the liveness failure.
    #[instrument(skip(self, image))]
    pub async fn verify_with_liveness(
        &self,
        class_id: ClassId,
        image: Vec<u8>,
        threshold: f64,
    ) -> Result<VerificationOutcome, BwsError> {
        let liveness = LivenessRequest::new(
            vec![image.clone()],
            LivenessMode::Passive,
            threshold,
            Vec::new(),
        )?;
        let liveness_budget = self.core.timeouts.verification + PASSIVE_LIVENESS_BUDGET;

        let (verification, live) = tokio::join!(
            self.verify_scored(class_id, image),
            self.run_liveness(&liveness, liveness_budget)
        );
        let verification = verification?;
        Ok(verification.with_liveness(live?))
    }

    /// Liveness detection for a validated request.
    ///
    /// # Errors
    ///
    /// The classified failure.
    #[instrument(skip(self, request), fields(mode = %request.mode(), images = request.image_count()))]
    pub async fn detect_liveness(
        &self,
        request: &LivenessRequest,
    ) -> Result<LivenessResult, BwsError> {
        self.run_liveness(request, self.core.timeouts.request).await
    }

    async fn run_liveness(
        &self,
        request: &LivenessRequest,
        timeout: Duration,
    ) -> Result<LivenessResult, BwsError> {
        let proto = request.to_proto();
        let response = self
            .core
            .execute("liveness_detection", timeout, move |transport, channel| {
                let proto = proto.clone();
                async move {
                    let response = transport.liveness_detection(channel, proto).await?;
                    ensure_job_succeeded(response.status, &response.errors)?;
                    Ok::<_, BwsError>(response)
                }
            })
            .await?;

        let result =
            LivenessResult::evaluate(response.live, response.liveness_score, request.threshold());
        debug!(live = result.live, score = result.score, accepted = result.accepted, "Liveness completed");
        Ok(result)
    }

    /// Deletes the template of `class_id`.
    ///
    /// # Errors
    ///
    /// A non-retryable `TEMPLATE_NOT_FOUND` validation error when nothing is stored.
    #[instrument(skip(self))]
    pub async fn delete_template(&self, class_id: ClassId) -> Result<(), BwsError> {
        let request = DeleteTemplateRequest {
            class_id: class_id.as_i64(),
        };
        self.core
            .execute(
                "delete_template",
                self.core.timeouts.request,
                move |transport, channel| {
                    let request = request.clone();
                    async move {
                        transport.delete_template(channel, request).await?;
                        Ok::<_, BwsError>(())
                    }
                },
            )
            .await?;
        info!("Template deleted");
        Ok(())
    }

    /// Template metadata for `class_id`; `available` is false when nothing is stored.
    ///
    /// # Errors
    ///
    /// The classified failure, except not-found.
    #[instrument(skip(self))]
    pub async fn get_template_status(
        &self,
        class_id: ClassId,
        include_thumbnails: bool,
    ) -> Result<TemplateStatus, BwsError> {
        let request = FaceTemplateStatusRequest {
            class_id: class_id.as_i64(),
            download_thumbnails: include_thumbnails,
        };
        let result = self
            .core
            .execute(
                "get_template_status",
                self.core.timeouts.request,
                move |transport, channel| {
                    let request = request.clone();
                    async move {
                        transport
                            .template_status(channel, request)
                            .await
                            .map_err(BwsError::from)
                    }
                },
            )
            .await;

        match result {
            Ok(status) => Ok(TemplateStatus::from_proto(class_id, status)),
            Err(err) if err.code() == ErrorCode::TemplateNotFound => {
                Ok(TemplateStatus::absent(class_id))
            }
            Err(err) => Err(err),
        }
    }

    /// Replaces the tags stored with the template of `class_id`.
    ///
    /// # Errors
    ///
    /// The classified failure.
    #[instrument(skip(self, tags))]
    pub async fn set_template_tags(
        &self,
        class_id: ClassId,
        tags: Vec<String>,
    ) -> Result<(), BwsError> {
        let request = SetTemplateTagsRequest {
            class_id: class_id.as_i64(),
            tags,
        };
        self.core
            .execute(
                "set_template_tags",
                self.core.timeouts.request,
                move |transport, channel| {
                    let request = request.clone();
                    async move {
                        transport.set_template_tags(channel, request).await?;
                        Ok::<_, BwsError>(())
                    }
                },
            )
            .await
    }

    /// Cached health verdict, refreshed when older than the check interval.
    pub async fn health_status(&self) -> HealthStatus {
        self.monitor.check_health().await
    }

    /// Fresh health check that bypasses the cache.
    pub async fn check_health_now(&self) -> HealthStatus {
        self.monitor.check_health_now().await
    }

    /// Latest verdict without probing.
    pub fn latest_health(&self) -> Option<HealthStatus> {
        self.monitor.latest()
    }

    /// Healthy or degraded.
    pub async fn is_healthy(&self) -> bool {
        !self.core.pool.is_shut_down() && self.monitor.check_health().await.is_healthy()
    }

    /// Whether the active endpoint answers.
    pub async fn is_reachable(&self) -> bool {
        self.monitor.is_reachable().await
    }

    /// Fails over when the latest verdict is unhealthy.
    pub async fn trigger_failover_if_needed(&self) -> bool {
        self.monitor.trigger_failover_if_needed().await
    }

    /// Endpoint currently receiving new work.
    pub fn current_endpoint(&self) -> String {
        self.core.pool.current_endpoint().to_string()
    }

    /// Makes `endpoint` the active endpoint.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an empty or malformed address.
    pub fn switch_endpoint(&self, endpoint: &str) -> Result<(), BwsError> {
        self.core.pool.switch_endpoint(endpoint)
    }

    /// Pool, breaker and request counters.
    pub fn connection_pool_metrics(&self) -> ConnectionPoolMetrics {
        self.core.pool.metrics()
    }

    /// Per-endpoint health as tracked by the registry.
    pub fn endpoint_health(&self) -> HashMap<String, EndpointHealth> {
        self.core.registry.health_snapshot()
    }

    /// Closes the circuit breaker.
    pub fn reset_circuit(&self) {
        self.core.pool.reset_circuit();
    }

    /// Prometheus exposition text.
    pub fn metrics_text(&self) -> String {
        self.core.metrics.gather_text()
    }

    /// Stops the monitor and closes every pool. Idempotent.
    pub fn shutdown(&self) {
        if let Some(task) = self.monitor_task.lock().take() {
            task.stop();
        }
        self.core.pool.shutdown();
    }
}

impl<T: BwsTransport> Drop for BwsClient<T> {
    fn drop(&mut self) {
        if let Some(task) = self.monitor_task.get_mut().take() {
            task.stop();
        }
    }
}

impl<T: BwsTransport> ClientCore<T> {
    /// Runs `call` with retries. Open breaker and shutdown are returned at once.
    #[instrument(name = "bws_call", skip_all, fields(operation = operation, request_id = %Uuid::new_v4()))]
    async fn execute<R, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        call: F,
    ) -> Result<R, BwsError>
    where
        F: Fn(Arc<T>, T::Channel) -> Fut,
        Fut: Future<Output = Result<R, BwsError>>,
    {
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            match self.attempt(operation, timeout, &call).await {
                Ok(result) => {
                    self.metrics.record_success(operation, started.elapsed());
                    return Ok(result);
                }
                Err(err) if self.retry.should_retry(&err, attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error_code = %err.code(),
                        "Retrying BWS call"
                    );
                    self.metrics.record_retry(operation);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.metrics
                        .record_failure(operation, err.code().as_str(), started.elapsed());
                    debug!(
                        operation,
                        attempts = attempt + 1,
                        error_code = %err.code(),
                        category = %err.category(),
                        "BWS call failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn attempt<R, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        call: &F,
    ) -> Result<R, BwsError>
    where
        F: Fn(Arc<T>, T::Channel) -> Fut,
        Fut: Future<Output = Result<R, BwsError>>,
    {
        let pooled = self.pool.get_channel_with_failover()?;
        let endpoint = pooled.endpoint.as_str().to_string();
        let _in_flight = self.pool.begin_call();

        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            timeout,
            call(Arc::clone(self.pool.transport()), pooled.channel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ErrorClassification::new(
                ErrorCode::RequestTimeout,
                true,
                504,
                ErrorCategory::Service,
            )
            .into_error(format!(
                "{operation} timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        let latency = started.elapsed();

        match &outcome {
            Err(err) if err.should_trip_circuit() => {
                self.pool.record_failure(&endpoint);
                self.registry.report_failure(&endpoint, &err.to_string());
            }
            Err(err) => {
                if err.category() == ErrorCategory::Authentication {
                    if let Some(tokens) = &self.tokens {
                        tokens.invalidate();
                    }
                }
                self.record_answer(&endpoint, latency);
            }
            Ok(_) => self.record_answer(&endpoint, latency),
        }
        outcome
    }

    fn record_answer(&self, endpoint: &str, latency: Duration) {
        self.pool.record_success(endpoint, latency);
        self.registry.report_success(endpoint, latency);
    }
}

#[async_trait]
impl<T: BwsTransport> HealthProbe for ClientCore<T> {
    fn current_endpoint(&self) -> String {
        self.pool.current_endpoint().to_string()
    }

    fn region_of(&self, endpoint: &str) -> String {
        self.registry
            .region_of(endpoint)
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn endpoints(&self) -> Vec<String> {
        self.registry
            .endpoints()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    async fn probe(&self, endpoint: &str) -> Result<Duration, BwsError> {
        let address = EndpointAddress::parse(endpoint, self.tls_default)?;
        let pooled = self.pool.probe_channel(&address)?;
        let request = FaceTemplateStatusRequest {
            class_id: PROBE_CLASS_ID,
            download_thumbnails: false,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.timeouts.request,
            self.pool.transport().template_status(pooled.channel, request),
        )
        .await;
        let latency = started.elapsed();

        let result = match outcome {
            Ok(Ok(_)) => Ok(latency),
            Ok(Err(status)) => {
                let err = BwsError::from(status);
                if err.should_trip_circuit() {
                    Err(err)
                } else {
                    Ok(latency)
                }
            }
            Err(_) => Err(ErrorClassification::new(
                ErrorCode::RequestTimeout,
                true,
                504,
                ErrorCategory::Service,
            )
            .into_error("health probe timed out")),
        };

        match &result {
            Ok(latency) => self.registry.report_success(address.as_str(), *latency),
            Err(err) => self.registry.report_failure(address.as_str(), &err.to_string()),
        }
        result
    }

    fn pool_metrics(&self) -> ConnectionPoolMetrics {
        self.pool.metrics()
    }

    fn fail_over(&self, from: &str) -> Option<String> {
        self.registry.mark(from, HealthState::Unhealthy);
        let next = self.registry.select_alternate(from)?;
        match self.pool.fail_over_to(&next) {
            Ok(()) => Some(next.to_string()),
            Err(err) => {
                warn!(to = %next, error = %err, "Failover switch rejected");
                None
            }
        }
    }
}

/// Turns a response whose job did not succeed into a classified error.
fn ensure_job_succeeded(status: i32, errors: &[JobError]) -> Result<(), BwsError> {
    if status == JobStatus::Succeeded as i32 {
        return Ok(());
    }
    let classification = classify_job_errors(errors.iter().map(|e| e.error_code.as_str()));
    let message = if errors.is_empty() {
        let name = JobStatus::try_from(status).map_or("UNKNOWN", |s| s.as_str_name());
        format!("BWS job ended with status {name}")
    } else {
        errors
            .iter()
            .map(|e| format!("{}: {}", e.error_code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    };
    Err(classification.into_error(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Operation, ScriptedTransport};
    use tonic::Status;

    const EU: &str = "grpcs://eu.bws.test:443";
    const US: &str = "grpcs://us.bws.test:443";

    fn config() -> ClientConfig {
        ClientConfig {
            endpoint: EU.to_string(),
            fallback_endpoints: vec![format!("us={US}")],
            ..ClientConfig::default()
        }
    }

    fn client() -> (BwsClient<ScriptedTransport>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let client = BwsClient::with_transport(&config(), Arc::clone(&transport)).unwrap();
        (client, transport)
    }

    fn id(value: u64) -> ClassId {
        ClassId::new(value).unwrap()
    }

    fn face() -> Vec<u8> {
        let mut image = vec![0x89, b'P', b'N', b'G'];
        image.resize(1500, 7);
        image
    }

    #[test]
    fn test_job_errors_are_classified() {
        let errors = vec![JobError {
            error_code: "NoSuitableFaceImage".to_string(),
            message: "no face".to_string(),
        }];
        let err = ensure_job_succeeded(JobStatus::Faulted as i32, &errors).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoSuitableFaceImage);
        assert!(ensure_job_succeeded(JobStatus::Succeeded as i32, &[]).is_ok());

        let err = ensure_job_succeeded(JobStatus::Cancelled as i32, &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobFailed);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_new_requires_credentials() {
        let err = BwsClient::new(&ClientConfig::default()).err().unwrap();
        assert!(matches!(err, BwsError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_enroll_rejects_empty_input_locally() {
        let (client, transport) = client();
        assert!(client.enroll(id(1), Vec::new()).await.is_err());
        assert!(client.enroll(id(1), vec![Vec::new()]).await.is_err());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unacceptable_images_rejected_locally() {
        let (client, transport) = client();

        let truncated = vec![0xFF, 0xD8, 0xFF];
        let err = client.enroll(id(1), vec![face(), truncated]).await.unwrap_err();
        assert!(matches!(&err, BwsError::InvalidRequest { reason } if reason.contains("image 2")));

        let mut bmp = b"BM".to_vec();
        bmp.resize(4096, 0);
        let err = client.verify(id(1), bmp).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        let oversized = vec![0xFF; crate::image::MAX_IMAGE_BYTES + 1];
        assert!(client.enroll_single(id(1), oversized).await.is_err());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrollment_timeout_scales_with_images() {
        let (client, transport) = client();
        transport.set_latency(Operation::Enroll, Duration::from_millis(10_000));

        let result = client.enroll(id(3), vec![face(), face()]).await.unwrap();
        assert_eq!(result.action, EnrollmentAction::NewTemplateCreated);
        assert_eq!(result.enrolled_images, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_then_surfaced() {
        let (client, transport) = client();
        transport.set_latency(Operation::Verify, Duration::from_secs(5));

        let err = client.verify(id(1), face()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RequestTimeout);
        assert_eq!(transport.call_count(Operation::Verify), 4);
    }

    #[tokio::test]
    async fn test_authentication_error_is_not_retried() {
        let (client, transport) = client();
        transport.fail_next(Status::unauthenticated("bad token"));

        let err = client.delete_template(id(5)).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authentication);
        assert_eq!(transport.call_count(Operation::DeleteTemplate), 1);
        assert_eq!(client.connection_pool_metrics().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_probe_treats_not_found_as_reachable() {
        let (client, transport) = client();
        let latency = client.core.probe(EU).await.unwrap();
        assert!(latency < Duration::from_secs(1));

        transport.set_down(US);
        assert!(client.core.probe(US).await.is_err());
        assert_eq!(client.endpoint_health()[US].consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_calls() {
        let (client, _transport) = client();
        client.shutdown();
        client.shutdown();
        let err = client.verify(id(1), face()).await.unwrap_err();
        assert_eq!(err, BwsError::PoolShutdown);
        assert!(!client.is_healthy().await);
    }
}
