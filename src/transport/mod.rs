//! Transport seam between the orchestrator and the wire.
//!
//! [`BwsTransport`] owns channel creation and the raw remote calls. The
//! production implementation is [`GrpcTransport`]; tests plug in scripted
//! fakes so no network is touched.

pub mod grpc;

use async_trait::async_trait;
use tonic::Status;

use crate::endpoint::EndpointAddress;
use crate::error::BwsError;
use crate::proto::{
    DeleteTemplateRequest, DeleteTemplateResponse, FaceEnrollmentRequest, FaceEnrollmentResponse,
    FaceTemplateStatus, FaceTemplateStatusRequest, FaceVerificationRequest,
    FaceVerificationResponse, LivenessDetectionRequest, LivenessDetectionResponse,
    SetTemplateTagsRequest, SetTemplateTagsResponse,
};

pub use grpc::{GrpcTransport, TransportSettings};

/// Channel factory and remote calls of the BWS services.
///
/// Channels must be cheap to clone and safe to share between concurrent
/// callers; no call takes exclusive ownership of one.
#[async_trait]
pub trait BwsTransport: Send + Sync + 'static {
    /// Reusable transport channel.
    type Channel: Clone + Send + Sync + 'static;

    /// Creates a channel to an endpoint. Must not block on network I/O.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when the endpoint cannot be addressed.
    fn connect(&self, endpoint: &EndpointAddress) -> Result<Self::Channel, BwsError>;

    /// `FaceRecognition/Enroll`
    async fn enroll(
        &self,
        channel: Self::Channel,
        request: FaceEnrollmentRequest,
    ) -> Result<FaceEnrollmentResponse, Status>;

    /// `FaceRecognition/Verify`
    async fn verify(
        &self,
        channel: Self::Channel,
        request: FaceVerificationRequest,
    ) -> Result<FaceVerificationResponse, Status>;

    /// `FaceRecognition/DeleteTemplate`
    async fn delete_template(
        &self,
        channel: Self::Channel,
        request: DeleteTemplateRequest,
    ) -> Result<DeleteTemplateResponse, Status>;

    /// `FaceRecognition/GetTemplateStatus`
    async fn template_status(
        &self,
        channel: Self::Channel,
        request: FaceTemplateStatusRequest,
    ) -> Result<FaceTemplateStatus, Status>;

    /// `FaceRecognition/SetTemplateTags`
    async fn set_template_tags(
        &self,
        channel: Self::Channel,
        request: SetTemplateTagsRequest,
    ) -> Result<SetTemplateTagsResponse, Status>;

    /// `BioIDWebService/LivenessDetection`
    async fn liveness_detection(
        &self,
        channel: Self::Channel,
        request: LivenessDetectionRequest,
    ) -> Result<LivenessDetectionResponse, Status>;
}
