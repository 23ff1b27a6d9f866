//! tonic-based transport to the BWS gRPC endpoints.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::{Response, Status};
use tracing::debug;

use super::BwsTransport;
use crate::auth::{BearerInterceptor, BwsTokenProvider};
use crate::config::ClientConfig;
use crate::endpoint::EndpointAddress;
use crate::error::BwsError;
use crate::proto::bio_id_web_service_client::BioIdWebServiceClient;
use crate::proto::face_recognition_client::FaceRecognitionClient;
use crate::proto::{
    DeleteTemplateRequest, DeleteTemplateResponse, FaceEnrollmentRequest, FaceEnrollmentResponse,
    FaceTemplateStatus, FaceTemplateStatusRequest, FaceVerificationRequest,
    FaceVerificationResponse, LivenessDetectionRequest, LivenessDetectionResponse,
    SetTemplateTagsRequest, SetTemplateTagsResponse,
};

/// Largest response accepted from BWS (thumbnails can be large).
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

type AuthedChannel = InterceptedService<Channel, BearerInterceptor>;

/// Channel-level settings.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
    /// HTTP/2 keep-alive ping interval
    pub keep_alive_time: Duration,
    /// HTTP/2 keep-alive ack timeout
    pub keep_alive_timeout: Duration,
    /// Client identity for mutual TLS
    pub identity: Option<Identity>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keep_alive_time: Duration::from_secs(30),
            keep_alive_timeout: Duration::from_secs(30),
            identity: None,
        }
    }
}

impl TransportSettings {
    /// Builds settings from the client configuration, loading the mutual TLS identity if configured.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the certificate or key cannot be read or contains no PEM material.
    pub fn from_config(config: &ClientConfig) -> Result<Self, BwsError> {
        let identity = match (&config.client_cert_path, &config.client_key_path) {
            (Some(cert), Some(key)) => Some(load_identity(cert, key)?),
            (None, None) => None,
            _ => {
                return Err(BwsError::invalid_config(
                    "mutual TLS needs both a client certificate and a private key",
                ));
            }
        };

        Ok(Self {
            connect_timeout: config.connect_timeout,
            keep_alive_time: config.keep_alive_time,
            keep_alive_timeout: config.keep_alive_timeout,
            identity,
        })
    }
}

/// Production transport over tonic channels with bearer-token authentication.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    settings: TransportSettings,
    interceptor: BearerInterceptor,
}

impl GrpcTransport {
    /// Creates the transport.
    #[must_use]
    pub const fn new(settings: TransportSettings, tokens: Arc<BwsTokenProvider>) -> Self {
        Self {
            settings,
            interceptor: BearerInterceptor::new(tokens),
        }
    }

    fn tls_config(&self, endpoint: &EndpointAddress) -> ClientTlsConfig {
        let tls = ClientTlsConfig::new()
            .domain_name(endpoint.host())
            .with_native_roots();
        match &self.settings.identity {
            Some(identity) => tls.identity(identity.clone()),
            None => tls,
        }
    }

    fn face(&self, channel: Channel) -> FaceRecognitionClient<AuthedChannel> {
        FaceRecognitionClient::new(InterceptedService::new(channel, self.interceptor.clone()))
            .max_decoding_message_size(MAX_MESSAGE_BYTES)
            .max_encoding_message_size(MAX_MESSAGE_BYTES)
    }

    fn web(&self, channel: Channel) -> BioIdWebServiceClient<AuthedChannel> {
        BioIdWebServiceClient::new(InterceptedService::new(channel, self.interceptor.clone()))
            .max_decoding_message_size(MAX_MESSAGE_BYTES)
    }
}

#[async_trait]
impl BwsTransport for GrpcTransport {
    type Channel = Channel;

    fn connect(&self, endpoint: &EndpointAddress) -> Result<Channel, BwsError> {
        let mut builder = Endpoint::from_shared(endpoint.transport_uri())
            .map_err(|e| BwsError::invalid_config(format!("invalid endpoint {endpoint}: {e}")))?
            .connect_timeout(self.settings.connect_timeout)
            .http2_keep_alive_interval(self.settings.keep_alive_time)
            .keep_alive_timeout(self.settings.keep_alive_timeout)
            .keep_alive_while_idle(true)
            .tcp_nodelay(true);

        if endpoint.is_tls() {
            builder = builder.tls_config(self.tls_config(endpoint)).map_err(|e| {
                BwsError::invalid_config(format!("TLS setup failed for {endpoint}: {e}"))
            })?;
        }

        debug!(endpoint = %endpoint, tls = endpoint.is_tls(), "Created lazy BWS channel");
        Ok(builder.connect_lazy())
    }

    async fn enroll(
        &self,
        channel: Channel,
        request: FaceEnrollmentRequest,
    ) -> Result<FaceEnrollmentResponse, Status> {
        self.face(channel).enroll(request).await.map(Response::into_inner)
    }

    async fn verify(
        &self,
        channel: Channel,
        request: FaceVerificationRequest,
    ) -> Result<FaceVerificationResponse, Status> {
        self.face(channel).verify(request).await.map(Response::into_inner)
    }

    async fn delete_template(
        &self,
        channel: Channel,
        request: DeleteTemplateRequest,
    ) -> Result<DeleteTemplateResponse, Status> {
        self.face(channel)
            .delete_template(request)
            .await
            .map(Response::into_inner)
    }

    async fn template_status(
        &self,
        channel: Channel,
        request: FaceTemplateStatusRequest,
    ) -> Result<FaceTemplateStatus, Status> {
        self.face(channel)
            .get_template_status(request)
            .await
            .map(Response::into_inner)
    }

    async fn set_template_tags(
        &self,
        channel: Channel,
        request: SetTemplateTagsRequest,
    ) -> Result<SetTemplateTagsResponse, Status> {
        self.face(channel)
            .set_template_tags(request)
            .await
            .map(Response::into_inner)
    }

    async fn liveness_detection(
        &self,
        channel: Channel,
        request: LivenessDetectionRequest,
    ) -> Result<LivenessDetectionResponse, Status> {
        self.web(channel)
            .liveness_detection(request)
            .await
            .map(Response::into_inner)
    }
}

/// Reads a PEM certificate chain and private key for mutual TLS.
fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity, BwsError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|e| {
            BwsError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })
    };
    let cert_pem = read(cert_path)?;
    let key_pem = read(key_path)?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BwsError::invalid_config(format!("invalid client certificate: {e}")))?;
    if certs.is_empty() {
        return Err(BwsError::invalid_config(format!(
            "no certificate found in {}",
            cert_path.display()
        )));
    }

    rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| BwsError::invalid_config(format!("invalid client key: {e}")))?
        .ok_or_else(|| {
            BwsError::invalid_config(format!("no private key found in {}", key_path.display()))
        })?;

    Ok(Identity::from_pem(cert_pem, key_pem))
}
