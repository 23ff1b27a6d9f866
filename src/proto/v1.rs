// Messages and clients for package `bioid.services.v1`.

/// Image payload with optional tags (e.g. challenge directions).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImageData {
    #[prost(bytes = "vec", tag = "1")]
    pub image: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, repeated, tag = "2")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JobError {
    #[prost(string, tag = "1")]
    pub error_code: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum JobStatus {
    Succeeded = 0,
    Faulted = 1,
    Cancelled = 2,
}

impl JobStatus {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Faulted => "FAULTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaceEnrollmentRequest {
    #[prost(int64, tag = "1")]
    pub class_id: i64,
    #[prost(message, repeated, tag = "2")]
    pub images: ::prost::alloc::vec::Vec<ImageData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaceEnrollmentResponse {
    #[prost(enumeration = "JobStatus", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub errors: ::prost::alloc::vec::Vec<JobError>,
    #[prost(enumeration = "face_enrollment_response::EnrollmentAction", tag = "3")]
    pub performed_action: i32,
    #[prost(int32, tag = "4")]
    pub enrolled_images: i32,
    #[prost(message, optional, tag = "5")]
    pub template_status: ::core::option::Option<FaceTemplateStatus>,
}

pub mod face_enrollment_response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum EnrollmentAction {
        None = 0,
        NewTemplateCreated = 1,
        TemplateUpdated = 2,
        TemplateUpgraded = 3,
        EnrollmentFailed = 4,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaceVerificationRequest {
    #[prost(int64, tag = "1")]
    pub class_id: i64,
    #[prost(message, optional, tag = "2")]
    pub image: ::core::option::Option<ImageData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaceVerificationResponse {
    #[prost(enumeration = "JobStatus", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub errors: ::prost::alloc::vec::Vec<JobError>,
    #[prost(bool, tag = "3")]
    pub verified: bool,
    #[prost(double, tag = "4")]
    pub score: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTemplateRequest {
    #[prost(int64, tag = "1")]
    pub class_id: i64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct DeleteTemplateResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaceTemplateStatusRequest {
    #[prost(int64, tag = "1")]
    pub class_id: i64,
    #[prost(bool, tag = "2")]
    pub download_thumbnails: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FaceTemplateStatus {
    #[prost(int64, tag = "1")]
    pub class_id: i64,
    #[prost(bool, tag = "2")]
    pub available: bool,
    #[prost(message, optional, tag = "3")]
    pub enrolled: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(string, repeated, tag = "4")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(int32, tag = "5")]
    pub encoder_version: i32,
    #[prost(int32, tag = "6")]
    pub feature_vectors: i32,
    #[prost(int32, tag = "7")]
    pub thumbnails_stored: i32,
    #[prost(message, repeated, tag = "8")]
    pub thumbnails: ::prost::alloc::vec::Vec<face_template_status::Thumbnail>,
}

pub mod face_template_status {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Thumbnail {
        #[prost(message, optional, tag = "1")]
        pub enrolled: ::core::option::Option<::prost_types::Timestamp>,
        #[prost(bytes = "vec", tag = "2")]
        pub image: ::prost::alloc::vec::Vec<u8>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetTemplateTagsRequest {
    #[prost(int64, tag = "1")]
    pub class_id: i64,
    #[prost(string, repeated, tag = "2")]
    pub tags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct SetTemplateTagsResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LivenessDetectionRequest {
    #[prost(message, repeated, tag = "1")]
    pub live_images: ::prost::alloc::vec::Vec<ImageData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LivenessDetectionResponse {
    #[prost(enumeration = "JobStatus", tag = "1")]
    pub status: i32,
    #[prost(message, repeated, tag = "2")]
    pub errors: ::prost::alloc::vec::Vec<JobError>,
    #[prost(bool, tag = "3")]
    pub live: bool,
    #[prost(double, tag = "4")]
    pub liveness_score: f64,
}

/// Client for `bioid.services.v1.FaceRecognition`.
pub mod face_recognition_client {
    #![allow(unused_variables, dead_code, clippy::let_unit_value)]
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::codegen::*;

    const SERVICE: &str = "bioid.services.v1.FaceRecognition";

    #[derive(Debug, Clone)]
    pub struct FaceRecognitionClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> FaceRecognitionClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        #[must_use]
        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        async fn unary<Req, Resp>(
            &mut self,
            request: tonic::Request<Req>,
            path: &'static str,
            method: &'static str,
        ) -> std::result::Result<tonic::Response<Resp>, tonic::Status>
        where
            Req: prost::Message + Send + Sync + 'static,
            Resp: prost::Message + Default + Send + Sync + 'static,
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = PathAndQuery::from_static(path);
            let mut req = request;
            req.extensions_mut()
                .insert(tonic::GrpcMethod::new(SERVICE, method));
            self.inner.unary(req, path, codec).await
        }

        pub async fn enroll(
            &mut self,
            request: impl tonic::IntoRequest<super::FaceEnrollmentRequest>,
        ) -> std::result::Result<tonic::Response<super::FaceEnrollmentResponse>, tonic::Status>
        {
            self.unary(
                request.into_request(),
                "/bioid.services.v1.FaceRecognition/Enroll",
                "Enroll",
            )
            .await
        }

        pub async fn verify(
            &mut self,
            request: impl tonic::IntoRequest<super::FaceVerificationRequest>,
        ) -> std::result::Result<tonic::Response<super::FaceVerificationResponse>, tonic::Status>
        {
            self.unary(
                request.into_request(),
                "/bioid.services.v1.FaceRecognition/Verify",
                "Verify",
            )
            .await
        }

        pub async fn delete_template(
            &mut self,
            request: impl tonic::IntoRequest<super::DeleteTemplateRequest>,
        ) -> std::result::Result<tonic::Response<super::DeleteTemplateResponse>, tonic::Status>
        {
            self.unary(
                request.into_request(),
                "/bioid.services.v1.FaceRecognition/DeleteTemplate",
                "DeleteTemplate",
            )
            .await
        }

        pub async fn get_template_status(
            &mut self,
            request: impl tonic::IntoRequest<super::FaceTemplateStatusRequest>,
        ) -> std::result::Result<tonic::Response<super::FaceTemplateStatus>, tonic::Status>
        {
            self.unary(
                request.into_request(),
                "/bioid.services.v1.FaceRecognition/GetTemplateStatus",
                "GetTemplateStatus",
            )
            .await
        }

        pub async fn set_template_tags(
            &mut self,
            request: impl tonic::IntoRequest<super::SetTemplateTagsRequest>,
        ) -> std::result::Result<tonic::Response<super::SetTemplateTagsResponse>, tonic::Status>
        {
            self.unary(
                request.into_request(),
                "/bioid.services.v1.FaceRecognition/SetTemplateTags",
                "SetTemplateTags",
            )
            .await
        }
    }
}

/// Client for `bioid.services.v1.BioIDWebService`.
pub mod bio_id_web_service_client {
    #![allow(unused_variables, dead_code, clippy::let_unit_value)]
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct BioIdWebServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl<T> BioIdWebServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        pub async fn liveness_detection(
            &mut self,
            request: impl tonic::IntoRequest<super::LivenessDetectionRequest>,
        ) -> std::result::Result<tonic::Response<super::LivenessDetectionResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = PathAndQuery::from_static(
                "/bioid.services.v1.BioIDWebService/LivenessDetection",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(tonic::GrpcMethod::new(
                "bioid.services.v1.BioIDWebService",
                "LivenessDetection",
            ));
            self.inner.unary(req, path, codec).await
        }
    }
}
