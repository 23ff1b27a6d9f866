//! Attaches the BWS bearer token to outgoing calls.

use std::sync::Arc;

use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::warn;

use super::token::BwsTokenProvider;

/// Metadata key carrying the access token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// gRPC interceptor adding `authorization: Bearer <jwt>` to each request.
#[derive(Debug, Clone)]
pub struct BearerInterceptor {
    tokens: Arc<BwsTokenProvider>,
}

impl BearerInterceptor {
    /// Creates an interceptor backed by a shared token provider.
    #[must_use]
    pub const fn new(tokens: Arc<BwsTokenProvider>) -> Self {
        Self { tokens }
    }
}

impl Interceptor for BearerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = self.tokens.token().map_err(|e| {
            warn!(error = %e, "Could not sign BWS access token");
            Status::unauthenticated("failed to sign BWS access token")
        })?;

        let value = MetadataValue::try_from(format!("Bearer {token}"))
            .map_err(|_| Status::unauthenticated("BWS access token is not valid ASCII"))?;
        request.metadata_mut().insert(AUTHORIZATION_HEADER, value);
        Ok(request)
    }
}
