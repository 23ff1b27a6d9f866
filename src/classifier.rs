//! Failure classification
//!
//! Turns a raw gRPC status (or a failed job reported inside a response) into
//! an [`ErrorClassification`]. The lookup tables live apart from the dispatch
//! code so both can be tested on their own.

use tonic::{Code, Status};
use tracing::debug;

use crate::error::ErrorCategory::{Authentication, Service, System, Validation};
use crate::error::{BwsError, ErrorClassification, ErrorCode};

/// Marker the gRPC stack emits when the service answers with an HTTP redirect,
/// which in practice means a wrong endpoint or rejected credentials.
const REDIRECT_308_MARKER: &str = "http status code 308";

/// Service-specific token recognized in a status description.
#[derive(Debug, Clone, Copy)]
pub struct ServiceToken {
    /// Lowercased CamelCase name as reported by the service
    pub name: &'static str,
    /// Descriptive phrase matched when the name is absent
    pub phrase: Option<&'static str>,
    /// Classification used when the token is found
    pub classification: ErrorClassification,
}

const fn token(
    name: &'static str,
    phrase: Option<&'static str>,
    code: ErrorCode,
    http_status: u16,
) -> ServiceToken {
    ServiceToken {
        name,
        phrase,
        classification: ErrorClassification::new(code, false, http_status, Validation),
    }
}

/// Retryable token; its HTTP status comes from the carrying transport status.
const fn transient(
    name: &'static str,
    phrase: Option<&'static str>,
    code: ErrorCode,
) -> ServiceToken {
    ServiceToken {
        name,
        phrase,
        classification: ErrorClassification::new(code, true, JOB_FAILURE_HTTP_STATUS, Service),
    }
}

/// HTTP status for failures reported inside a response rather than by the transport.
const JOB_FAILURE_HTTP_STATUS: u16 = 500;

/// Service-specific tokens, matched in order.
#[rustfmt::skip]
pub const SERVICE_TOKENS: &[ServiceToken] = &[
    transient("serviceunavailable", Some("service unavailable"), ErrorCode::ServiceUnavailable),
    transient("requesttimeout", None, ErrorCode::RequestTimeout),
    transient("connectionfailed", None, ErrorCode::ConnectionFailed),
    transient("ratelimitexceeded", Some("rate limit"), ErrorCode::RateLimitExceeded),
    transient("internalerror", None, ErrorCode::InternalError),
    transient("templateinuse", None, ErrorCode::TemplateInUse),
    token("templatenotfound", Some("template not found"), ErrorCode::TemplateNotFound, 404),
    token("templatecorrupted", None, ErrorCode::TemplateCorrupted, 404),
    token("templateexpired", None, ErrorCode::TemplateExpired, 404),
    token("templateversionmismatch", None, ErrorCode::TemplateVersionMismatch, 404),
    token("nosuitablefaceimage", Some("no suitable face"), ErrorCode::NoSuitableFaceImage, 400),
    token("multiplefacesfound", Some("multiple faces"), ErrorCode::MultipleFacesFound, 400),
    token("nofeaturevectors", Some("no feature vectors"), ErrorCode::NoFeatureVectors, 400),
    token(
        "differentfeatureversions",
        Some("different feature versions"),
        ErrorCode::DifferentFeatureVersions,
        400,
    ),
    token("invalidimageformat", None, ErrorCode::InvalidImageFormat, 400),
    token("imagetoosmall", None, ErrorCode::ImageTooSmall, 400),
    token("imagetoobig", None, ErrorCode::ImageTooBig, 400),
    token("poorimagequality", Some("poor image quality"), ErrorCode::PoorImageQuality, 400),
];

/// Default classification for a transport status, before any token override.
#[must_use]
pub const fn transport_classification(code: Code) -> ErrorClassification {
    let (code, retryable, status, category) = match code {
        Code::Unauthenticated => (ErrorCode::Unauthenticated, false, 401, Authentication),
        Code::PermissionDenied => (ErrorCode::PermissionDenied, false, 403, Authentication),
        Code::InvalidArgument => (ErrorCode::InvalidArgument, false, 400, Validation),
        Code::NotFound => (ErrorCode::TemplateNotFound, false, 404, Validation),
        Code::Unavailable => (ErrorCode::ServiceUnavailable, true, 503, Service),
        Code::DeadlineExceeded => (ErrorCode::RequestTimeout, true, 504, Service),
        Code::ResourceExhausted => (ErrorCode::RateLimitExceeded, true, 429, Service),
        Code::Cancelled => (ErrorCode::RequestCancelled, true, 499, Service),
        Code::Internal => (ErrorCode::InternalError, true, 500, Service),
        Code::Unknown => (ErrorCode::UnknownError, false, 500, System),
        Code::Ok
        | Code::AlreadyExists
        | Code::FailedPrecondition
        | Code::Aborted
        | Code::OutOfRange
        | Code::Unimplemented
        | Code::DataLoss => (ErrorCode::UnexpectedStatus, false, 500, System),
    };
    ErrorClassification::new(code, retryable, status, category)
}

/// HTTP equivalent for every transport status.
#[must_use]
pub const fn http_status_for(code: Code) -> u16 {
    match code {
        Code::Ok => 200,
        Code::Cancelled => 499,
        Code::Unknown | Code::Internal | Code::DataLoss => 500,
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => 400,
        Code::DeadlineExceeded => 504,
        Code::NotFound => 404,
        Code::AlreadyExists | Code::Aborted => 409,
        Code::PermissionDenied => 403,
        Code::ResourceExhausted => 429,
        Code::Unimplemented => 501,
        Code::Unavailable => 503,
        Code::Unauthenticated => 401,
    }
}

/// Finds the first service token in a description.
///
/// Names are tried before phrases so a precise code always wins over prose.
#[must_use]
pub fn find_service_token(description: &str) -> Option<&'static ServiceToken> {
    let lower = description.to_lowercase();
    SERVICE_TOKENS
        .iter()
        .find(|t| lower.contains(t.name))
        .or_else(|| {
            SERVICE_TOKENS
                .iter()
                .find(|t| t.phrase.is_some_and(|p| lower.contains(p)))
        })
}

/// Token classification carried by `code`; retryable tokens keep the transport's HTTP status.
fn token_classification(token: &ServiceToken, code: Code) -> ErrorClassification {
    if token.classification.retryable {
        ErrorClassification {
            http_status: http_status_for(code),
            ..token.classification
        }
    } else {
        token.classification
    }
}

/// Classifies a transport status.
///
/// Deterministic and total: every status maps to exactly one classification.
#[must_use]
pub fn classify(status: &Status) -> ErrorClassification {
    let code = status.code();
    let description = status.message();

    let classification = match code {
        Code::InvalidArgument | Code::Internal => find_service_token(description).map_or_else(
            || transport_classification(code),
            |t| token_classification(t, code),
        ),
        Code::Unknown if description.to_lowercase().contains(REDIRECT_308_MARKER) => {
            ErrorClassification::new(ErrorCode::HttpRedirect308, false, 401, Authentication)
        }
        _ => transport_classification(code),
    };

    debug!(
        grpc_code = ?code,
        error_code = %classification.code,
        category = %classification.category,
        retryable = classification.retryable,
        "Classified BWS failure"
    );

    classification
}

/// Classifies a transport status and builds the typed error.
#[must_use]
pub fn error_from_status(status: &Status) -> BwsError {
    let classification = classify(status);
    let message = match classification.code {
        ErrorCode::HttpRedirect308 => {
            "BWS answered with an HTTP 308 redirect; check the endpoint address and client credentials"
                .to_string()
        }
        _ if status.message().is_empty() => format!("{:?}", status.code()),
        _ => status.message().to_string(),
    };
    classification.into_error(message)
}

/// Classifies job errors reported inside a response whose job did not succeed.
///
/// The first job error code found in the token table decides the outcome;
/// otherwise the failure is a non-retryable `JOB_FAILED` service error.
#[must_use]
pub fn classify_job_errors<'a, I>(error_codes: I) -> ErrorClassification
where
    I: IntoIterator<Item = &'a str>,
{
    error_codes
        .into_iter()
        .find_map(|code| {
            let lower = code.to_lowercase();
            SERVICE_TOKENS.iter().find(|t| lower == t.name)
        })
        .map_or(
            ErrorClassification::new(ErrorCode::JobFailed, false, JOB_FAILURE_HTTP_STATUS, Service),
            |t| t.classification,
        )
}

impl From<Status> for BwsError {
    fn from(status: Status) -> Self {
        error_from_status(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_transport_table_defaults() {
        let unavailable = classify(&Status::unavailable("connection reset"));
        assert_eq!(unavailable.code, ErrorCode::ServiceUnavailable);
        assert!(unavailable.retryable);
        assert_eq!(unavailable.http_status, 503);

        let unauth = classify(&Status::unauthenticated("bad jwt"));
        assert_eq!(unauth.category, ErrorCategory::Authentication);
        assert!(!unauth.retryable);

        let not_found = classify(&Status::not_found("no template"));
        assert_eq!(not_found.code, ErrorCode::TemplateNotFound);
        assert_eq!(not_found.http_status, 404);
    }

    #[test]
    fn test_invalid_argument_token_override() {
        let c = classify(&Status::invalid_argument("NoSuitableFaceImage: face too small"));
        assert_eq!(c.code, ErrorCode::NoSuitableFaceImage);
        assert_eq!(c.category, ErrorCategory::Validation);
        assert!(!c.retryable);
    }

    #[test]
    fn test_invalid_argument_phrase_override() {
        let c = classify(&Status::invalid_argument("The image has poor image quality"));
        assert_eq!(c.code, ErrorCode::PoorImageQuality);
    }

    #[test]
    fn test_internal_with_non_retryable_token() {
        let c = classify(&Status::internal("TemplateCorrupted"));
        assert_eq!(c.code, ErrorCode::TemplateCorrupted);
        assert!(!c.retryable);
    }

    #[test]
    fn test_internal_without_token_is_retryable() {
        let c = classify(&Status::internal("something went wrong"));
        assert_eq!(c.code, ErrorCode::InternalError);
        assert!(c.retryable);
        assert_eq!(c.category, ErrorCategory::Service);
    }

    #[test]
    fn test_retryable_tokens_keep_transport_http_status() {
        let c = classify(&Status::internal("ServiceUnavailable"));
        assert_eq!(c.code, ErrorCode::ServiceUnavailable);
        assert!(c.retryable);
        assert_eq!(c.category, ErrorCategory::Service);
        assert_eq!(c.http_status, 500);

        let c = classify(&Status::invalid_argument("rate limit exceeded"));
        assert_eq!(c.code, ErrorCode::RateLimitExceeded);
        assert!(c.retryable);
        assert_eq!(c.http_status, 400);
    }

    #[test]
    fn test_template_tokens_keep_their_http_status() {
        assert_eq!(classify(&Status::internal("TemplateExpired")).http_status, 404);
        assert_eq!(classify(&Status::invalid_argument("ImageTooBig")).http_status, 400);
    }

    #[test]
    fn test_tokens_ignored_for_other_statuses() {
        let c = classify(&Status::unavailable("PoorImageQuality"));
        assert_eq!(c.code, ErrorCode::ServiceUnavailable);
    }

    #[test]
    fn test_redirect_escape_hatch() {
        let status = Status::unknown("protocol error: received HTTP status code 308 from server");
        let c = classify(&status);
        assert_eq!(c.code, ErrorCode::HttpRedirect308);
        assert_eq!(c.category, ErrorCategory::Authentication);

        let err = error_from_status(&status);
        assert!(matches!(err, BwsError::Authentication { .. }));
        assert!(err.to_string().contains("308"));
    }

    #[test]
    fn test_unknown_without_redirect_is_system() {
        let c = classify(&Status::unknown("boom"));
        assert_eq!(c.code, ErrorCode::UnknownError);
        assert_eq!(c.category, ErrorCategory::System);
        assert_eq!(c.http_status, 500);
    }

    #[test]
    fn test_unrecognized_statuses_are_system_500() {
        for code in [
            Code::Ok,
            Code::AlreadyExists,
            Code::FailedPrecondition,
            Code::Aborted,
            Code::OutOfRange,
            Code::Unimplemented,
            Code::DataLoss,
        ] {
            let c = classify(&Status::new(code, "x"));
            assert_eq!(c.category, ErrorCategory::System, "{code:?}");
            assert!(!c.retryable);
            assert_eq!(c.http_status, 500);
        }
    }

    #[test]
    fn test_http_table() {
        assert_eq!(http_status_for(Code::Ok), 200);
        assert_eq!(http_status_for(Code::Cancelled), 499);
        assert_eq!(http_status_for(Code::Unimplemented), 501);
        assert_eq!(http_status_for(Code::Aborted), 409);
        assert_eq!(http_status_for(Code::Unauthenticated), 401);
    }

    #[test]
    fn test_job_errors() {
        let c = classify_job_errors(["MultipleFacesFound"]);
        assert_eq!(c.code, ErrorCode::MultipleFacesFound);

        let c = classify_job_errors(["SomethingElse", ""]);
        assert_eq!(c.code, ErrorCode::JobFailed);
        assert!(!c.retryable);
    }
}
