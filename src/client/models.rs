//! Domain results returned by [`BwsClient`](super::BwsClient).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BwsError;
use crate::liveness::LivenessResult;
use crate::proto;
use crate::proto::face_enrollment_response::EnrollmentAction as ProtoAction;

/// Caller-assigned biometric identity key: a positive 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ClassId(i64);

impl ClassId {
    /// Validates a class id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for 0 or values above `i64::MAX`.
    pub fn new(value: u64) -> Result<Self, BwsError> {
        match i64::try_from(value) {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(BwsError::invalid_request(format!(
                "class id must be between 1 and {}, got {value}",
                i64::MAX
            ))),
        }
    }

    /// Wire representation.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl TryFrom<u64> for ClassId {
    type Error = BwsError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClassId> for u64 {
    fn from(id: ClassId) -> Self {
        id.0.unsigned_abs()
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the service did with an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentAction {
    /// Nothing changed
    None,
    /// First template for this class id
    NewTemplateCreated,
    /// Existing template extended
    TemplateUpdated,
    /// Existing template re-encoded with a newer encoder
    TemplateUpgraded,
    /// Service could not enroll the images
    EnrollmentFailed,
}

impl From<i32> for EnrollmentAction {
    fn from(value: i32) -> Self {
        match ProtoAction::try_from(value) {
            Ok(ProtoAction::NewTemplateCreated) => Self::NewTemplateCreated,
            Ok(ProtoAction::TemplateUpdated) => Self::TemplateUpdated,
            Ok(ProtoAction::TemplateUpgraded) => Self::TemplateUpgraded,
            Ok(ProtoAction::EnrollmentFailed) => Self::EnrollmentFailed,
            Ok(ProtoAction::None) | Err(_) => Self::None,
        }
    }
}

/// A stored enrollment thumbnail.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// When the source image was enrolled
    pub enrolled: Option<DateTime<Utc>>,
    /// Image bytes
    pub image: Vec<u8>,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("enrolled", &self.enrolled)
            .field("bytes", &self.image.len())
            .finish()
    }
}

/// Template metadata held by the service for one class id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStatus {
    /// Identity key
    pub class_id: ClassId,
    /// Whether a template exists
    pub available: bool,
    /// Time of the latest enrollment
    pub enrolled: Option<DateTime<Utc>>,
    /// Tags stored with the template
    pub tags: Vec<String>,
    /// Encoder version that built the template
    pub encoder_version: i32,
    /// Feature vectors in the template
    pub feature_vectors: i32,
    /// Thumbnails stored by the service
    pub thumbnails_stored: i32,
    /// Thumbnails, only when requested
    pub thumbnails: Vec<Thumbnail>,
}

impl TemplateStatus {
    /// Status for a class id with no template.
    #[must_use]
    pub const fn absent(class_id: ClassId) -> Self {
        Self {
            class_id,
            available: false,
            enrolled: None,
            tags: Vec::new(),
            encoder_version: 0,
            feature_vectors: 0,
            thumbnails_stored: 0,
            thumbnails: Vec::new(),
        }
    }

    pub(crate) fn from_proto(class_id: ClassId, status: proto::FaceTemplateStatus) -> Self {
        Self {
            class_id,
            available: status.available,
            enrolled: status.enrolled.as_ref().and_then(to_datetime),
            tags: status.tags,
            encoder_version: status.encoder_version,
            feature_vectors: status.feature_vectors,
            thumbnails_stored: status.thumbnails_stored,
            thumbnails: status
                .thumbnails
                .into_iter()
                .map(|t| Thumbnail {
                    enrolled: t.enrolled.as_ref().and_then(to_datetime),
                    image: t.image,
                })
                .collect(),
        }
    }
}

/// Outcome of an enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentResult {
    /// Identity key
    pub class_id: ClassId,
    /// Action chosen by the service
    pub action: EnrollmentAction,
    /// Images the service accepted
    pub enrolled_images: i32,
    /// Template after enrollment, when reported
    pub template: Option<TemplateStatus>,
}

impl EnrollmentResult {
    /// Feature vectors in the resulting template.
    #[must_use]
    pub fn feature_vectors(&self) -> i32 {
        self.template.as_ref().map_or(0, |t| t.feature_vectors)
    }

    /// Thumbnails stored for the resulting template.
    #[must_use]
    pub fn thumbnails_stored(&self) -> i32 {
        self.template.as_ref().map_or(0, |t| t.thumbnails_stored)
    }

    /// Encoder version of the resulting template.
    #[must_use]
    pub fn encoder_version(&self) -> i32 {
        self.template.as_ref().map_or(0, |t| t.encoder_version)
    }
}

/// Verification with optional passive liveness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// Face matched the template, and was live when liveness was checked
    pub verified: bool,
    /// Raw match verdict from the service
    pub matched: bool,
    /// Match score
    pub score: f64,
    /// Liveness verdict, when requested
    pub liveness: Option<LivenessResult>,
}

impl VerificationOutcome {
    /// Plain match result without liveness.
    #[must_use]
    pub const fn from_match(matched: bool, score: f64) -> Self {
        Self {
            verified: matched,
            matched,
            score,
            liveness: None,
        }
    }

    /// Folds a liveness verdict into the outcome; `verified` then needs both.
    #[must_use]
    pub fn with_liveness(self, liveness: LivenessResult) -> Self {
        Self {
            verified: self.matched && liveness.accepted,
            liveness: Some(liveness),
            ..self
        }
    }

    /// Matched, and live when liveness was checked.
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.verified
    }
}

#[allow(clippy::cast_sign_loss)]
fn to_datetime(ts: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_id_bounds() {
        assert!(ClassId::new(0).is_err());
        assert!(ClassId::new(u64::MAX).is_err());
        assert_eq!(ClassId::new(42).unwrap().as_i64(), 42);
        assert!(ClassId::new(i64::MAX.unsigned_abs()).is_ok());
    }

    #[test]
    fn test_class_id_serde_validates() {
        assert!(serde_json::from_str::<ClassId>("0").is_err());
        let id: ClassId = serde_json::from_str("7").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }

    #[test]
    fn test_action_from_wire() {
        assert_eq!(EnrollmentAction::from(1), EnrollmentAction::NewTemplateCreated);
        assert_eq!(EnrollmentAction::from(3), EnrollmentAction::TemplateUpgraded);
        assert_eq!(EnrollmentAction::from(99), EnrollmentAction::None);
    }

    #[test]
    fn test_template_from_proto() {
        let id = ClassId::new(9).unwrap();
        let status = TemplateStatus::from_proto(
            id,
            proto::FaceTemplateStatus {
                class_id: 9,
                available: true,
                enrolled: Some(prost_types::Timestamp {
                    seconds: 1_700_000_000,
                    nanos: 0,
                }),
                tags: vec!["kiosk".to_string()],
                encoder_version: 5,
                feature_vectors: 3,
                thumbnails_stored: 3,
                thumbnails: Vec::new(),
            },
        );
        assert!(status.available);
        assert_eq!(status.enrolled.map(|d| d.timestamp()), Some(1_700_000_000));
        assert_eq!(status.feature_vectors, 3);
    }

    #[test]
    fn test_liveness_gates_acceptance() {
        let matched = VerificationOutcome::from_match(true, 0.9);
        assert!(matched.accepted());

        let spoofed = matched.with_liveness(LivenessResult::evaluate(true, 0.4, 0.7));
        assert!(spoofed.matched);
        assert!(!spoofed.verified);
        assert!(!spoofed.accepted());

        let live = matched.with_liveness(LivenessResult::evaluate(true, 0.8, 0.7));
        assert!(live.verified);

        let mismatch = VerificationOutcome::from_match(false, 0.1)
            .with_liveness(LivenessResult::evaluate(true, 0.8, 0.7));
        assert!(!mismatch.verified);
    }
}
