//! Liveness detection requests and results
//!
//! A [`LivenessRequest`] is validated when it is built, so a malformed
//! request never reaches the network.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BwsError;
use crate::image::validate_images;
use crate::proto::{ImageData, LivenessDetectionRequest};

/// Default acceptance threshold for the liveness score.
pub const DEFAULT_LIVENESS_THRESHOLD: f64 = 0.7;

/// Most challenge directions one request may carry.
pub const MAX_CHALLENGE_DIRECTIONS: usize = 4;

/// Extra latency allowed for passive liveness folded into a verification.
pub const PASSIVE_LIVENESS_BUDGET: Duration = Duration::from_millis(200);

/// Liveness detection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivenessMode {
    /// Single image, inferred from texture
    Passive,
    /// Two images, user prompted to move
    Active,
    /// Two images, user follows directional cues
    ChallengeResponse,
}

impl LivenessMode {
    /// Exact number of images this mode requires.
    #[must_use]
    pub const fn expected_images(self) -> usize {
        match self {
            Self::Passive => 1,
            Self::Active | Self::ChallengeResponse => 2,
        }
    }

    /// Get the string representation of the mode
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passive => "PASSIVE",
            Self::Active => "ACTIVE",
            Self::ChallengeResponse => "CHALLENGE_RESPONSE",
        }
    }
}

impl fmt::Display for LivenessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Head movement cue for challenge-response liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChallengeDirection {
    /// Look up
    Up,
    /// Look down
    Down,
    /// Turn left
    Left,
    /// Turn right
    Right,
}

impl ChallengeDirection {
    /// Tag sent with the second image.
    #[must_use]
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

/// Validated liveness request.
#[derive(Clone, PartialEq)]
pub struct LivenessRequest {
    images: Vec<Vec<u8>>,
    mode: LivenessMode,
    threshold: f64,
    directions: Vec<ChallengeDirection>,
}

impl LivenessRequest {
    /// Builds a request, checking images, threshold and challenge directions.
    ///
    /// Only challenge-response requests may carry directions: between one and
    /// [`MAX_CHALLENGE_DIRECTIONS`], without repeats.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when the combination is invalid.
    pub fn new(
        images: Vec<Vec<u8>>,
        mode: LivenessMode,
        threshold: f64,
        directions: Vec<ChallengeDirection>,
    ) -> Result<Self, BwsError> {
        if images.is_empty() {
            return Err(BwsError::invalid_request("at least one image is required"));
        }
        if images.len() != mode.expected_images() {
            return Err(BwsError::invalid_request(format!(
                "{mode} mode requires exactly {} image(s), got {}",
                mode.expected_images(),
                images.len()
            )));
        }
        validate_images(&images)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(BwsError::invalid_request(format!(
                "threshold must be between 0.0 and 1.0, got {threshold}"
            )));
        }
        if mode == LivenessMode::ChallengeResponse {
            validate_directions(&directions)?;
        } else if !directions.is_empty() {
            return Err(BwsError::invalid_request(format!(
                "challenge directions are only valid in CHALLENGE_RESPONSE mode, not {mode}"
            )));
        }

        Ok(Self {
            images,
            mode,
            threshold,
            directions,
        })
    }

    /// Passive request with the default threshold.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an image that is not a JPEG or PNG of acceptable size.
    pub fn passive(image: Vec<u8>) -> Result<Self, BwsError> {
        Self::new(
            vec![image],
            LivenessMode::Passive,
            DEFAULT_LIVENESS_THRESHOLD,
            Vec::new(),
        )
    }

    /// Active request with the default threshold.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unacceptable images.
    pub fn active(first: Vec<u8>, second: Vec<u8>) -> Result<Self, BwsError> {
        Self::new(
            vec![first, second],
            LivenessMode::Active,
            DEFAULT_LIVENESS_THRESHOLD,
            Vec::new(),
        )
    }

    /// Challenge-response request with the default threshold.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unacceptable images, or for directions that
    /// are missing, repeated or more than [`MAX_CHALLENGE_DIRECTIONS`].
    pub fn challenge_response(
        first: Vec<u8>,
        second: Vec<u8>,
        directions: Vec<ChallengeDirection>,
    ) -> Result<Self, BwsError> {
        Self::new(
            vec![first, second],
            LivenessMode::ChallengeResponse,
            DEFAULT_LIVENESS_THRESHOLD,
            directions,
        )
    }

    /// Mode
    #[must_use]
    pub const fn mode(&self) -> LivenessMode {
        self.mode
    }

    /// Acceptance threshold
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of images
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Challenge directions, empty unless challenge-response
    #[must_use]
    pub fn directions(&self) -> &[ChallengeDirection] {
        &self.directions
    }

    /// Wire message; directions ride as tags on the second image.
    #[must_use]
    pub fn to_proto(&self) -> LivenessDetectionRequest {
        let tags: Vec<String> = self
            .directions
            .iter()
            .map(|d| d.as_tag().to_string())
            .collect();

        let live_images = self
            .images
            .iter()
            .enumerate()
            .map(|(index, image)| ImageData {
                image: image.clone(),
                tags: if index == 1 { tags.clone() } else { Vec::new() },
            })
            .collect();

        LivenessDetectionRequest { live_images }
    }
}

fn validate_directions(directions: &[ChallengeDirection]) -> Result<(), BwsError> {
    if directions.is_empty() {
        return Err(BwsError::invalid_request(
            "challenge-response mode requires challenge directions",
        ));
    }
    if directions.len() > MAX_CHALLENGE_DIRECTIONS {
        return Err(BwsError::invalid_request(format!(
            "at most {MAX_CHALLENGE_DIRECTIONS} challenge directions are allowed, got {}",
            directions.len()
        )));
    }
    for (index, direction) in directions.iter().enumerate() {
        if directions[..index].contains(direction) {
            return Err(BwsError::invalid_request(format!(
                "duplicate challenge direction {}",
                direction.as_tag()
            )));
        }
    }
    Ok(())
}

impl fmt::Debug for LivenessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessRequest")
            .field("image_count", &self.images.len())
            .field("mode", &self.mode)
            .field("threshold", &self.threshold)
            .field("directions", &self.directions)
            .finish()
    }
}

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessResult {
    /// Service verdict
    pub live: bool,
    /// Service score in `[0.0, 1.0]`
    pub score: f64,
    /// `live` and `score >= threshold`
    pub accepted: bool,
}

impl LivenessResult {
    /// Applies the acceptance threshold to a service answer.
    #[must_use]
    pub fn evaluate(live: bool, score: f64, threshold: f64) -> Self {
        Self {
            live,
            score,
            accepted: live && score >= threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img() -> Vec<u8> {
        let mut image = vec![0xFF, 0xD8, 0xFF, 0xE0];
        image.resize(2048, 0);
        image
    }

    fn reason(result: Result<LivenessRequest, BwsError>) -> String {
        match result {
            Err(BwsError::InvalidRequest { reason }) => reason,
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_passive_requires_one_image() {
        assert!(LivenessRequest::passive(img()).is_ok());
        let err = LivenessRequest::new(vec![img(), img()], LivenessMode::Passive, 0.5, vec![])
            .unwrap_err();
        assert!(matches!(err, BwsError::InvalidRequest { .. }));
    }

    #[test]
    fn test_two_image_modes_reject_one_image() {
        for mode in [LivenessMode::Active, LivenessMode::ChallengeResponse] {
            let result = LivenessRequest::new(vec![img()], mode, 0.5, vec![ChallengeDirection::Up]);
            assert!(result.is_err(), "{mode} accepted a single image");
        }
    }

    #[test]
    fn test_challenge_needs_directions() {
        assert!(LivenessRequest::challenge_response(img(), img(), vec![]).is_err());
        assert!(
            LivenessRequest::challenge_response(img(), img(), vec![ChallengeDirection::Left])
                .is_ok()
        );
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(LivenessRequest::new(vec![img()], LivenessMode::Passive, 0.0, vec![]).is_ok());
        assert!(LivenessRequest::new(vec![img()], LivenessMode::Passive, 1.0, vec![]).is_ok());
        assert!(LivenessRequest::new(vec![img()], LivenessMode::Passive, -0.1, vec![]).is_err());
        assert!(LivenessRequest::new(vec![img()], LivenessMode::Passive, 1.1, vec![]).is_err());
        assert!(LivenessRequest::new(vec![img()], LivenessMode::Passive, f64::NAN, vec![]).is_err());
    }

    #[test]
    fn test_empty_image_rejected() {
        assert!(LivenessRequest::active(img(), Vec::new()).is_err());
    }

    #[test]
    fn test_image_content_checked() {
        assert!(reason(LivenessRequest::passive(vec![0xFF, 0xD8, 0xFF])).contains("too small"));

        let mut gif = b"GIF89a".to_vec();
        gif.resize(4096, 0);
        assert!(reason(LivenessRequest::active(img(), gif)).contains("image 2"));
    }

    #[test]
    fn test_too_many_directions_rejected() {
        use ChallengeDirection::{Down, Left, Right, Up};
        let all = vec![Up, Down, Left, Right];
        assert!(LivenessRequest::challenge_response(img(), img(), all).is_ok());

        let err = reason(LivenessRequest::challenge_response(
            img(),
            img(),
            vec![Left, Left, Up, Down, Right],
        ));
        assert!(err.contains("at most 4"));
    }

    #[test]
    fn test_duplicate_directions_rejected() {
        use ChallengeDirection::{Left, Up};
        let err = reason(LivenessRequest::challenge_response(img(), img(), vec![Up, Left, Up]));
        assert!(err.contains("duplicate challenge direction UP"));
    }

    #[test]
    fn test_directions_only_for_challenge_mode() {
        let err = reason(LivenessRequest::new(
            vec![img(), img()],
            LivenessMode::Active,
            0.5,
            vec![ChallengeDirection::Up],
        ));
        assert!(err.contains("CHALLENGE_RESPONSE"));
        let passive = LivenessRequest::new(
            vec![img()],
            LivenessMode::Passive,
            0.5,
            vec![ChallengeDirection::Down],
        );
        assert!(passive.is_err());
    }

    #[test]
    fn test_directions_tag_second_image() {
        let request = LivenessRequest::challenge_response(
            img(),
            img(),
            vec![ChallengeDirection::Up, ChallengeDirection::Right],
        )
        .unwrap();
        let proto = request.to_proto();
        assert_eq!(proto.live_images.len(), 2);
        assert!(proto.live_images[0].tags.is_empty());
        assert_eq!(proto.live_images[1].tags, vec!["UP", "RIGHT"]);
    }

    #[test]
    fn test_result_acceptance() {
        assert!(LivenessResult::evaluate(true, 0.7, 0.7).accepted);
        assert!(!LivenessResult::evaluate(true, 0.69, 0.7).accepted);
        assert!(!LivenessResult::evaluate(false, 0.99, 0.7).accepted);
    }
}
