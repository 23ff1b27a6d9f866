//! Client-side image checks
//!
//! BWS accepts JPEG and PNG only. Images are checked for size and magic
//! bytes before any request is built.

use crate::error::BwsError;

/// Smallest accepted image, in bytes.
pub const MIN_IMAGE_BYTES: usize = 1024;

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

/// Image encoding recognized from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// JPEG / JFIF
    Jpeg,
    /// PNG
    Png,
}

impl ImageFormat {
    /// Detects the format from magic bytes.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&PNG_MAGIC) {
            Some(Self::Png)
        } else {
            None
        }
    }
}

/// Checks one image; `index` is zero-based and reported one-based.
///
/// # Errors
///
/// `InvalidRequest` for an empty, too small, too large or non-JPEG/PNG image.
pub fn validate_image(index: usize, bytes: &[u8]) -> Result<ImageFormat, BwsError> {
    let position = index + 1;
    if bytes.is_empty() {
        return Err(BwsError::invalid_request(format!("image {position} is empty")));
    }
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(BwsError::invalid_request(format!(
            "image {position} is too small: {} bytes (minimum {MIN_IMAGE_BYTES})",
            bytes.len()
        )));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(BwsError::invalid_request(format!(
            "image {position} is too large: {} bytes (maximum {MAX_IMAGE_BYTES})",
            bytes.len()
        )));
    }
    ImageFormat::detect(bytes).ok_or_else(|| {
        BwsError::invalid_request(format!(
            "image {position} has an unsupported format; only JPEG and PNG are accepted"
        ))
    })
}

/// Checks every image in a batch.
///
/// # Errors
///
/// The first failing image, as in [`validate_image`].
pub fn validate_images<I, B>(images: I) -> Result<(), BwsError>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    images
        .into_iter()
        .enumerate()
        .try_for_each(|(index, image)| validate_image(index, image.as_ref()).map(|_| ()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(magic: &[u8], len: usize) -> Vec<u8> {
        let mut image = magic.to_vec();
        image.resize(len, 0);
        image
    }

    fn message(err: &BwsError) -> String {
        err.to_string()
    }

    #[test]
    fn test_detects_jpeg_and_png() {
        assert_eq!(ImageFormat::detect(&JPEG_MAGIC), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(&PNG_MAGIC), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(b"GIF89a"), None);
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_size_bounds() {
        assert!(validate_image(0, &sized(&JPEG_MAGIC, MIN_IMAGE_BYTES)).is_ok());
        assert!(validate_image(0, &sized(&PNG_MAGIC, MAX_IMAGE_BYTES)).is_ok());

        let err = validate_image(0, &sized(&JPEG_MAGIC, MIN_IMAGE_BYTES - 1)).unwrap_err();
        assert!(matches!(err, BwsError::InvalidRequest { .. }));
        assert!(message(&err).contains("too small"));

        let err = validate_image(1, &sized(&JPEG_MAGIC, MAX_IMAGE_BYTES + 1)).unwrap_err();
        assert!(message(&err).contains("image 2 is too large"));
    }

    #[test]
    fn test_empty_image_rejected() {
        let err = validate_image(0, &[]).unwrap_err();
        assert!(message(&err).contains("image 1 is empty"));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = validate_image(0, &sized(b"GIF89a", 4096)).unwrap_err();
        assert!(matches!(err, BwsError::InvalidRequest { .. }));
        assert!(message(&err).contains("unsupported format"));
    }

    #[test]
    fn test_batch_reports_first_bad_image() {
        let good = sized(&JPEG_MAGIC, 2048);
        let err = validate_images([good.clone(), good, vec![1]]).unwrap_err();
        assert!(message(&err).contains("image 3"));
    }
}
