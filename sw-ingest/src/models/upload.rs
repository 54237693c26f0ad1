//! Raw uploaded file, before hashing and decoding

use base64::Engine;
use std::path::Path;

use super::ObservationError;

pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Extension check, case-insensitive
pub fn is_allowed_image_type(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_IMAGE_TYPES.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// One file as received from the client
///
/// Consumed by [`super::InputObservation::from_upload`]; the bytes are read
/// once there and not kept.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Decode a base64 (standard alphabet) payload
    pub fn from_base64(filename: impl Into<String>, data: &str) -> Result<Self, ObservationError> {
        let filename = filename.into();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| ObservationError::Encoding {
                filename: filename.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { filename, bytes })
    }
}
