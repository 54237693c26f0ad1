//! Observation data model

pub mod image_hash;
pub mod observation;
pub mod upload;

pub use image_hash::ImageHash;
pub use observation::{
    InputObservation, ObservationError, ObservationRecord, DATE_FORMAT, EXIF_DATETIME_FORMAT, TIME_FORMAT,
};
pub use upload::{is_allowed_image_type, UploadedImage, ALLOWED_IMAGE_TYPES};
