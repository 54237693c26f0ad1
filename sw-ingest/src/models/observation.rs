//! One user-submitted observation
//!
//! An [`InputObservation`] pairs a decoded image with the metadata entered
//! for it and, once classification has run, the ranked species labels and
//! the user's final selection. It is keyed everywhere by its [`ImageHash`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{is_allowed_image_type, ImageHash, UploadedImage};
use crate::services::image_metadata::ImageMetadataReader;

/// EXIF `DateTimeOriginal` layout
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    #[error("Invalid image hash: {0}")]
    InvalidHash(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Invalid encoding for {filename}: {reason}")]
    Encoding { filename: String, reason: String },

    #[error("Failed to decode image {filename}: {reason}")]
    Decode { filename: String, reason: String },
}

/// Wire form of an observation, as written to the dataset
///
/// Every key is always present; unset optionals serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub image_filename: String,
    pub image_md5: ImageHash,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub author_email: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub selected_class: Option<String>,
    pub top_prediction: Option<String>,
    pub class_overriden: bool,
}

#[derive(Debug, Clone)]
pub struct InputObservation {
    image: DynamicImage,
    image_md5: ImageHash,
    uploaded_filename: String,
    /// EXIF capture time as found in the file, if any
    image_datetime_raw: Option<String>,

    latitude: Option<String>,
    longitude: Option<String>,
    author_email: String,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,

    top_predictions: Vec<String>,
    selected_class: Option<String>,
    class_overriden: bool,
}

impl InputObservation {
    /// Build from an already decoded image
    pub fn new(
        image: DynamicImage,
        image_md5: ImageHash,
        uploaded_filename: impl Into<String>,
        author_email: impl Into<String>,
    ) -> Self {
        Self {
            image,
            image_md5,
            uploaded_filename: uploaded_filename.into(),
            image_datetime_raw: None,
            latitude: None,
            longitude: None,
            author_email: author_email.into(),
            date: None,
            time: None,
            top_predictions: Vec::new(),
            selected_class: None,
            class_overriden: false,
        }
    }

    /// Hash, decode and pre-fill metadata from an uploaded file
    ///
    /// Date and time come from EXIF `DateTimeOriginal` when present and
    /// parseable, otherwise from `now` (truncated to whole seconds). EXIF GPS
    /// coordinates, when present, pre-fill latitude and longitude.
    pub fn from_upload(
        upload: UploadedImage,
        author_email: &str,
        metadata: &dyn ImageMetadataReader,
        now: NaiveDateTime,
    ) -> Result<Self, ObservationError> {
        let UploadedImage { filename, bytes } = upload;
        if !is_allowed_image_type(&filename) {
            return Err(ObservationError::UnsupportedType(filename));
        }

        let image_md5 = ImageHash::of_bytes(&bytes);
        let image = image::load_from_memory(&bytes).map_err(|e| ObservationError::Decode {
            filename: filename.clone(),
            reason: e.to_string(),
        })?;
        let meta = metadata.read(&bytes);

        let captured = meta
            .datetime_raw
            .as_deref()
            .and_then(|raw| NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATETIME_FORMAT).ok())
            .unwrap_or(now);

        debug!(
            image_hash = %image_md5,
            filename = %filename,
            exif_datetime = ?meta.datetime_raw,
            "Observation created from upload"
        );

        let mut observation = Self::new(image, image_md5, filename, author_email);
        observation.image_datetime_raw = meta.datetime_raw;
        observation.date = Some(captured.date());
        observation.time = captured.time().with_nanosecond(0);
        observation.latitude = meta.latitude.map(|v| v.to_string());
        observation.longitude = meta.longitude.map(|v| v.to_string());
        Ok(observation)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn image_md5(&self) -> &ImageHash {
        &self.image_md5
    }

    pub fn uploaded_filename(&self) -> &str {
        &self.uploaded_filename
    }

    pub fn image_datetime_raw(&self) -> Option<&str> {
        self.image_datetime_raw.as_deref()
    }

    pub fn latitude(&self) -> Option<&str> {
        self.latitude.as_deref()
    }

    pub fn longitude(&self) -> Option<&str> {
        self.longitude.as_deref()
    }

    pub fn author_email(&self) -> &str {
        &self.author_email
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    pub fn top_predictions(&self) -> &[String] {
        &self.top_predictions
    }

    pub fn selected_class(&self) -> Option<&str> {
        self.selected_class.as_deref()
    }

    pub fn class_overriden(&self) -> bool {
        self.class_overriden
    }

    pub fn set_latitude(&mut self, latitude: Option<String>) {
        self.latitude = latitude;
    }

    pub fn set_longitude(&mut self, longitude: Option<String>) {
        self.longitude = longitude;
    }

    pub fn set_author_email(&mut self, email: impl Into<String>) {
        self.author_email = email.into();
    }

    pub fn set_date(&mut self, date: Option<NaiveDate>) {
        self.date = date;
    }

    pub fn set_time(&mut self, time: Option<NaiveTime>) {
        self.time = time;
    }

    pub fn with_location(mut self, latitude: &str, longitude: &str) -> Self {
        self.latitude = Some(latitude.to_string());
        self.longitude = Some(longitude.to_string());
        self
    }

    pub fn with_datetime(mut self, date: NaiveDate, time: NaiveTime) -> Self {
        self.date = Some(date);
        self.time = Some(time);
        self
    }

    /// Store ranked labels, best first
    ///
    /// Selection defaults to the top label; an empty ranking clears it.
    pub fn set_top_predictions(&mut self, labels: Vec<String>) {
        self.selected_class = labels.first().cloned();
        self.class_overriden = false;
        self.top_predictions = labels;
    }

    /// Record the user's choice; overridden unless it matches the top label
    pub fn set_selected_class(&mut self, label: impl Into<String>) {
        let label = label.into();
        self.class_overriden = match self.top_predictions.first() {
            Some(top) => *top != label,
            None => true,
        };
        self.selected_class = Some(label);
    }

    /// Entered metadata that survives a file-set replacement
    pub(crate) fn carry_metadata_from(&mut self, previous: &InputObservation) {
        self.latitude = previous.latitude.clone();
        self.longitude = previous.longitude.clone();
        self.date = previous.date;
        self.time = previous.time;
    }

    pub fn to_record(&self) -> ObservationRecord {
        ObservationRecord {
            image_filename: self.uploaded_filename.clone(),
            image_md5: self.image_md5.clone(),
            latitude: self.latitude.clone(),
            longitude: self.longitude.clone(),
            author_email: self.author_email.clone(),
            date: self.date.map(|d| d.format(DATE_FORMAT).to_string()),
            time: self.time.map(|t| t.format(TIME_FORMAT).to_string()),
            selected_class: self.selected_class.clone(),
            top_prediction: self.top_predictions.first().cloned(),
            class_overriden: self.class_overriden,
        }
    }

    /// Flat string-keyed mapping of [`Self::to_record`]
    pub fn to_dict(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self.to_record()) {
            Ok(serde_json::Value::Object(map)) => map,
            // ObservationRecord is a plain struct of strings and bools
            _ => serde_json::Map::new(),
        }
    }
}

/// Compares every field except `time`; `date` is compared
impl PartialEq for InputObservation {
    fn eq(&self, other: &Self) -> bool {
        self.image_md5 == other.image_md5
            && self.uploaded_filename == other.uploaded_filename
            && self.image_datetime_raw == other.image_datetime_raw
            && self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.author_email == other.author_email
            && self.date == other.date
            && self.top_predictions == other.top_predictions
            && self.selected_class == other.selected_class
            && self.class_overriden == other.class_overriden
            && self.image.width() == other.image.width()
            && self.image.height() == other.image.height()
            && self.image.color() == other.image.color()
            && self.image.as_bytes() == other.image.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::image_metadata::{ImageMetadata, NoMetadata};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(4, 4, Rgb([shade, 100, 200]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_milli_opt(9, 30, 15, 250)
            .unwrap()
    }

    fn observation(shade: u8) -> InputObservation {
        InputObservation::from_upload(
            UploadedImage::new("test_image.png", png_bytes(shade)),
            "test@example.com",
            &NoMetadata,
            now(),
        )
        .unwrap()
        .with_location("12.34", "56.78")
    }

    struct FixedMetadata(ImageMetadata);

    impl ImageMetadataReader for FixedMetadata {
        fn read(&self, _bytes: &[u8]) -> ImageMetadata {
            self.0.clone()
        }
    }

    #[test]
    fn test_from_upload_defaults_to_now() {
        let obs = observation(10);
        assert_eq!(obs.date(), NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(obs.time(), NaiveTime::from_hms_opt(9, 30, 15));
        assert_eq!(obs.image_md5(), &ImageHash::of_bytes(&png_bytes(10)));
        assert_eq!(obs.image().width(), 4);
        assert_eq!(obs.selected_class(), None);
        assert!(!obs.class_overriden());
    }

    #[test]
    fn test_from_upload_uses_exif() {
        let reader = FixedMetadata(ImageMetadata {
            datetime_raw: Some("2023:10:10 10:10:10".to_string()),
            latitude: Some(-33.5),
            longitude: Some(151.25),
        });
        let obs = InputObservation::from_upload(
            UploadedImage::new("whale.PNG", png_bytes(1)),
            "",
            &reader,
            now(),
        )
        .unwrap();
        assert_eq!(obs.date(), NaiveDate::from_ymd_opt(2023, 10, 10));
        assert_eq!(obs.time(), NaiveTime::from_hms_opt(10, 10, 10));
        assert_eq!(obs.latitude(), Some("-33.5"));
        assert_eq!(obs.longitude(), Some("151.25"));
        assert_eq!(obs.image_datetime_raw(), Some("2023:10:10 10:10:10"));
    }

    #[test]
    fn test_from_upload_rejects_bad_input() {
        let err = InputObservation::from_upload(
            UploadedImage::new("notes.txt", b"hello".to_vec()),
            "",
            &NoMetadata,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ObservationError::UnsupportedType(_)));

        let err = InputObservation::from_upload(
            UploadedImage::new("broken.jpg", b"not an image".to_vec()),
            "",
            &NoMetadata,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ObservationError::Decode { .. }));
    }

    #[test]
    fn test_set_top_predictions() {
        let mut obs = observation(10);
        obs.set_top_predictions(vec!["beluga".into(), "blue_whale".into()]);
        assert_eq!(obs.selected_class(), Some("beluga"));
        assert!(!obs.class_overriden());

        obs.set_top_predictions(Vec::new());
        assert_eq!(obs.selected_class(), None);
        assert!(!obs.class_overriden());
        assert!(obs.top_predictions().is_empty());
    }

    #[test]
    fn test_override_recomputed() {
        let rankings: Vec<Vec<&str>> = vec![
            vec!["beluga", "blue_whale", "orca"],
            vec!["orca"],
            vec!["humpback_whale", "fin_whale"],
        ];
        for ranking in rankings {
            for label in ["beluga", "orca", "fin_whale", "minke_whale"] {
                let mut obs = observation(3);
                obs.set_top_predictions(ranking.iter().map(|s| s.to_string()).collect());
                obs.set_selected_class(label);
                assert_eq!(obs.class_overriden(), label != ranking[0]);
                // Idempotent
                obs.set_selected_class(label);
                assert_eq!(obs.class_overriden(), label != ranking[0]);
                assert_eq!(obs.selected_class(), Some(label));
            }
        }
    }

    #[test]
    fn test_override_flips_back() {
        let mut obs = observation(3);
        obs.set_top_predictions(vec!["orca".into(), "beluga".into()]);
        obs.set_selected_class("beluga");
        assert!(obs.class_overriden());
        obs.set_selected_class("orca");
        assert!(!obs.class_overriden());
    }

    #[test]
    fn test_selection_without_predictions() {
        let mut obs = observation(3);
        obs.set_selected_class("orca");
        assert!(obs.class_overriden());
        assert_eq!(obs.selected_class(), Some("orca"));
    }

    #[test]
    fn test_equality_ignores_time() {
        let a = observation(10);
        let mut b = observation(10);
        b.set_time(NaiveTime::from_hms_opt(23, 59, 59));
        assert_eq!(a, b);
        b.set_time(None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_inequality_per_field() {
        let base = observation(10);

        let mut other = base.clone();
        other.set_author_email("other@example.com");
        assert_ne!(base, other);

        let mut other = base.clone();
        other.set_date(NaiveDate::from_ymd_opt(2024, 6, 2));
        assert_ne!(base, other);

        let mut other = base.clone();
        other.set_latitude(Some("12.35".into()));
        assert_ne!(base, other);

        let mut other = base.clone();
        other.set_longitude(None);
        assert_ne!(base, other);

        let renamed = InputObservation::from_upload(
            UploadedImage::new("other_name.png", png_bytes(10)),
            "test@example.com",
            &NoMetadata,
            now(),
        )
        .unwrap()
        .with_location("12.34", "56.78");
        assert_ne!(base, renamed);

        // Different pixels, different hash
        assert_ne!(base, observation(11));

        // Same hash, different pixels
        let mut repainted = observation(11);
        repainted.image_md5 = base.image_md5().clone();
        assert_ne!(base, repainted);

        let mut classified = base.clone();
        classified.set_top_predictions(vec!["orca".into()]);
        assert_ne!(base, classified);
    }

    #[test]
    fn test_to_dict_schema() {
        let obs = observation(10);
        let dict = obs.to_dict();

        let mut keys: Vec<_> = dict.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "author_email",
                "class_overriden",
                "date",
                "image_filename",
                "image_md5",
                "latitude",
                "longitude",
                "selected_class",
                "time",
                "top_prediction",
            ]
        );
        assert_eq!(dict["image_filename"], "test_image.png");
        assert_eq!(dict["date"], "2024-06-01");
        assert_eq!(dict["time"], "09:30:15");
        assert_eq!(dict["latitude"], "12.34");
        assert!(dict["selected_class"].is_null());
        assert!(dict["top_prediction"].is_null());
        assert_eq!(dict["class_overriden"], false);
        assert!(!dict.contains_key("image"));
        assert!(!dict.contains_key("uploaded_file"));
    }

    #[test]
    fn test_to_dict_idempotent() {
        let mut obs = observation(10);
        assert_eq!(obs.to_dict(), obs.to_dict());

        obs.set_top_predictions(vec!["beluga".into(), "orca".into()]);
        obs.set_selected_class("orca");
        let first = obs.to_dict();
        assert_eq!(first, obs.to_dict());
        assert_eq!(first["top_prediction"], "beluga");
        assert_eq!(first["selected_class"], "orca");
        assert_eq!(first["class_overriden"], true);
    }

    #[test]
    fn test_unset_date_time_serialize_null() {
        let mut obs = observation(10);
        obs.set_date(None);
        obs.set_time(None);
        let record = obs.to_record();
        assert_eq!(record.date, None);
        let dict = obs.to_dict();
        assert!(dict["date"].is_null());
        assert!(dict["time"].is_null());
    }
}
