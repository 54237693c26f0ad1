//! Embedded image metadata (EXIF capture time and GPS position)

use exif::{In, Reader, Tag, Value};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::validation::decimal_coords;

/// What could be read from one file; every field is optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    /// `DateTimeOriginal` as stored, `YYYY:MM:DD HH:MM:SS`
    pub datetime_raw: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub trait ImageMetadataReader: Send + Sync {
    /// Never fails; unreadable metadata yields [`ImageMetadata::default`]
    fn read(&self, bytes: &[u8]) -> ImageMetadata;
}

/// EXIF reader (JPEG, PNG `eXIf`, WebP)
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadataReader;

impl ImageMetadataReader for ExifMetadataReader {
    fn read(&self, bytes: &[u8]) -> ImageMetadata {
        let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
            Ok(exif) => exif,
            Err(e) => {
                debug!(error = %e, "No EXIF metadata in image");
                return ImageMetadata::default();
            }
        };

        let datetime_raw = exif
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .and_then(|f| ascii_value(&f.value));

        let latitude = gps_coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef);
        let longitude = gps_coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef);
        if latitude.is_none() || longitude.is_none() {
            debug!("Could not extract latitude and longitude from image metadata");
        }

        ImageMetadata {
            datetime_raw,
            latitude,
            longitude,
        }
    }
}

/// Reader that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl ImageMetadataReader for NoMetadata {
    fn read(&self, _bytes: &[u8]) -> ImageMetadata {
        ImageMetadata::default()
    }
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn gps_coordinate(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let dms = match &exif.get_field(value_tag, In::PRIMARY)?.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            (parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64())
        }
        _ => return None,
    };
    let reference = ascii_value(&exif.get_field(ref_tag, In::PRIMARY)?.value)?;

    match decimal_coords(dms, &reference) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Ignoring GPS coordinate");
            None
        }
    }
}
