//! Content hash identifying an observation

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use super::ObservationError;

/// MD5 of the uploaded image bytes, 32 lowercase hex characters
///
/// Primary key for observations everywhere they are stored or looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageHash(String);

impl ImageHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Md5::digest(bytes)))
    }

    pub fn parse(value: &str) -> Result<Self, ObservationError> {
        let valid = value.len() == 32
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(ObservationError::InvalidHash(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ImageHash {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ImageHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImageHash {
    type Error = ObservationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageHash> for String {
    fn from(hash: ImageHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        // md5("test data")
        let hash = ImageHash::of_bytes(b"test data");
        assert_eq!(hash.as_str(), "eb733a00c0c9d336e65691a37ab54293");
        assert_eq!(hash.short(), "eb733a00");
    }

    #[test]
    fn test_same_bytes_same_hash() {
        assert_eq!(ImageHash::of_bytes(b"abc"), ImageHash::of_bytes(b"abc"));
        assert_ne!(ImageHash::of_bytes(b"abc"), ImageHash::of_bytes(b"abd"));
    }

    #[test]
    fn test_parse() {
        assert!(ImageHash::parse("d1d2515e6f6ac4c5ca6dd739d5143cd4").is_ok());
        assert!(ImageHash::parse("D1D2515E6F6AC4C5CA6DD739D5143CD4").is_err());
        assert!(ImageHash::parse("d1d2515e").is_err());
        assert!(ImageHash::parse("zzd2515e6f6ac4c5ca6dd739d5143cd4").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let ok: Result<ImageHash, _> =
            serde_json::from_str("\"cdb235587bdee5915d6ccfa52ca9f3ac\"");
        assert!(ok.is_ok());
        let bad: Result<ImageHash, _> = serde_json::from_str("\"45643\"");
        assert!(bad.is_err());
    }
}
