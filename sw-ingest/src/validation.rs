//! Input validators for observation metadata

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Please enter a valid latitude (numerical only).")]
    Latitude,

    #[error("Please enter a valid longitude (numerical only).")]
    Longitude,

    #[error("Please enter a valid email address.")]
    Email,

    #[error("Please enter a valid date (YYYY-MM-DD).")]
    Date,

    #[error("Please enter a valid time (HH:MM or HH:MM:SS).")]
    Time,

    #[error("Invalid reference direction '{0}'. Must be 'N', 'S', 'E', or 'W'.")]
    CoordinateRef(String),
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-+]?[0-9]*\.?[0-9]+$").expect("valid number regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // No leading '+' or '.' in the local part
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_]+[a-zA-Z0-9._%+-]*@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("valid email regex")
    })
}

/// Int or float, optional sign
pub fn is_valid_number(number: &str) -> bool {
    number_re().is_match(number)
}

pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email)
}

/// `YYYY-MM-DD`
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ValidationError::Date)
}

/// `HH:MM:SS` or `HH:MM`
pub fn parse_time(value: &str) -> Result<NaiveTime, ValidationError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ValidationError::Time)
}

/// Degrees/minutes/seconds plus hemisphere to signed decimal degrees
///
/// `decimal_coords((40.0, 26.0, 46.0), "W")` is about `-40.446`.
pub fn decimal_coords(dms: (f64, f64, f64), reference: &str) -> Result<f64, ValidationError> {
    let degrees = dms.0 + dms.1 / 60.0 + dms.2 / 3600.0;
    match reference.trim() {
        "N" | "E" => Ok(degrees),
        "S" | "W" => Ok(-degrees),
        other => Err(ValidationError::CoordinateRef(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_numbers() {
        for n in ["0", "12", "-12.5", "+3.14", ".5", "44", "0.000001"] {
            assert!(is_valid_number(n), "{} should be valid", n);
        }
    }

    #[test]
    fn test_invalid_numbers() {
        for n in ["", "abc", "12.", "1.2.3", "--1", "1e5", " 12", "12,5"] {
            assert!(!is_valid_number(n), "{} should be invalid", n);
        }
    }

    #[test]
    fn test_emails() {
        for e in ["super@whale.org", "first.last@example.co.uk", "a_b+tag@x.io"] {
            assert!(is_valid_email(e), "{} should be valid", e);
        }
        for e in ["@example", "+lead@example.com", "no-at.example.com", "a@b.c", ""] {
            assert!(!is_valid_email(e), "{} should be invalid", e);
        }
    }

    #[test]
    fn test_parse_date_time() {
        assert_eq!(
            parse_date("2023-10-10").unwrap(),
            NaiveDate::from_ymd_opt(2023, 10, 10).unwrap()
        );
        assert_eq!(parse_date("10/10/2023"), Err(ValidationError::Date));

        assert_eq!(
            parse_time("10:10:10").unwrap(),
            NaiveTime::from_hms_opt(10, 10, 10).unwrap()
        );
        assert_eq!(
            parse_time("07:45").unwrap(),
            NaiveTime::from_hms_opt(7, 45, 0).unwrap()
        );
        assert_eq!(parse_time("25:00"), Err(ValidationError::Time));
    }

    #[test]
    fn test_decimal_coords() {
        let north = decimal_coords((40.0, 26.0, 46.0), "N").unwrap();
        assert!((north - 40.446_111).abs() < 1e-5);
        let west = decimal_coords((40.0, 26.0, 46.0), "W").unwrap();
        assert!((west + 40.446_111).abs() < 1e-5);
        assert!(decimal_coords((1.0, 0.0, 0.0), "X").is_err());
    }
}
