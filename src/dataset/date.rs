//! Date parsing for source columns.
//!
//! Every date column of every source is parsed into `NaiveDate`. Date-time
//! values keep only their date part.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Configuration for date format handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateFormatConfig {
    /// Date formats tried in order
    pub date_formats: Vec<String>,
    /// Date-time formats tried in order after the plain date formats
    pub datetime_formats: Vec<String>,
    /// Enable heuristic format detection
    pub enable_format_detection: bool,
}

impl Default for DateFormatConfig {
    fn default() -> Self {
        Self {
            date_formats: vec![
                "%Y-%m-%d".to_string(), // ISO format: 2023-01-15
                "%m/%d/%Y".to_string(), // US: 01/15/2023
                "%d.%m.%Y".to_string(), // 15.01.2023
                "%Y%m%d".to_string(),   // Compact: 20230115
                "%d %b %Y".to_string(), // 15 Jan 2023
                "%d%b%Y".to_string(),   // Stata style: 15jan2023
            ],
            datetime_formats: vec![
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M:%S%.f".to_string(),
                "%Y-%m-%dT%H:%M:%S%.f".to_string(),
                "%m/%d/%Y %H:%M".to_string(),
                "%m/%d/%Y %H:%M:%S".to_string(),
            ],
            enable_format_detection: true,
        }
    }
}

/// Parse a date string with multiple format attempts
#[must_use]
pub fn parse_date_string(s: &str, config: &DateFormatConfig) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for format in &config.date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    for format in &config.datetime_formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(s, format) {
            return Some(datetime.date());
        }
    }

    if config.enable_format_detection {
        if let Some((format, prefix_len)) = detect_date_format(s) {
            if let Some(prefix) = s.get(..prefix_len) {
                if let Ok(date) = NaiveDate::parse_from_str(prefix, format) {
                    return Some(date);
                }
            }
        }
    }

    None
}

/// Try to detect the date format based on string patterns.
///
/// Returns the format and the length of the prefix it applies to, so that
/// trailing time components or timezone suffixes are ignored.
#[must_use]
pub fn detect_date_format(s: &str) -> Option<(&'static str, usize)> {
    let bytes = s.as_bytes();

    // YYYY-MM-DD followed by anything (time, offset)
    if bytes.len() >= 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        return Some(("%Y-%m-%d", 10));
    }

    // YYYY/MM/DD
    if bytes.len() >= 10 && bytes[4] == b'/' && bytes[7] == b'/' {
        return Some(("%Y/%m/%d", 10));
    }

    // Compact YYYYMMDD
    if bytes.len() == 8 && bytes.iter().all(u8::is_ascii_digit) {
        return Some(("%Y%m%d", 8));
    }

    None
}
