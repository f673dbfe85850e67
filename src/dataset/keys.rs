//! Join key normalization.
//!
//! Patient and study identifiers arrive as integers in one source, floats in
//! another and padded strings in a third. All of them are reduced to one
//! canonical trimmed string before any join or lookup.

/// Normalize a raw identifier into its canonical join form.
///
/// Returns `None` for blank values and the textual null markers written by
/// dataframe exports.
#[must_use]
pub fn normalize_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_null_marker(trimmed) {
        return None;
    }

    // "1234.0" -> "1234" so float-typed ids match integer-typed ids
    if let Some((integral, fraction)) = trimmed.split_once('.') {
        if !integral.is_empty()
            && integral.bytes().all(|b| b.is_ascii_digit())
            && !fraction.is_empty()
            && fraction.bytes().all(|b| b == b'0')
        {
            return Some(integral.to_string());
        }
    }

    Some(trimmed.to_string())
}

/// Normalize an optional raw value
#[must_use]
pub fn normalize_opt(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_key)
}

fn is_null_marker(value: &str) -> bool {
    matches!(value, "nan" | "NaN" | "None" | "NaT" | "<NA>" | "null" | "NULL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(normalize_key("  00123 "), Some("00123".to_string()));
    }

    #[test]
    fn test_float_ids_match_integers() {
        assert_eq!(normalize_key("1234.0"), normalize_key("1234"));
        assert_eq!(normalize_key(" 1234.000 "), Some("1234".to_string()));
        // Genuine decimals are untouched
        assert_eq!(normalize_key("12.5"), Some("12.5".to_string()));
        // Non-numeric ids with dots are untouched
        assert_eq!(normalize_key("A1.0"), Some("A1.0".to_string()));
    }

    #[test]
    fn test_null_markers() {
        assert_eq!(normalize_key(""), None);
        assert_eq!(normalize_key("   "), None);
        assert_eq!(normalize_key("nan"), None);
        assert_eq!(normalize_opt(None), None);
    }
}
