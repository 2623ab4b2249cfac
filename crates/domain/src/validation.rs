//! Key, value and id validation.
//!
//! The key grammar and value bound are fixed by the wire protocol:
//! keys are `^[a-z0-9_\-.]{1,32}$`, values are arbitrary strings of at
//! most 255 characters. Subject ids are UUIDs carried as 32 lowercase hex
//! characters with hyphens stripped.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::MAX_VALUE_LEN;
use crate::errors::{PrefsError, Result};

static KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_\-.]{1,32}$").expect("key pattern compiles"));

static UUID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-f0-9]{32}$").expect("uuid pattern compiles"));

/// Validate a preference key against the wire grammar.
pub fn validate_key(key: &str) -> Result<()> {
    if !KEY_PATTERN.is_match(key) {
        return Err(PrefsError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Validate a preference value for the given key.
///
/// Length is measured in characters, matching the server-side limit.
pub fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.chars().count() > MAX_VALUE_LEN {
        return Err(PrefsError::InvalidValue {
            key: key.to_string(),
            message: format!("value exceeds {} characters", MAX_VALUE_LEN),
        });
    }
    Ok(())
}

/// Validate a key/value pair in one call.
pub fn validate_entry(key: &str, value: &str) -> Result<()> {
    validate_key(key)?;
    validate_value(key, value)
}

/// Normalize a subject id string into its canonical wire form.
///
/// Accepts hyphenated or bare UUID strings in any case; returns 32
/// lowercase hex characters or `InvalidUuid`.
pub fn sanitize_uuid(raw: &str) -> Result<String> {
    let normalized = raw.trim().to_lowercase().replace('-', "");
    if !UUID_PATTERN.is_match(&normalized) {
        return Err(PrefsError::InvalidUuid(raw.to_string()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_keys_matching_the_grammar() {
        for key in ["a", "a.b", "some_key", "k-1", "0", "a".repeat(32).as_str()] {
            assert!(validate_key(key).is_ok(), "key {key:?} should be valid");
        }
    }

    #[test]
    fn rejects_keys_outside_the_grammar() {
        for key in ["", "UPPER", "has space", "ünïcode", "a".repeat(33).as_str(), "semi;colon"] {
            assert!(
                matches!(validate_key(key), Err(PrefsError::InvalidKey(_))),
                "key {key:?} should be invalid"
            );
        }
    }

    #[test]
    fn value_length_is_measured_in_characters() {
        assert!(validate_value("k", &"x".repeat(255)).is_ok());
        assert!(validate_value("k", &"é".repeat(255)).is_ok());
        assert!(matches!(
            validate_value("k", &"x".repeat(256)),
            Err(PrefsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn empty_value_is_valid() {
        // remove() writes an empty string; the bound is an upper bound only.
        assert!(validate_value("k", "").is_ok());
    }

    #[test]
    fn sanitize_uuid_strips_hyphens_and_lowercases() {
        let id = sanitize_uuid("069A79F4-44E9-4726-A5BE-FCA90E38AAF5").expect("valid uuid");
        assert_eq!(id, "069a79f444e94726a5befca90e38aaf5");
    }

    #[test]
    fn sanitize_uuid_rejects_malformed_input() {
        for raw in ["", "not-a-uuid", "069a79f444e94726a5befca90e38aaf", "zz9a79f444e94726a5befca90e38aaf5"]
        {
            assert!(matches!(sanitize_uuid(raw), Err(PrefsError::InvalidUuid(_))));
        }
    }
}
