use crate::error::{AppError, Result};

/// Returns true if `id` is non-empty and contains only base64url characters
/// (A-Z, a-z, 0-9, hyphen, underscore).
///
/// Session identifiers become filenames, so anything outside this alphabet
/// (in particular path separators and dots) is rejected before any path join.
pub fn is_valid_session_id(id: &str) -> bool {
    if id.is_empty() {
        return false;
    }

    id.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validates the lexical shape of a session identifier.
pub fn validate_session_id(id: &str) -> Result<()> {
    if is_valid_session_id(id) {
        Ok(())
    } else {
        Err(AppError::InvalidSessionId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_base64url_identifiers() {
        assert!(is_valid_session_id("abcDEF123-_"));
        assert!(is_valid_session_id("A"));
    }

    #[test]
    fn rejects_path_traversal_shapes() {
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../../etc/passwd"));
        assert!(!is_valid_session_id("a/b"));
        assert!(!is_valid_session_id("a\\b"));
        assert!(!is_valid_session_id("a.json"));
        assert!(!is_valid_session_id("id with spaces"));
        assert!(!is_valid_session_id("id\0null"));
        assert!(!is_valid_session_id("id+slash="));
    }

    #[test]
    fn validate_maps_to_invalid_session_id() {
        assert!(matches!(
            validate_session_id("../x").unwrap_err(),
            AppError::InvalidSessionId
        ));
    }
}
