use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;

/// The size of the CSRF token in bytes.
const CSRF_TOKEN_SIZE: usize = 32;

/// The size of a session identifier in bytes (128 bits).
const SESSION_ID_SIZE: usize = 16;

/// Generates a new random CSRF token.
///
/// The token is independent of the session identifier; it is issued once in
/// the login response body and echoed back in a header on unsafe requests
/// (double-submit pattern).
pub fn generate_csrf_token() -> String {
    let mut token = [0u8; CSRF_TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);

    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Generates a new random session identifier (URL-safe, no padding).
pub fn generate_session_id() -> String {
    let mut id = [0u8; SESSION_ID_SIZE];
    OsRng.fill_bytes(&mut id);

    general_purpose::URL_SAFE_NO_PAD.encode(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::session::is_valid_session_id;

    #[test]
    fn session_ids_are_distinct_and_well_formed() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        // 16 bytes -> 22 base64url chars, no padding
        assert_eq!(a.len(), 22);
        assert!(is_valid_session_id(&a));
    }

    #[test]
    fn csrf_tokens_are_distinct() {
        assert_ne!(generate_csrf_token(), generate_csrf_token());
    }
}
