use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents one authenticated browser.
///
/// The Bearer token only ever exists here as AES-256-GCM ciphertext; the
/// plaintext is decrypted on demand by the session store and never stored in
/// this struct or its persisted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque random identifier (128-bit, base64url).
    pub id: String,
    /// The encrypted Bearer token (`nonce || ciphertext`, base64url).
    pub encrypted_token: String,
    /// The CSRF token echoed in `X-CSRF-Token` on unsafe requests.
    pub csrf_token: String,
    /// The timestamp when the session was created.
    pub created: DateTime<Utc>,
    /// The absolute expiry timestamp (fixed window, never extended).
    pub expires: DateTime<Utc>,
    /// The timestamp of the most recent successful lookup.
    pub last_accessed: DateTime<Utc>,
}

impl Session {
    /// Returns true if the session's absolute expiry has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }
}
