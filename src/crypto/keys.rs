use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose};

use crate::crypto::aes::{KEY_SIZE, SecureKey, generate_key};

/// Loads the session encryption key from `path`, or generates and persists a
/// new one on first run.
///
/// The key file holds the 256-bit key base64-encoded and is written with
/// owner-only permissions. A key of the wrong length or encoding is a fatal
/// startup error, never silently regenerated.
pub fn load_or_generate_key(path: &Path) -> Result<SecureKey> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let decoded = general_purpose::STANDARD
                .decode(contents.trim())
                .with_context(|| {
                    format!("Failed to decode encryption key from {}", path.display())
                })?;
            if decoded.len() != KEY_SIZE {
                bail!(
                    "Invalid encryption key length in {}: expected {} bytes, got {}",
                    path.display(),
                    KEY_SIZE,
                    decoded.len()
                );
            }
            let mut key = [0u8; KEY_SIZE];
            key.copy_from_slice(&decoded);
            Ok(SecureKey::new(key))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No encryption key found at {}, generating new key", path.display());
            let key = generate_key();
            write_key_file(path, &key)
                .with_context(|| format!("Failed to write key file {}", path.display()))?;
            tracing::info!("Generated encryption key and saved to {} (mode 0600)", path.display());
            Ok(key)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read key file {}", path.display())),
    }
}

fn write_key_file(path: &Path, key: &SecureKey) -> std::io::Result<()> {
    let encoded = general_purpose::STANDARD.encode(key.as_bytes());
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(encoded.as_bytes())
}
