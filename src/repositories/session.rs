use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::crypto::aes::{SecureKey, decrypt_token};
use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::validation::session::is_valid_session_id;

/// File-backed storage for session records, one `<id>.json` per session.
///
/// Callers must validate identifier shape before any operation that joins a
/// path; this type additionally refuses to build paths from invalid IDs.
pub struct SessionRepository {
    dir: PathBuf,
}

impl SessionRepository {
    /// Creates the sessions directory (owner-only) if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
        }
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_session_id(id) {
            return Err(AppError::InvalidSessionId);
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Persists a session record with a create-exclusive write (mode 0600).
    ///
    /// Create-exclusive means a colliding identifier or a concurrent write to
    /// the same path fails instead of producing a partially overwritten file.
    pub fn write(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id)?;

        let json = sonic_rs::to_string(session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)?;

        if let Err(e) = file.write_all(json.as_bytes()) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        Ok(())
    }

    /// Removes a session record. Missing files are not an error.
    pub fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, path: &Path, key: &SecureKey) -> Result<Session> {
        let contents = fs::read_to_string(path)?;
        let session: Session = sonic_rs::from_str(&contents)
            .map_err(|e| AppError::Corrupt(format!("Failed to decode session record: {}", e)))?;

        // Validate the ciphertext decrypts so corruption surfaces at load,
        // not at first proxied request. The plaintext is dropped immediately.
        decrypt_token(key, &session.encrypted_token)
            .map_err(|e| AppError::Corrupt(format!("Encrypted token failed validation: {}", e)))?;

        Ok(session)
    }

    /// Scans the directory at startup and returns every live session.
    ///
    /// Records already past expiry are unlinked; records that fail decoding
    /// or decryption are skipped with a warning rather than aborting startup.
    pub fn load_all(&self, key: &SecureKey) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        let now = Utc::now();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };

            if !is_valid_session_id(stem) {
                tracing::warn!("Skipping invalid session filename: {}", name);
                continue;
            }

            let path = entry.path();
            let session = match self.read(&path, key) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("Skipping corrupt session record {}: {}", name, e);
                    continue;
                }
            };

            if session.id != stem {
                tracing::warn!("Skipping session record {} with mismatched ID", name);
                continue;
            }

            if session.is_expired(now) {
                let _ = fs::remove_file(&path);
                continue;
            }

            sessions.push(session);
        }

        Ok(sessions)
    }
}
