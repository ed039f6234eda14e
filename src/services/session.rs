use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::crypto::aes::{SecureKey, decrypt_token, encrypt_token};
use crate::crypto::csrf::{generate_csrf_token, generate_session_id};
use crate::crypto::keys::load_or_generate_key;
use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::repositories::session::SessionRepository;
use crate::validation::session::validate_session_id;

/// How often the background task sweeps for expired sessions.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Owns the set of live sessions.
///
/// The in-memory index is guarded by a reader/writer lock: lookups take the
/// read path, creation/deletion/last-accessed refresh take the write path.
/// Decryption always happens outside the lock. Two ordering invariants hold
/// across operations: a session file is written before its index entry exists,
/// and an index entry is removed before its file is.
pub struct SessionStore {
    index: RwLock<HashMap<String, Session>>,
    repo: SessionRepository,
    key: SecureKey,
    default_ttl: Duration,
}

impl SessionStore {
    /// Loads the encryption key and any persisted sessions, then builds the
    /// in-memory index. Corrupt records are skipped, expired ones unlinked.
    pub fn new(
        sessions_dir: &Path,
        key_file: &Path,
        default_ttl: Duration,
    ) -> anyhow::Result<Self> {
        let key = load_or_generate_key(key_file)?;
        let repo = SessionRepository::new(sessions_dir)
            .map_err(|e| anyhow::anyhow!("failed to create sessions directory: {}", e))?;

        let mut index = HashMap::new();
        for session in repo
            .load_all(&key)
            .map_err(|e| anyhow::anyhow!("failed to load existing sessions: {}", e))?
        {
            index.insert(session.id.clone(), session);
        }
        tracing::info!("Loaded {} live session(s) from disk", index.len());

        Ok(Self {
            index: RwLock::new(index),
            repo,
            key,
            default_ttl,
        })
    }

    // A poisoned lock is recovered rather than propagated so one panicking
    // sweep cannot take the whole store down.
    fn read_index(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a session holding `token` encrypted at rest.
    ///
    /// The durable record is written before the index insert, so a session is
    /// never servable without its on-disk record.
    pub fn create(&self, token: &str, ttl: Option<Duration>) -> Result<Session> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::Internal(format!("Session TTL out of range: {}", e)))?;

        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            encrypted_token: encrypt_token(&self.key, token)?,
            csrf_token: generate_csrf_token(),
            created: now,
            expires: now + ttl,
            last_accessed: now,
        };

        self.repo.write(&session)?;

        self.write_index().insert(session.id.clone(), session.clone());

        Ok(session)
    }

    /// Looks up a session, refreshing its last-accessed time.
    ///
    /// The identifier's lexical shape is validated before any storage access.
    /// An expired session is deleted and reported as `SessionExpired` exactly
    /// once; later calls see `SessionNotFound`.
    pub fn get(&self, id: &str) -> Result<Session> {
        validate_session_id(id)?;

        let now = Utc::now();
        let mut index = self.write_index();
        let session = index.get_mut(id).ok_or(AppError::SessionNotFound)?;

        if session.is_expired(now) {
            index.remove(id);
            drop(index);
            if let Err(e) = self.repo.remove(id) {
                tracing::warn!("Failed to remove expired session file {}: {}", id, e);
            }
            return Err(AppError::SessionExpired);
        }

        session.last_accessed = now;
        Ok(session.clone())
    }

    /// Decrypts and returns the Bearer token for a session.
    ///
    /// Only the ciphertext is read under the lock; decryption happens outside
    /// it and the plaintext is never cached on the session object.
    pub fn get_token(&self, id: &str) -> Result<String> {
        validate_session_id(id)?;

        let encrypted_token = {
            let index = self.read_index();
            let session = index.get(id).ok_or(AppError::SessionNotFound)?;
            session.encrypted_token.clone()
        };

        decrypt_token(&self.key, &encrypted_token)
    }

    /// Removes a session. Deleting a nonexistent session is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        validate_session_id(id)?;

        self.write_index().remove(id);
        self.repo.remove(id)
    }

    /// Full expiry sweep: drops every expired index entry, then unlinks the
    /// corresponding files outside the lock.
    pub fn cleanup(&self) {
        let now = Utc::now();

        let expired: Vec<String> = {
            let mut index = self.write_index();
            let ids: Vec<String> = index
                .iter()
                .filter(|(_, session)| session.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                index.remove(id);
            }
            ids
        };

        for id in &expired {
            if let Err(e) = self.repo.remove(id) {
                tracing::warn!("Failed to remove expired session file {}: {}", id, e);
            }
        }

        if !expired.is_empty() {
            tracing::info!("Expired {} session(s)", expired.len());
        }
    }

    /// Spawns the periodic expiry sweep.
    ///
    /// The task observes cancellation within one tick and a panicking pass is
    /// caught at the task boundary instead of killing the loop.
    pub fn spawn_cleanup_task(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Session cleanup task shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            store.cleanup();
                        }));
                        if result.is_err() {
                            tracing::error!("Session cleanup pass panicked; continuing");
                        }
                    }
                }
            }
        })
    }
}
