use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Entries reclaimed per cleanup invocation. Bounds lock-hold time against
/// very large key cardinality; a huge map drains over several invocations.
const CLEANUP_BATCH_SIZE: usize = 1000;

struct AttemptEntry {
    count: u32,
    window_start: Instant,
}

struct Inner {
    // BTreeMap gives the stable iteration order the cleanup cursor needs.
    attempts: BTreeMap<String, AttemptEntry>,
    // Last key processed by the previous cleanup batch; None restarts from
    // the beginning of the map.
    cursor: Option<String>,
}

/// Fixed-window login rate limiter keyed by resolved client identity.
///
/// An entry whose window has elapsed is logically expired and treated as
/// absent even while still physically present; lazy removal happens on the
/// next check and incremental removal in `cleanup_batch`.
///
/// Explicitly constructed and injected wherever needed; the background
/// reclamation task's lifetime is tied to the owning server's cancellation
/// token rather than to process startup.
pub struct RateLimiter {
    inner: Mutex<Inner>,
    window: Duration,
    max_attempts: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_attempts: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                attempts: BTreeMap::new(),
                cursor: None,
            }),
            window,
            max_attempts,
        }
    }

    /// The rate-limit window, exposed for the `Retry-After` hint.
    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock is recovered; a panicking cleanup pass must not
        // wedge the login path.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if `identity` may attempt a login right now.
    ///
    /// A stale entry is dropped lazily here rather than waiting for the sweep.
    pub fn check_allowed(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.lock();

        if let Some(entry) = inner.attempts.get(identity) {
            if now.duration_since(entry.window_start) > self.window {
                inner.attempts.remove(identity);
                return true;
            }
            return entry.count < self.max_attempts;
        }

        true
    }

    /// Records a failed login attempt for `identity`.
    pub fn record_failure(&self, identity: &str) {
        let now = Instant::now();
        let mut inner = self.lock();

        match inner.attempts.get_mut(identity) {
            Some(entry) if now.duration_since(entry.window_start) <= self.window => {
                entry.count += 1;
            }
            _ => {
                inner.attempts.insert(
                    identity.to_string(),
                    AttemptEntry { count: 1, window_start: now },
                );
            }
        }
    }

    /// Clears the counter for `identity` after a successful login.
    pub fn reset(&self, identity: &str) {
        self.lock().attempts.remove(identity);
    }

    /// Reclaims stale entries in one bounded batch.
    ///
    /// Advances a persistent cursor through the map's stable order, examining
    /// at most `CLEANUP_BATCH_SIZE` entries and wrapping at the end. Returns
    /// `(processed, deleted)` counts for logging.
    pub fn cleanup_batch(&self) -> (usize, usize) {
        let now = Instant::now();
        let mut inner = self.lock();

        if inner.attempts.is_empty() {
            inner.cursor = None;
            return (0, 0);
        }

        let lower = match inner.cursor.take() {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let mut batch: Vec<String> = inner
            .attempts
            .range::<String, _>((lower.as_ref(), Bound::Unbounded))
            .take(CLEANUP_BATCH_SIZE)
            .map(|(key, _)| key.clone())
            .collect();

        // Cursor past the last key: wrap to the start of the map.
        if batch.is_empty() {
            batch = inner
                .attempts
                .keys()
                .take(CLEANUP_BATCH_SIZE)
                .cloned()
                .collect();
        }

        let processed = batch.len();
        let exhausted = processed < CLEANUP_BATCH_SIZE;

        let mut deleted = 0;
        for key in &batch {
            let stale = inner
                .attempts
                .get(key)
                .is_some_and(|entry| now.duration_since(entry.window_start) > self.window);
            if stale {
                inner.attempts.remove(key);
                deleted += 1;
            }
        }

        inner.cursor = if exhausted { None } else { batch.pop() };

        (processed, deleted)
    }

    /// Spawns the periodic incremental reclamation task.
    ///
    /// Cancellation is observed within one tick; a panicking pass is caught
    /// at the task boundary so one bad entry cannot kill the loop.
    pub fn spawn_cleanup_task(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Rate limiter cleanup task shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            limiter.cleanup_batch()
                        }));
                        match result {
                            Ok((processed, deleted)) if processed > 0 => {
                                tracing::debug!(
                                    "Rate limiter cleanup: processed {}, deleted {}",
                                    processed,
                                    deleted
                                );
                            }
                            Ok(_) => {}
                            Err(_) => {
                                tracing::error!("Rate limiter cleanup pass panicked; continuing");
                            }
                        }
                    }
                }
            }
        })
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.lock().attempts.len()
    }
}
