//! Configuration for the sync engine.

use crate::error::SyncResult;
use pagesync_storage::{SpaceIndex, StorageConfig, Timestamp};
use std::time::Duration;
use tracing::debug;

/// Default interval between full reconciliation passes.
pub const DEFAULT_FULL_SYNC_INTERVAL: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Where and how the mirror is stored.
    pub storage: StorageConfig,
    /// Base URL of the remote store, for display only.
    pub base_url: String,
    /// A full pass is due once this much time passed since the last one.
    pub full_sync_interval: Duration,
    /// Suggested delay between incremental passes. The engine never
    /// schedules passes itself.
    pub incremental_interval_hint: Duration,
    /// Number of pages fetched concurrently.
    pub fetch_workers: usize,
    /// The index is saved after this many processed pages.
    pub commit_batch_size: usize,
    /// Upper bound on pages processed by one incremental pass.
    pub max_pages_per_pass: Option<usize>,
    /// Retry configuration for remote calls.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration for a mirror of `base_url`.
    pub fn new(storage: StorageConfig, base_url: impl Into<String>) -> Self {
        Self {
            storage,
            base_url: base_url.into(),
            full_sync_interval: DEFAULT_FULL_SYNC_INTERVAL,
            incremental_interval_hint: Duration::from_secs(5 * 60),
            fetch_workers: 4,
            commit_batch_size: 25,
            max_pages_per_pass: None,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the full sync interval.
    pub fn with_full_sync_interval(mut self, interval: Duration) -> Self {
        self.full_sync_interval = interval;
        self
    }

    /// Sets the incremental interval hint.
    pub fn with_incremental_interval_hint(mut self, interval: Duration) -> Self {
        self.incremental_interval_hint = interval;
        self
    }

    /// Sets the number of concurrent fetches.
    pub fn with_fetch_workers(mut self, workers: usize) -> Self {
        self.fetch_workers = workers.max(1);
        self
    }

    /// Sets the commit batch size.
    pub fn with_commit_batch_size(mut self, size: usize) -> Self {
        self.commit_batch_size = size.max(1);
        self
    }

    /// Limits how many pages one incremental pass processes.
    pub fn with_max_pages_per_pass(mut self, max: usize) -> Self {
        self.max_pages_per_pass = Some(max);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Decides which kind of pass a space needs at `now`.
    pub fn choose_mode(&self, space: &SpaceIndex, force_full: bool, now: Timestamp) -> SyncMode {
        if force_full {
            return SyncMode::Full;
        }
        let (Some(last_full), Some(_)) = (space.last_full_sync_at, space.last_incremental_sync_at)
        else {
            return SyncMode::Full;
        };
        if now.saturating_since(last_full) >= self.full_sync_interval {
            SyncMode::AutoFull
        } else {
            SyncMode::Incremental
        }
    }

    /// Returns true if a full pass is due at `now`.
    pub fn full_sync_due(&self, space: &SpaceIndex, now: Timestamp) -> bool {
        self.choose_mode(space, false, now).is_full()
    }

    /// When the next incremental pass is suggested, `None` before the first sync.
    pub fn next_incremental_due(&self, space: &SpaceIndex) -> Option<Timestamp> {
        space
            .last_incremental_sync_at
            .map(|at| at.saturating_add(self.incremental_interval_hint))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(StorageConfig::default(), "")
    }
}

/// The kind of pass chosen for a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Only pages changed since the watermark.
    Incremental,
    /// Full reconciliation, requested or first sync.
    Full,
    /// Full reconciliation because the interval elapsed.
    AutoFull,
}

impl SyncMode {
    /// Returns true for both full variants.
    pub fn is_full(self) -> bool {
        matches!(self, SyncMode::Full | SyncMode::AutoFull)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% extra
            let jitter = delay_secs * 0.25 * jitter_fraction();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Runs `op`, retrying retryable errors with backoff.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> SyncResult<T>) -> SyncResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    debug!(what, attempt, ?delay, error = %e, "retrying");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::cell::Cell;

    const DAY: u64 = 24 * 60 * 60 * 1000;

    fn synced(full_at: u64, incremental_at: u64) -> SpaceIndex {
        let mut index = SpaceIndex::new("DEV");
        index.last_full_sync_at = Some(Timestamp(full_at));
        index.last_incremental_sync_at = Some(Timestamp(incremental_at));
        index
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new(StorageConfig::new("/m"), "https://wiki.example.com")
            .with_fetch_workers(0)
            .with_commit_batch_size(10)
            .with_max_pages_per_pass(500)
            .with_full_sync_interval(Duration::from_secs(60));

        assert_eq!(config.base_url, "https://wiki.example.com");
        assert_eq!(config.fetch_workers, 1);
        assert_eq!(config.commit_batch_size, 10);
        assert_eq!(config.max_pages_per_pass, Some(500));
        assert_eq!(config.full_sync_interval, Duration::from_secs(60));
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.full_sync_interval, Duration::from_secs(3 * 86_400));
        assert_eq!(config.incremental_interval_hint, Duration::from_secs(300));
        assert_eq!(config.fetch_workers, 4);
        assert_eq!(config.commit_batch_size, 25);
        assert!(config.max_pages_per_pass.is_none());
    }

    #[test]
    fn first_sync_is_full() {
        let config = SyncConfig::default();
        let index = SpaceIndex::new("DEV");
        assert_eq!(config.choose_mode(&index, false, Timestamp(5)), SyncMode::Full);
    }

    #[test]
    fn forced_sync_is_full() {
        let config = SyncConfig::default();
        let index = synced(DAY, DAY);
        assert_eq!(config.choose_mode(&index, true, Timestamp(DAY + 1)), SyncMode::Full);
    }

    #[test]
    fn full_sync_after_interval() {
        let config = SyncConfig::default();
        let index = synced(DAY, 2 * DAY);

        assert_eq!(
            config.choose_mode(&index, false, Timestamp(3 * DAY)),
            SyncMode::Incremental
        );
        assert_eq!(
            config.choose_mode(&index, false, Timestamp(4 * DAY)),
            SyncMode::AutoFull
        );
        assert!(config.full_sync_due(&index, Timestamp(5 * DAY)));
    }

    #[test]
    fn missing_watermark_forces_full() {
        let config = SyncConfig::default();
        let mut index = synced(DAY, DAY);
        index.last_incremental_sync_at = None;
        assert!(config.choose_mode(&index, false, Timestamp(DAY)).is_full());
    }

    #[test]
    fn next_incremental_due_uses_hint() {
        let config = SyncConfig::default().with_incremental_interval_hint(Duration::from_secs(1));
        assert_eq!(config.next_incremental_due(&SpaceIndex::new("DEV")), None);
        assert_eq!(
            config.next_incremental_due(&synced(0, 1_000)),
            Some(Timestamp(2_000))
        );
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .without_jitter();

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn run_retries_only_retryable_errors() {
        let config = RetryConfig::new(3).with_initial_delay(Duration::ZERO);

        let calls = Cell::new(0);
        let result = config.run("fetch", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(SyncError::transport_retryable("reset"))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);

        let calls = Cell::new(0);
        let result: SyncResult<()> = config.run("fetch", || {
            calls.set(calls.get() + 1);
            Err(SyncError::RemoteNotFound("1".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn run_gives_up_after_max_attempts() {
        let config = RetryConfig::new(2).with_initial_delay(Duration::ZERO);
        let calls = Cell::new(0);
        let result: SyncResult<()> = config.run("list", || {
            calls.set(calls.get() + 1);
            Err(SyncError::transport_retryable("timeout"))
        });
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.get(), 2);
    }
}
