//! Worker-side decompression cache: deduplicates overlapping decompression
//! requests within a TTL window and bounds disk use via a background reaper.
//!
//! Grounded on the source's `CompressionRepository` decompression-object
//! list (`internal/compression/repository.go`): a `Vec`-backed table guarded
//! by one mutex, with `last_access` stamped once at `begin` and never
//! refreshed — TTL behaves as a hard creation-time lifetime, not an LRU,
//! preserved deliberately (see design notes).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default time an entry survives after creation before the reaper unlinks
/// its file, per the source's `time.Minute`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// How often the reaper wakes to sweep for expired entries.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
struct Entry {
    bucket: String,
    key: String,
    file_path: Option<String>,
    error: Option<String>,
    last_access: Instant,
    ttl: Duration,
}

/// Worker-side cache of recently produced decompression temp files, keyed by
/// `(bucket, key)`. At most one entry exists per key at a time.
#[derive(Default)]
pub struct DecompressionCache {
    entries: Mutex<Vec<Entry>>,
}

impl DecompressionCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// True if a decompression for `(bucket, key)` has already started (and
    /// not yet been reaped).
    pub async fn has_pending(&self, bucket: &str, key: &str) -> bool {
        self.entries.lock().await.iter().any(|entry| entry.bucket == bucket && entry.key == key)
    }

    /// Insert a fresh, unresolved entry for `(bucket, key)` with the default
    /// TTL, stamped `last_access = now`.
    pub async fn begin(&self, bucket: &str, key: &str) {
        self.entries.lock().await.push(Entry {
            bucket: bucket.to_string(),
            key: key.to_string(),
            file_path: None,
            error: None,
            last_access: Instant::now(),
            ttl: DEFAULT_TTL,
        });
    }

    /// Record the temp file path a pipeline run produced for `(bucket, key)`.
    pub async fn set_path(&self, bucket: &str, key: &str, path: String) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|entry| entry.bucket == bucket && entry.key == key) {
            entry.file_path = Some(path);
        }
    }

    /// Record the error a pipeline run failed with for `(bucket, key)`.
    pub async fn set_error(&self, bucket: &str, key: &str, message: String) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|entry| entry.bucket == bucket && entry.key == key) {
            entry.error = Some(message);
        }
    }

    /// The first matching entry's file path and error. Absence of both
    /// (empty string, `None`) means the pipeline hasn't finished yet; the
    /// caller is expected to poll.
    pub async fn lookup(&self, bucket: &str, key: &str) -> (String, Option<String>) {
        let entries = self.entries.lock().await;
        match entries.iter().find(|entry| entry.bucket == bucket && entry.key == key) {
            Some(entry) => (entry.file_path.clone().unwrap_or_default(), entry.error.clone()),
            None => (String::new(), None),
        }
    }

    /// Spawn the background reaper as a long-lived task bound to this
    /// cache's lifetime. The caller should `abort()` the returned handle on
    /// shutdown.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAP_INTERVAL).await;
                cache.reap_one_tick().await;
            }
        })
    }

    /// One sweep of the reaper: removes and unlinks at most one expired
    /// entry. The unlink runs while still holding the entries lock, matching
    /// the source's behavior (acceptable since unlink never blocks on
    /// network); the single-removal-per-tick shape mirrors the source's
    /// break-after-first-removal loop and is preserved deliberately rather
    /// than optimized into a filter-and-swap (see design notes).
    async fn reap_one_tick(&self) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let Some(index) = entries.iter().position(|entry| now.saturating_duration_since(entry.last_access) > entry.ttl) else {
            return;
        };

        let entry = entries.remove(index);
        if let Some(path) = entry.file_path {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                tracing::warn!(bucket = %entry.bucket, key = %entry.key, path = %path, error = %err, "failed to unlink expired decompression temp file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_then_set_path_is_visible_through_lookup() {
        let cache = DecompressionCache::new();
        assert!(!cache.has_pending("audio", "bundle.tar").await);

        cache.begin("audio", "bundle.tar").await;
        assert!(cache.has_pending("audio", "bundle.tar").await);

        let (path, err) = cache.lookup("audio", "bundle.tar").await;
        assert_eq!(path, "");
        assert!(err.is_none());

        cache.set_path("audio", "bundle.tar", "/tmp/decompressed_audio_1.tar".to_string()).await;
        let (path, err) = cache.lookup("audio", "bundle.tar").await;
        assert_eq!(path, "/tmp/decompressed_audio_1.tar");
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn set_error_is_visible_through_lookup() {
        let cache = DecompressionCache::new();
        cache.begin("audio", "missing.tar").await;
        cache.set_error("audio", "missing.tar", "object not found".to_string()).await;

        let (path, err) = cache.lookup("audio", "missing.tar").await;
        assert_eq!(path, "");
        assert_eq!(err.as_deref(), Some("object not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_evicts_entries_once_past_ttl_and_unlinks_the_file() {
        let dir = tempfile_dir();
        let path = dir.join("decompressed_audio_test.tar");
        tokio::fs::write(&path, b"hello").await.expect("seed temp file");

        let cache = DecompressionCache::new();
        cache.begin("audio", "bundle.tar").await;
        cache.set_path("audio", "bundle.tar", path.to_string_lossy().into_owned()).await;

        // Still within TTL: nothing is reaped.
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.reap_one_tick().await;
        assert!(cache.has_pending("audio", "bundle.tar").await);
        assert!(path.exists());

        // Past TTL: the entry and its file are gone.
        tokio::time::advance(Duration::from_secs(31)).await;
        cache.reap_one_tick().await;
        assert!(!cache.has_pending("audio", "bundle.tar").await);
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn reaper_removes_at_most_one_entry_per_tick() {
        let cache = DecompressionCache::new();
        cache.begin("audio", "a.tar").await;
        cache.begin("audio", "b.tar").await;

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.reap_one_tick().await;

        let remaining = cache.entries.lock().await.len();
        assert_eq!(remaining, 1, "only one expired entry should be reaped per tick");
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("decompression-cache-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create test temp dir");
        dir
    }
}
