//! Frontend-side pending-request registry: coalesces concurrent callers for
//! the same `(bucket, key, kind)` triple and parks them on a shared reply.
//!
//! Grounded on the source's `DecompressionClient.reqMap`: a correlation-id
//! keyed map guarded by one mutex, scanned linearly on `get_or_create`. The
//! source's 100ms poll loop (`GetDecompressionResponse`) is replaced with a
//! `tokio::sync::Notify` per entry, per the design notes' documented hazard;
//! the resolved result is still stored on the entry (not just signaled), so
//! a reply that lands before the waiter starts polling is never missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::CoreError;
use crate::object::RequestKind;

/// A frontend-side record of one outstanding `(bucket, key, kind)` request.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub correlation_id: String,
    pub bucket: String,
    pub key: String,
    pub kind: RequestKind,
    pub result_type: String,
    pub result_address: String,
    pub error: Option<String>,
}

impl PendingRequest {
    fn new(correlation_id: String, bucket: String, key: String, kind: RequestKind) -> Self {
        Self {
            correlation_id,
            bucket,
            key,
            kind,
            result_type: String::new(),
            result_address: String::new(),
            error: None,
        }
    }

    fn is_resolved(&self) -> bool {
        !self.result_address.is_empty() || self.error.is_some()
    }
}

struct Slot {
    request: Mutex<PendingRequest>,
    notify: Notify,
}

/// Frontend-side registry of in-flight `(bucket, key, kind)` requests, keyed
/// by correlation id.
///
/// Invariant: at most one entry is in flight per `(bucket, key, kind)`
/// triple — [`PendingRequestRegistry::get_or_create`] is the only insertion
/// path, and it always scans for an existing match first.
#[derive(Default)]
pub struct PendingRequestRegistry {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl PendingRequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the entry for `(bucket, key, kind)`. The caller should
    /// publish a bus request only when the returned `existed` is `false`.
    pub fn get_or_create(&self, bucket: &str, key: &str, kind: RequestKind) -> (String, bool) {
        let mut slots = self.slots.lock().expect("registry mutex poisoned");
        for slot in slots.values() {
            let request = slot.request.lock().expect("registry slot mutex poisoned");
            if request.bucket == bucket && request.key == key && request.kind == kind {
                return (request.correlation_id.clone(), true);
            }
        }

        let correlation_id = Uuid::new_v4().to_string();
        slots.insert(
            correlation_id.clone(),
            Arc::new(Slot {
                request: Mutex::new(PendingRequest::new(correlation_id.clone(), bucket.to_string(), key.to_string(), kind)),
                notify: Notify::new(),
            }),
        );
        (correlation_id, false)
    }

    /// Overwrite the entry at `correlation_id` with a reply, if it still
    /// exists, and wake any waiter. A reply for an unknown (already-evicted)
    /// id is silently dropped — this is not an error.
    pub fn set_reply(&self, correlation_id: &str, result_type: String, result_address: String, error: Option<String>) {
        let slots = self.slots.lock().expect("registry mutex poisoned");
        let Some(slot) = slots.get(correlation_id) else { return };
        {
            let mut request = slot.request.lock().expect("registry slot mutex poisoned");
            request.result_type = result_type;
            request.result_address = result_address;
            request.error = error;
        }
        slot.notify.notify_waiters();
    }

    /// Wait up to `timeout` for the entry at `correlation_id` to resolve.
    /// Returns the resolved [`PendingRequest`] on success, [`CoreError::Remote`]
    /// if the reply carried a non-null error, or [`CoreError::Timeout`] once
    /// `timeout` elapses without either.
    pub async fn await_reply(&self, correlation_id: &str, timeout: Duration) -> Result<PendingRequest, CoreError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let slot = {
                let slots = self.slots.lock().expect("registry mutex poisoned");
                slots.get(correlation_id).ok_or_else(|| CoreError::decode("unknown correlation id"))?.clone()
            };

            // `notified()` must be created and enabled before we check the
            // resolved flag, or a reply that lands between the check and the
            // subsequent `.await` would notify no one and we'd block for the
            // full timeout. See `tokio::sync::Notify`'s documented pattern.
            // `notified()` borrows from `slot`, an `Arc` we own, rather than
            // from the mutex guard, so the future can outlive the lock.
            let notified = slot.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let request = slot.request.lock().expect("registry slot mutex poisoned");
                if request.is_resolved() {
                    if let Some(message) = request.error.clone() {
                        return Err(CoreError::Remote { message });
                    }
                    return Ok(request.clone());
                }
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep_until(deadline) => return Err(CoreError::Timeout),
            }
        }
    }

    /// Drop the entry at `correlation_id`. Safe even if another caller is
    /// still awaiting the same id — a subsequent `get_or_create` for the
    /// same triple simply starts a fresh request.
    pub fn remove(&self, correlation_id: &str) {
        self.slots.lock().expect("registry mutex poisoned").remove(correlation_id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn overlapping_calls_for_the_same_triple_coalesce() {
        let registry = PendingRequestRegistry::new();
        let (first_id, first_existed) = registry.get_or_create("audio", "bundle.tar", RequestKind::Decompress);
        let (second_id, second_existed) = registry.get_or_create("audio", "bundle.tar", RequestKind::Decompress);

        assert!(!first_existed);
        assert!(second_existed);
        assert_eq!(first_id, second_id);
    }

    #[test]
    fn different_kinds_for_the_same_object_do_not_coalesce() {
        let registry = PendingRequestRegistry::new();
        let (compress_id, _) = registry.get_or_create("audio", "bundle.tar", RequestKind::Compress);
        let (decompress_id, existed) = registry.get_or_create("audio", "bundle.tar", RequestKind::Decompress);

        assert!(!existed);
        assert_ne!(compress_id, decompress_id);
    }

    #[tokio::test]
    async fn await_reply_resolves_once_set_reply_runs() {
        let registry = Arc::new(PendingRequestRegistry::new());
        let (correlation_id, _) = registry.get_or_create("audio", "bundle.tar", RequestKind::Decompress);

        let waiter = tokio::spawn({
            let registry = Arc::clone(&registry);
            let correlation_id = correlation_id.clone();
            async move { registry.await_reply(&correlation_id, Duration::from_secs(5)).await }
        });

        tokio::task::yield_now().await;
        registry.set_reply(&correlation_id, "FS".to_string(), "/tmp/decompressed_audio_1.tar".to_string(), None);

        let reply = waiter.await.expect("join").expect("reply");
        assert_eq!(reply.result_address, "/tmp/decompressed_audio_1.tar");
    }

    #[tokio::test]
    async fn await_reply_surfaces_remote_error_verbatim() {
        let registry = PendingRequestRegistry::new();
        let (correlation_id, _) = registry.get_or_create("audio", "missing.tar", RequestKind::Decompress);

        registry.set_reply(&correlation_id, String::new(), String::new(), Some("object not found".to_string()));

        let err = registry.await_reply(&correlation_id, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CoreError::Remote { message } if message == "object not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn await_reply_times_out_when_no_reply_arrives() {
        let registry = PendingRequestRegistry::new();
        let (correlation_id, _) = registry.get_or_create("audio", "bundle.tar", RequestKind::Decompress);

        let err = registry.await_reply(&correlation_id, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout));
    }

    #[test]
    fn late_reply_to_an_evicted_id_is_silently_dropped() {
        let registry = PendingRequestRegistry::new();
        let (correlation_id, _) = registry.get_or_create("audio", "bundle.tar", RequestKind::Decompress);
        registry.remove(&correlation_id);

        // Must not panic.
        registry.set_reply(&correlation_id, "FS".to_string(), "/tmp/x.tar".to_string(), None);
    }
}
