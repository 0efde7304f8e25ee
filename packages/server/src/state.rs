//! Shared state injected into every HTTP handler via axum's `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use bus::BusAdapter;
use compression_core::PendingRequestRegistry;

/// How long a decompress request waits for a reply before giving up, per the
/// frontend HTTP surface's 100-second cap.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(100);

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PendingRequestRegistry>,
    pub bus: Arc<dyn BusAdapter>,
    pub reply_timeout: Duration,
}

impl AppState {
    pub fn new(bus: Arc<dyn BusAdapter>) -> Self {
        Self { registry: Arc::new(PendingRequestRegistry::new()), bus, reply_timeout: REPLY_TIMEOUT }
    }
}
