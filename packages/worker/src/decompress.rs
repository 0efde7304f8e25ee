//! The decompress consumer: drains `decompress_request`, runs the pipeline's
//! decompress flow behind a [`DecompressionCache`] that coalesces overlapping
//! requests for the same `(bucket, key)` across concurrent deliveries, and
//! publishes the result to `decompression_response`.
//!
//! Grounded on the source's `CompressionUsecase.GetDecompression`
//! (`internal/compression/usecase.go`): same two-step shape — "start the
//! work if nobody else has" then "poll until a result appears" — with the
//! source's 100ms poll interval and 80s poll cap preserved verbatim.

use std::sync::Arc;
use std::time::Duration;

use bus::{AckOutcome, BusAdapter, DECOMPRESSION_RESPONSE_ROUTING_KEY, DECOMPRESS_REQUEST_QUEUE, DeliveryStream, Outbound};
use compression_core::{BlobStore, DecompressionCache, ObjectRef, Pipeline, ReplyBody, RequestBody, RequestKind};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const POLL_CAP: Duration = Duration::from_secs(80);

/// Run forever, consuming `decompress_request`.
pub async fn run_decompress_consumer<S: BlobStore + 'static>(
    bus: Arc<dyn BusAdapter>,
    pipeline: Arc<Pipeline<S>>,
    cache: Arc<DecompressionCache>,
) -> Result<(), bus::BusError> {
    let mut deliveries = bus.consume(DECOMPRESS_REQUEST_QUEUE).await?;

    while let Some((delivery, handle)) = deliveries.next().await {
        let request: RequestBody = match serde_json::from_slice(&delivery.body) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse decompress_request body, dropping");
                bus.finalize(handle, AckOutcome::Ack).await?;
                continue;
            }
        };

        let correlation_id = delivery.correlation_id.clone();
        let bus = bus.clone();
        let pipeline = pipeline.clone();
        let cache = cache.clone();

        // Each delivery gets its own task so overlapping decompress
        // requests for *different* keys never wait on each other; the
        // cache is what coalesces overlapping requests for the *same* key.
        tokio::spawn(async move {
            handle_one(&bus, &pipeline, &cache, request, correlation_id, handle).await;
        });
    }

    Ok(())
}

async fn handle_one<S: BlobStore>(
    bus: &Arc<dyn BusAdapter>,
    pipeline: &Pipeline<S>,
    cache: &DecompressionCache,
    request: RequestBody,
    correlation_id: Option<String>,
    handle: bus::FinalizeHandle,
) {
    let object = ObjectRef::new(request.bucket.clone(), request.key.clone());

    if !cache.has_pending(&request.bucket, &request.key).await {
        cache.begin(&request.bucket, &request.key).await;
        run_pipeline_into_cache(pipeline, cache, &object).await;
    }

    let (path, error) = poll_cache(cache, &request.bucket, &request.key).await;

    let reply = if let Some(message) = error {
        ReplyBody::error(request.bucket.clone(), request.key.clone(), RequestKind::Decompress, message)
    } else if !path.is_empty() {
        ReplyBody::fs_result(request.bucket.clone(), request.key.clone(), RequestKind::Decompress, path)
    } else {
        ReplyBody::error(request.bucket.clone(), request.key.clone(), RequestKind::Decompress, "timed out waiting for decompression")
    };

    let ack = if reply.error.is_none() { AckOutcome::Ack } else { AckOutcome::RejectNoRequeue };

    if let Err(err) = bus
        .publish(Outbound {
            routing_key: DECOMPRESSION_RESPONSE_ROUTING_KEY,
            content_type: "application/json",
            correlation_id: correlation_id.as_deref(),
            reply_to: None,
            body: serde_json::to_vec(&reply).expect("ReplyBody always serializes"),
        })
        .await
    {
        tracing::error!(%object, error = %err, "failed to publish decompress reply");
    }

    if let Err(err) = bus.finalize(handle, ack).await {
        tracing::error!(%object, error = %err, "failed to finalize decompress delivery");
    }
}

async fn run_pipeline_into_cache<S: BlobStore>(pipeline: &Pipeline<S>, cache: &DecompressionCache, object: &ObjectRef) {
    let work_dir = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    match pipeline.decompress(object, &work_dir).await {
        Ok(path) => cache.set_path(&object.bucket, &object.key, path).await,
        Err(err) => cache.set_error(&object.bucket, &object.key, err.to_string()).await,
    }
}

/// Poll the cache every [`POLL_INTERVAL`] for up to [`POLL_CAP`], matching
/// the source's `GetDecompressedObjectResult` loop. Returns `(path, error)`;
/// both empty/`None` means the poll cap elapsed without a result.
async fn poll_cache(cache: &DecompressionCache, bucket: &str, key: &str) -> (String, Option<String>) {
    let deadline = tokio::time::Instant::now() + POLL_CAP;
    loop {
        let (path, error) = cache.lookup(bucket, key).await;
        if !path.is_empty() || error.is_some() {
            return (path, error);
        }
        if tokio::time::Instant::now() >= deadline {
            return (String::new(), None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
