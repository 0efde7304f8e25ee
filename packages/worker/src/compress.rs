//! The compress consumer: drains `compress_request` and runs the pipeline's
//! compress flow, grounded on the source's `ConsumeCompression`
//! (`internal/controller/rmq/amqp_worker.go`) ack/reject policy — success or
//! non-retryable failure acks, a retryable failure rejects and requeues.

use std::sync::Arc;

use bus::{AckOutcome, BusAdapter, COMPRESS_REQUEST_QUEUE, DeliveryStream};
use compression_core::{BlobStore, ObjectRef, Pipeline, RequestBody};

/// Run forever, consuming `compress_request` and invoking `pipeline.compress`
/// for each delivery.
pub async fn run_compress_consumer<S: BlobStore>(bus: Arc<dyn BusAdapter>, pipeline: Arc<Pipeline<S>>) -> Result<(), bus::BusError> {
    let mut deliveries = bus.consume(COMPRESS_REQUEST_QUEUE).await?;

    while let Some((delivery, handle)) = deliveries.next().await {
        let request: RequestBody = match serde_json::from_slice(&delivery.body) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "failed to parse compress_request body, dropping");
                bus.finalize(handle, AckOutcome::Ack).await?;
                continue;
            }
        };

        let object = ObjectRef::new(request.bucket.clone(), request.key.clone());
        let outcome = pipeline.compress(&object).await;

        let ack = match outcome {
            Ok(()) => {
                tracing::info!(%object, "compressed");
                AckOutcome::Ack
            }
            Err((err, should_retry)) => {
                tracing::error!(%object, error = %err, should_retry, "compress failed");
                if should_retry { AckOutcome::RejectRequeue } else { AckOutcome::Ack }
            }
        };

        bus.finalize(handle, ack).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bus::{COMPRESS_ROUTING_KEY, MemoryBus, Outbound};
    use compression_core::{FileEntry, InMemoryBlobStore, RequestKind, TarArchiver};

    use super::*;

    #[tokio::test]
    async fn a_valid_request_compresses_and_acks() {
        let bus = Arc::new(MemoryBus::new());
        bus.declare(COMPRESS_REQUEST_QUEUE, COMPRESS_ROUTING_KEY).await.expect("declare");

        let store = InMemoryBlobStore::new();
        let object = ObjectRef::new("audio", "bundle.tar");
        let tar = TarArchiver::new().compress(&[FileEntry::new("a.wav", vec![1u8; 8])]).await.expect("build sample tar");
        store.seed(&object, tar);
        let pipeline = Arc::new(Pipeline::new(store));

        let request = RequestBody { bucket: "audio".into(), key: "bundle.tar".into(), kind: RequestKind::Compress };
        bus.publish(Outbound {
            routing_key: COMPRESS_ROUTING_KEY,
            content_type: "application/json",
            correlation_id: None,
            reply_to: None,
            body: serde_json::to_vec(&request).unwrap(),
        })
        .await
        .expect("publish");

        let consumer = tokio::spawn(run_compress_consumer(bus.clone() as Arc<dyn BusAdapter>, pipeline.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(pipeline.store().contains(&object.compressed()));
        assert_eq!(bus.finalized().last().map(|(_, outcome)| *outcome), Some(AckOutcome::Ack));

        consumer.abort();
    }

    #[tokio::test]
    async fn a_missing_object_is_acked_without_requeue() {
        let bus = Arc::new(MemoryBus::new());
        bus.declare(COMPRESS_REQUEST_QUEUE, COMPRESS_ROUTING_KEY).await.expect("declare");

        let store = InMemoryBlobStore::new();
        let pipeline = Arc::new(Pipeline::new(store));

        let request = RequestBody { bucket: "audio".into(), key: "missing.tar".into(), kind: RequestKind::Compress };
        bus.publish(Outbound {
            routing_key: COMPRESS_ROUTING_KEY,
            content_type: "application/json",
            correlation_id: None,
            reply_to: None,
            body: serde_json::to_vec(&request).unwrap(),
        })
        .await
        .expect("publish");

        let consumer = tokio::spawn(run_compress_consumer(bus.clone() as Arc<dyn BusAdapter>, pipeline));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(bus.finalized().last().map(|(_, outcome)| *outcome), Some(AckOutcome::Ack));

        consumer.abort();
    }
}
