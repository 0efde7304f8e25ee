//! Background task that drains the decompression reply queue into the
//! pending-request registry.
//!
//! Grounded on the source's `DecompressionConsumer`: only
//! `decompress_response` is ever consumed (`compression_response` is
//! declared and bound but nothing reads it — compression is fire-and-forget
//! from the frontend's point of view, a dual-routing asymmetry this rewrite
//! preserves rather than "fixes").

use std::sync::Arc;

use bus::{AckOutcome, BusAdapter, DECOMPRESS_RESPONSE_QUEUE, DeliveryStream};
use compression_core::{PendingRequestRegistry, ReplyBody};

/// Run forever, consuming `decompress_response` and feeding each reply into
/// `registry`. Every delivery is acked regardless of whether it parses or
/// matches a known correlation id: a reply is addressed to at most one
/// waiter, and there is nowhere else to redeliver it to.
pub async fn run(bus: Arc<dyn BusAdapter>, registry: Arc<PendingRequestRegistry>) -> Result<(), bus::BusError> {
    let mut deliveries = bus.consume(DECOMPRESS_RESPONSE_QUEUE).await?;

    while let Some((delivery, handle)) = deliveries.next().await {
        let Some(correlation_id) = delivery.correlation_id.clone() else {
            tracing::warn!("decompress_response delivery missing correlation id, dropping");
            bus.finalize(handle, AckOutcome::Ack).await?;
            continue;
        };

        match serde_json::from_slice::<ReplyBody>(&delivery.body) {
            Ok(reply) => {
                registry.set_reply(&correlation_id, reply.result_type, reply.result_address, reply.error);
            }
            Err(err) => {
                tracing::warn!(%correlation_id, error = %err, "failed to parse decompress_response body, dropping");
            }
        }

        bus.finalize(handle, AckOutcome::Ack).await?;
    }

    Ok(())
}
