//! An in-process [`BusAdapter`] double for tests.
//!
//! Each declared queue gets its own bounded channel; `publish` looks up the
//! queue bound to the given routing key and pushes onto it directly,
//! skipping the broker entirely. Exercises the same coalescing, ack-policy,
//! and pipeline code the AMQP adapter drives.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AckOutcome, BusError, Delivery, DeliveryStream, FinalizeHandle, FinalizeHandleInner, Outbound};

const QUEUE_CAPACITY: usize = 1024;

/// A finalized-or-not delivery slot. `MemoryBus` doesn't actually need to
/// track acks for correctness (there's no broker to requeue to), but it
/// records the outcome so tests can assert on ack/reject behavior.
pub struct MemorySlot {
    pub body: Vec<u8>,
}

struct QueueState {
    binding_key: String,
    sender: mpsc::Sender<Delivery>,
    receiver: Mutex<Option<mpsc::Receiver<Delivery>>>,
}

/// An in-memory bus double. Queues are created by [`BusAdapter::declare`];
/// `publish` fans out to every queue bound under the matching routing key.
#[derive(Default)]
pub struct MemoryBus {
    queues: Mutex<HashMap<String, QueueState>>,
    finalized: Mutex<Vec<(Vec<u8>, AckOutcome)>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `(body, outcome)` pairs recorded by every `finalize` call so far,
    /// in order. Useful for asserting ack/reject behavior in tests.
    pub fn finalized(&self) -> Vec<(Vec<u8>, AckOutcome)> {
        self.finalized.lock().expect("memory bus mutex poisoned").clone()
    }
}

#[async_trait]
impl crate::BusAdapter for MemoryBus {
    async fn declare(&self, queue: &str, binding_key: &str) -> Result<(), BusError> {
        let mut queues = self.queues.lock().expect("memory bus mutex poisoned");
        queues.entry(queue.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
            QueueState {
                binding_key: binding_key.to_string(),
                sender,
                receiver: Mutex::new(Some(receiver)),
            }
        });
        Ok(())
    }

    async fn publish(&self, message: Outbound<'_>) -> Result<(), BusError> {
        let delivery = Delivery {
            body: message.body,
            correlation_id: message.correlation_id.map(str::to_string),
            reply_to: message.reply_to.map(str::to_string),
        };

        let senders: Vec<mpsc::Sender<Delivery>> = {
            let queues = self.queues.lock().expect("memory bus mutex poisoned");
            queues
                .values()
                .filter(|queue| queue.binding_key == message.routing_key)
                .map(|queue| queue.sender.clone())
                .collect()
        };

        if senders.is_empty() {
            return Err(BusError::new(format!(
                "no queue bound to routing key {}",
                message.routing_key
            )));
        }

        for sender in senders {
            sender
                .send(delivery.clone())
                .await
                .map_err(|err| BusError::new(format!("publish to in-memory queue: {err}")))?;
        }

        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, BusError> {
        let receiver = {
            let queues = self.queues.lock().expect("memory bus mutex poisoned");
            let state = queues
                .get(queue)
                .ok_or_else(|| BusError::new(format!("consume from undeclared queue {queue}")))?;
            state
                .receiver
                .lock()
                .expect("memory bus mutex poisoned")
                .take()
                .ok_or_else(|| BusError::new(format!("queue {queue} already has a consumer")))?
        };

        Ok(Box::new(MemoryDeliveryStream { receiver }))
    }

    async fn finalize(&self, delivery: FinalizeHandle, outcome: AckOutcome) -> Result<(), BusError> {
        let FinalizeHandleInner::Memory(slot) = delivery.0 else {
            return Err(BusError::new("finalize called with a handle from a different adapter"));
        };
        self.finalized
            .lock()
            .expect("memory bus mutex poisoned")
            .push((slot.body, outcome));
        Ok(())
    }
}

struct MemoryDeliveryStream {
    receiver: mpsc::Receiver<Delivery>,
}

#[async_trait]
impl DeliveryStream for MemoryDeliveryStream {
    async fn next(&mut self) -> Option<(Delivery, FinalizeHandle)> {
        let delivery = self.receiver.recv().await?;
        let slot = MemorySlot { body: delivery.body.clone() };
        Some((delivery, FinalizeHandle(FinalizeHandleInner::Memory(slot))))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::BusAdapter;

    #[tokio::test]
    async fn publish_then_consume_round_trips() {
        let bus = MemoryBus::new();
        bus.declare("compress_request", "compress").await.unwrap();

        bus.publish(Outbound {
            routing_key: "compress",
            content_type: "application/json",
            correlation_id: Some("abc"),
            reply_to: None,
            body: b"hello".to_vec(),
        })
        .await
        .unwrap();

        let mut stream = bus.consume("compress_request").await.unwrap();
        let (delivery, handle) = stream.next().await.expect("delivery");
        assert_eq!(delivery.body, b"hello");
        assert_eq!(delivery.correlation_id.as_deref(), Some("abc"));

        bus.finalize(handle, AckOutcome::Ack).await.unwrap();
        assert_eq!(bus.finalized(), vec![(b"hello".to_vec(), AckOutcome::Ack)]);
    }

    #[tokio::test]
    async fn publish_without_a_bound_queue_errors() {
        let bus = MemoryBus::new();
        let err = bus
            .publish(Outbound {
                routing_key: "decompress",
                content_type: "application/json",
                correlation_id: None,
                reply_to: None,
                body: b"x".to_vec(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no queue bound"));
    }
}
