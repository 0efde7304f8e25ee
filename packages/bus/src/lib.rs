//! Broker-agnostic message transport for the audio compression service.
//!
//! [`BusAdapter`] is the contract both `server` and `worker` program against;
//! [`amqp::AmqpBus`] is the real AMQP 0-9-1 implementation, [`memory::MemoryBus`]
//! is an in-process double used by tests.

pub mod amqp;
pub mod memory;

use async_trait::async_trait;
use derive_more::{Display, Error};

pub use amqp::AmqpBus;
pub use memory::MemoryBus;

/// The single topic exchange every queue in this service binds to.
pub const EXCHANGE: &str = "audio_compression";

pub const COMPRESS_ROUTING_KEY: &str = "compress";
pub const DECOMPRESS_ROUTING_KEY: &str = "decompress";
pub const COMPRESSION_RESPONSE_ROUTING_KEY: &str = "compression_response";
pub const DECOMPRESSION_RESPONSE_ROUTING_KEY: &str = "decompression_response";

pub const COMPRESS_REQUEST_QUEUE: &str = "compress_request";
pub const DECOMPRESS_REQUEST_QUEUE: &str = "decompress_request";
pub const DECOMPRESS_RESPONSE_QUEUE: &str = "decompress_response";
/// Declared and bound like every other queue, but nothing ever consumes it —
/// compression has no reply path from the frontend's point of view.
pub const COMPRESSION_RESPONSE_QUEUE: &str = "compression_response";

/// A failure from the bus adapter: broker unreachable, channel closed,
/// declare/bind rejected, or publish refused. Always retryable from the
/// caller's point of view — the adapter itself does not distinguish finer
/// causes.
#[derive(Debug, Display, Error)]
#[display("bus transport error: {message}")]
pub struct BusError {
    message: String,
}

impl BusError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// One message received from a queue, not yet acknowledged.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

/// How a [`Delivery`] should be finalized once its handler has run.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AckOutcome {
    /// Acknowledge: the message is done, successfully or not, and should
    /// never be seen again.
    Ack,
    /// Reject and requeue: the failure is transient: ask the broker to
    /// redeliver, possibly to another consumer.
    RejectRequeue,
    /// Reject without requeue: the failure is permanent; drop the message.
    RejectNoRequeue,
}

/// A single outbound message, as accepted by [`BusAdapter::publish`].
#[derive(Clone, Debug)]
pub struct Outbound<'a> {
    pub routing_key: &'a str,
    pub content_type: &'a str,
    pub correlation_id: Option<&'a str>,
    pub reply_to: Option<&'a str>,
    pub body: Vec<u8>,
}

/// The broker-agnostic publish/consume contract.
///
/// Every queue this service uses is durable, non-auto-delete, non-exclusive,
/// bound to [`EXCHANGE`] under a fixed routing key; every consumer has
/// auto-ack disabled and is non-exclusive, so a [`Delivery`] must be
/// acknowledged or rejected exactly once.
#[async_trait]
pub trait BusAdapter: Send + Sync {
    /// Idempotently declare `queue`, bound to [`EXCHANGE`] under `binding_key`.
    async fn declare(&self, queue: &str, binding_key: &str) -> Result<(), BusError>;

    /// Publish one persistent message under `routing_key` on [`EXCHANGE`].
    async fn publish(&self, message: Outbound<'_>) -> Result<(), BusError>;

    /// Open a consumer on `queue`, returning deliveries paired with a
    /// finalizer closure-like handle via [`BusAdapter::finalize`].
    async fn consume(&self, queue: &str) -> Result<Box<dyn DeliveryStream>, BusError>;

    /// Acknowledge or reject a delivery previously yielded by `consume`.
    async fn finalize(&self, delivery: FinalizeHandle, outcome: AckOutcome) -> Result<(), BusError>;
}

/// An opaque handle identifying a specific in-flight delivery for
/// finalization. Adapters embed whatever they need (a lapin `DeliveryTag`, an
/// in-memory slot index) behind this type.
pub struct FinalizeHandle(pub(crate) FinalizeHandleInner);

pub(crate) enum FinalizeHandleInner {
    Amqp(lapin::acker::Acker),
    Memory(memory::MemorySlot),
}

/// A stream of deliveries from [`BusAdapter::consume`], each paired with the
/// handle needed to finalize it.
#[async_trait]
pub trait DeliveryStream: Send {
    async fn next(&mut self) -> Option<(Delivery, FinalizeHandle)>;
}
