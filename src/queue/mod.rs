//! Durable work queue between the crawler and the ingestion worker.
//!
//! One named queue carries opaque UTF-8 payloads (article URLs), with
//! at-least-once delivery: a received message stays invisible for a lease
//! period and becomes claimable again if the consumer never acknowledges it.
//! Consumers pull one message at a time and acknowledge only after the
//! message is fully handled, which is the pipeline's backpressure control:
//! no second link is taken while one is in flight.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryWorkQueue;
pub use postgres::PgWorkQueue;

/// One claimed message: the broker-side handle plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: i64,
    pub body: String,
}

/// Queue operations the pipeline needs. `receive` is a non-blocking claim:
/// `None` means the queue is currently empty and the consumer decides how
/// long to wait before polling again.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Create the queue if it does not exist. Idempotent; both the producer
    /// and the consumer declare before use.
    async fn declare(&self) -> Result<()>;

    /// Append one payload. Fire-and-forget from the producer's point of
    /// view: success means the broker accepted it, nothing more.
    async fn publish(&self, payload: &str) -> Result<()>;

    /// Claim the oldest available message, starting its redelivery lease.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Acknowledge a handled message, removing it permanently.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
}
