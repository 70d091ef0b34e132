//! The message bus abstraction MicroDB's roles run on. Grounded in
//! `messaging/mod.rs`'s `MessageConsumer`/`MessageProducer` split, adapted
//! for MicroDB's two distinct subject kinds:
//!
//! - a table's **read topic**, which needs durable, ordered, replay-from-
//!   start delivery (the original's `stan.DeliverAllAvailable()`), and
//! - a table's **write topic**, which needs plain request/reply (the
//!   original subscribes it with core NATS, not NATS Streaming).

pub mod in_memory;
pub mod nats;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// A message delivered off the bus. `reply_to`, when present, is the
/// subject a handler should publish its response to.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub payload: Vec<u8>,
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait BusConsumer: Send {
    /// Returns the next message, or `None` if the subscription has ended.
    async fn next(&mut self) -> Result<Option<BusMessage>>;
}

/// The operations a MicroDB role needs from the bus. A single connection
/// implements both the durable-replay and request/reply halves.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a message that durable subscribers will see, in order,
    /// even if they connect after it was sent.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Subscribes to `subject` with `stan.DeliverAllAvailable()` semantics:
    /// every message ever published to it, starting from the first, then
    /// anything published afterward.
    async fn subscribe_durable(
        &self,
        subject: &str,
        durable_name: &str,
    ) -> Result<Box<dyn BusConsumer>>;

    /// Subscribes to `subject` with plain, non-durable delivery: only
    /// messages published while subscribed are seen.
    async fn subscribe(&self, subject: &str) -> Result<Box<dyn BusConsumer>>;

    /// Publishes to `subject` and waits up to `timeout` for a reply.
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>>;

    /// Publishes `payload` to a `reply_to` subject obtained from a
    /// [`BusMessage`] delivered by [`MessageBus::subscribe`].
    async fn reply(&self, reply_subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Reports whether the underlying bus connection is currently healthy
    /// (NATS `CONNECTED` state), backing the driver surface's `Ping`.
    fn is_connected(&self) -> bool;
}
