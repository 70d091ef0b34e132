//! An in-process bus backend for unit tests and the `demos` crate,
//! grounded in `messaging/in_memory.rs`'s async-channel-backed producer
//! and consumer pair. Unlike that single-subject channel, this backend
//! keeps one durable log and one broadcast channel per subject so it can
//! stand in for both of [`MessageBus`]'s delivery modes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use uuid::Uuid;

use super::{BusConsumer, BusMessage, MessageBus};
use crate::error::{FabricError, Result};

const BROADCAST_CAPACITY: usize = 1024;

struct DurableLog {
    history: Vec<Vec<u8>>,
    tx: broadcast::Sender<Vec<u8>>,
}

impl DurableLog {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        DurableLog {
            history: Vec::new(),
            tx,
        }
    }
}

#[derive(Default)]
struct Shared {
    durable: Mutex<HashMap<String, DurableLog>>,
    ephemeral: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>>,
    pending_replies: Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>,
}

/// An in-memory, single-process [`MessageBus`].
#[derive(Clone, Default)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        InMemoryBus::default()
    }
}

struct DurableConsumer {
    backlog: std::vec::IntoIter<Vec<u8>>,
    rx: broadcast::Receiver<Vec<u8>>,
}

#[async_trait]
impl BusConsumer for DurableConsumer {
    async fn next(&mut self) -> Result<Option<BusMessage>> {
        if let Some(payload) = self.backlog.next() {
            return Ok(Some(BusMessage {
                payload,
                reply_to: None,
            }));
        }
        match self.rx.recv().await {
            Ok(payload) => Ok(Some(BusMessage {
                payload,
                reply_to: None,
            })),
            Err(broadcast::error::RecvError::Closed) => Ok(None),
            Err(broadcast::error::RecvError::Lagged(_)) => Ok(None),
        }
    }
}

struct EphemeralConsumer {
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

#[async_trait]
impl BusConsumer for EphemeralConsumer {
    async fn next(&mut self) -> Result<Option<BusMessage>> {
        Ok(self.rx.recv().await)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let mut durable = self.shared.durable.lock().await;
        let log = durable
            .entry(subject.to_string())
            .or_insert_with(DurableLog::new);
        log.history.push(payload.clone());
        let _ = log.tx.send(payload);
        Ok(())
    }

    async fn subscribe_durable(
        &self,
        subject: &str,
        _durable_name: &str,
    ) -> Result<Box<dyn BusConsumer>> {
        let mut durable = self.shared.durable.lock().await;
        let log = durable
            .entry(subject.to_string())
            .or_insert_with(DurableLog::new);
        let consumer = DurableConsumer {
            backlog: log.history.clone().into_iter(),
            rx: log.tx.subscribe(),
        };
        Ok(Box::new(consumer))
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn BusConsumer>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut ephemeral = self.shared.ephemeral.lock().await;
        ephemeral
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Ok(Box::new(EphemeralConsumer { rx }))
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let reply_to = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.shared
            .pending_replies
            .lock()
            .await
            .insert(reply_to.clone(), tx);

        let ephemeral = self.shared.ephemeral.lock().await;
        let subscribers = ephemeral.get(subject).cloned().unwrap_or_default();
        drop(ephemeral);
        for tx in &subscribers {
            let _ = tx.send(BusMessage {
                payload: payload.clone(),
                reply_to: Some(reply_to.clone()),
            });
        }

        tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| FabricError::BusRequestTimeout(subject.to_string()))?
            .map_err(|_| FabricError::BusRequestTimeout(subject.to_string()))
    }

    async fn reply(&self, reply_subject: &str, payload: Vec<u8>) -> Result<()> {
        if let Some(tx) = self
            .shared
            .pending_replies
            .lock()
            .await
            .remove(reply_subject)
        {
            let _ = tx.send(payload);
        }
        Ok(())
    }

    /// Always healthy: there is no real connection to lose.
    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn durable_subscriber_sees_backlog_then_live() {
        let bus = InMemoryBus::new();
        bus.publish("t_table", b"one".to_vec()).await.unwrap();
        let mut consumer = bus.subscribe_durable("t_table", "client-1").await.unwrap();
        bus.publish("t_table", b"two".to_vec()).await.unwrap();

        let first = consumer.next().await.unwrap().unwrap();
        assert_eq!(first.payload, b"one");
        let second = consumer.next().await.unwrap().unwrap();
        assert_eq!(second.payload, b"two");
    }

    #[tokio::test]
    async fn request_reply_round_trips() {
        let bus = InMemoryBus::new();
        let mut consumer = bus.subscribe("t_write").await.unwrap();

        let bus2 = bus.clone();
        let handle = tokio::spawn(async move {
            let msg = consumer.next().await.unwrap().unwrap();
            bus2.reply(msg.reply_to.as_ref().unwrap(), b"ok".to_vec())
                .await
                .unwrap();
        });

        let reply = bus
            .request("t_write", b"insert".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"ok");
        handle.await.unwrap();
    }
}
