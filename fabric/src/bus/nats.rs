//! A [`MessageBus`] backed by NATS. Read topics are backed by JetStream
//! streams with a durable, `DeliverPolicy::All` pull consumer (the
//! ecosystem successor to the original's NATS Streaming
//! `stan.DeliverAllAvailable()`); write topics use plain core NATS
//! request/reply, matching `client.go`'s `NatsConn().RequestWithContext`
//! and `querier/handler.go`'s `NatsConn().Subscribe`.

use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull, stream};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use futures::StreamExt;
use tracing::warn;

use super::{BusConsumer, BusMessage, MessageBus};
use crate::error::{FabricError, Result};

pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsBus {
    /// Dials `url`, retrying with exponential backoff (500ms initial, 5s
    /// cap, 60s total budget) before giving up.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_as(url, None).await
    }

    /// Dials `url` like [`NatsBus::connect`], tagging the connection with
    /// `name` (the original's `NATS_CLUSTER_ID`/`NATS_CLIENT_ID` identified a
    /// NATS Streaming connection; core NATS has no cluster concept, so both
    /// are folded into the connection name for observability).
    pub async fn connect_as(url: &str, name: Option<&str>) -> Result<Self> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..ExponentialBackoff::default()
        };

        let client = retry(backoff, || async {
            let options = match name {
                Some(name) => async_nats::ConnectOptions::new().name(name),
                None => async_nats::ConnectOptions::new(),
            };
            async_nats::connect_with_options(url, options.clone())
                .await
                .map_err(|e| {
                    warn!(error = %e, "retrying bus dial");
                    backoff::Error::transient(e)
                })
        })
        .await
        .map_err(|e| FabricError::BusDial(e.to_string()))?;

        let jetstream = jetstream::new(client.clone());
        Ok(NatsBus { client, jetstream })
    }

    async fn ensure_stream(&self, subject: &str) -> Result<jetstream::stream::Stream> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: subject.to_string(),
                subjects: vec![subject.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| FabricError::BusDial(e.to_string()))
    }
}

struct NatsDurableConsumer {
    messages: jetstream::consumer::pull::Stream,
}

#[async_trait]
impl BusConsumer for NatsDurableConsumer {
    async fn next(&mut self) -> Result<Option<BusMessage>> {
        match self.messages.next().await {
            Some(Ok(message)) => {
                message
                    .ack()
                    .await
                    .map_err(|e| FabricError::BusSubscribe(e.to_string()))?;
                Ok(Some(BusMessage {
                    payload: message.payload.to_vec(),
                    reply_to: None,
                }))
            }
            Some(Err(e)) => Err(FabricError::BusSubscribe(e.to_string())),
            None => Ok(None),
        }
    }
}

struct NatsEphemeralConsumer {
    subscriber: async_nats::Subscriber,
}

#[async_trait]
impl BusConsumer for NatsEphemeralConsumer {
    async fn next(&mut self) -> Result<Option<BusMessage>> {
        Ok(self.subscriber.next().await.map(|message| BusMessage {
            payload: message.payload.to_vec(),
            reply_to: message.reply.map(|s| s.to_string()),
        }))
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_stream(subject).await?;
        self.jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| FabricError::BusPublish(e.to_string()))?
            .await
            .map_err(|e| FabricError::BusPublish(e.to_string()))?;
        Ok(())
    }

    async fn subscribe_durable(
        &self,
        subject: &str,
        durable_name: &str,
    ) -> Result<Box<dyn BusConsumer>> {
        let stream = self.ensure_stream(subject).await?;
        let consumer: jetstream::consumer::PullConsumer = stream
            .get_or_create_consumer(
                durable_name,
                pull::Config {
                    durable_name: Some(durable_name.to_string()),
                    deliver_policy: jetstream::consumer::DeliverPolicy::All,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| FabricError::BusSubscribe(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| FabricError::BusSubscribe(e.to_string()))?;

        Ok(Box::new(NatsDurableConsumer { messages }))
    }

    async fn subscribe(&self, subject: &str) -> Result<Box<dyn BusConsumer>> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| FabricError::BusSubscribe(e.to_string()))?;
        Ok(Box::new(NatsEphemeralConsumer { subscriber }))
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let reply = tokio::time::timeout(
            timeout,
            self.client.request(subject.to_string(), payload.into()),
        )
        .await
        .map_err(|_| FabricError::BusRequestTimeout(subject.to_string()))?
        .map_err(|e| FabricError::BusRequestTimeout(e.to_string()))?;
        Ok(reply.payload.to_vec())
    }

    async fn reply(&self, reply_subject: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(reply_subject.to_string(), payload.into())
            .await
            .map_err(|e| FabricError::BusPublish(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}
