// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Session
//!
//! This module owns the lifecycle of one bounded consumer run against the
//! broker. A session walks a one-directional path from `Created` through
//! `Connected`, `Channeled` and `Consuming` to `Closed`; each step is only
//! valid from its predecessor and nothing ever walks backwards. Shutdown is
//! a fixed four-step sequence that tolerates partial setup, repeated calls,
//! and broker failures, logging what it cannot do instead of raising.

use crate::{
    channel,
    config::EndpointConfig,
    consumer::{drain, DrainOutcome, StopReason},
    errors::DrainError,
    handler::{Message, MessageHandler},
    policy::TerminationPolicy,
    queue::{declare_queue, QueueHandle, QueueSpec},
    sink::RecordSink,
};
use futures_util::StreamExt;
use lapin::{options::BasicConsumeOptions, types::FieldTable, Channel, Connection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Lifecycle state of a [`ConsumerSession`]. Transitions are one-directional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connected,
    Channeled,
    Consuming,
    Closing,
    Closed,
}

/// Summary of a finished drain run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// What ended the consumption loop
    pub reason: StopReason,
    /// Deliveries handled and acknowledged
    pub processed: u64,
    /// Non-empty records the sink persisted
    pub persisted: u64,
}

/// A bounded-lifetime consumer bound to one queue and one output sink.
pub struct ConsumerSession {
    endpoint: EndpointConfig,
    queue: QueueSpec,
    sink: RecordSink,
    cancel: CancellationToken,
    state: SessionState,
    connection: Option<Connection>,
    channel: Option<Channel>,
    consumer_tag: Option<String>,
    queue_handle: Option<QueueHandle>,
    processed: u64,
}

impl ConsumerSession {
    /// # Parameters
    /// * `endpoint` - Broker endpoint to connect to
    /// * `queue` - Queue to declare and consume from
    /// * `sink` - Destination for persisted records
    ///
    /// # Returns
    /// * `ConsumerSession` - A session in the `Created` state
    pub fn new(endpoint: EndpointConfig, queue: QueueSpec, sink: RecordSink) -> ConsumerSession {
        ConsumerSession {
            endpoint,
            queue,
            sink,
            cancel: CancellationToken::new(),
            state: SessionState::Created,
            connection: None,
            channel: None,
            consumer_tag: None,
            queue_handle: None,
            processed: 0,
        }
    }

    /// A token that routes an external interrupt into the shutdown sequence.
    /// Cancelling it stops the consumption loop at the next suspension point.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Deliveries handled and acknowledged across the session so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Establishes the broker connection. Valid only on a `Created` session.
    pub async fn connect(&mut self) -> Result<(), DrainError> {
        if self.state != SessionState::Created {
            return Err(DrainError::InvalidState("connect"));
        }

        let connection = channel::connect(&self.endpoint).await?;
        self.connection = Some(connection);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Opens the session channel. Valid only on a `Connected` session.
    pub async fn open_channel(&mut self) -> Result<(), DrainError> {
        if self.state != SessionState::Connected {
            return Err(DrainError::InvalidState("open_channel"));
        }

        let channel = match self.connection.as_ref() {
            Some(connection) => channel::open_channel(connection).await?,
            None => return Err(DrainError::InvalidState("open_channel")),
        };
        self.channel = Some(channel);
        self.state = SessionState::Channeled;
        Ok(())
    }

    /// Declares the configured queue on the session channel.
    ///
    /// # Returns
    /// * `Result<QueueHandle, DrainError>` - The broker's view of the queue,
    ///   including its current message count
    pub async fn declare_queue(&mut self) -> Result<QueueHandle, DrainError> {
        if self.state != SessionState::Channeled {
            return Err(DrainError::InvalidState("declare_queue"));
        }

        let handle = match self.channel.as_ref() {
            Some(channel) => declare_queue(channel, &self.queue).await?,
            None => return Err(DrainError::InvalidState("declare_queue")),
        };
        self.queue_handle = Some(handle.clone());
        Ok(handle)
    }

    /// Registers a consumer and drains deliveries until the policy exhausts,
    /// the cancellation token fires, or the broker closes the stream, then
    /// runs the shutdown sequence.
    ///
    /// # Parameters
    /// * `policy` - Termination policy evaluated before each delivery
    /// * `handler` - Per-delivery processing
    ///
    /// # Returns
    /// * `Result<DrainReport, DrainError>` - The run summary; registration
    ///   failures surface before any delivery is processed
    pub async fn consume(
        &mut self,
        policy: TerminationPolicy,
        handler: &dyn MessageHandler,
    ) -> Result<DrainReport, DrainError> {
        if self.state != SessionState::Channeled {
            return Err(DrainError::InvalidState("consume"));
        }
        let queue_name = match self.queue_handle.as_ref() {
            Some(handle) => handle.name.clone(),
            None => return Err(DrainError::InvalidState("consume")),
        };

        // Shutdown runs however the loop ends, registration failure included.
        let result = self.run_loop(queue_name, policy, handler).await;
        self.stop().await;

        let outcome = result?;
        debug!(reason = ?outcome.reason, "consumption loop finished");
        Ok(DrainReport {
            reason: outcome.reason,
            processed: self.processed,
            persisted: self.sink.records(),
        })
    }

    async fn run_loop(
        &mut self,
        queue_name: String,
        policy: TerminationPolicy,
        handler: &dyn MessageHandler,
    ) -> Result<DrainOutcome, DrainError> {
        let channel = match self.channel.as_ref() {
            Some(channel) => channel,
            None => return Err(DrainError::InvalidState("consume")),
        };

        let local_tag = format!("drain.{}", Uuid::new_v4());
        let consumer = match channel
            .basic_consume(
                &queue_name,
                &local_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                return Err(DrainError::RegisterConsumer(queue_name));
            }
        };

        let confirmed_tag = consumer.tag().to_string();
        info!(consumer_tag = %confirmed_tag, queue = %queue_name, "consumer registered");
        self.consumer_tag = Some(confirmed_tag);
        self.state = SessionState::Consuming;

        let deliveries = consumer.map(|delivery| {
            delivery
                .map(Message::from)
                .map_err(|err| DrainError::Receive(err.to_string()))
        });

        let outcome = drain(
            deliveries,
            channel,
            handler,
            policy,
            &mut self.sink,
            &self.cancel,
        )
        .await;

        self.processed += outcome.processed;
        Ok(outcome)
    }

    /// Runs the shutdown sequence: mark the session as closing, cancel the
    /// broker-side consumer, close the connection, close the sink.
    ///
    /// Every step is attempted in order. Failures are logged and never
    /// raised, and steps whose resource was never set up are skipped.
    /// Calling `stop` on a session that is already closing or closed is a
    /// no-op.
    pub async fn stop(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            debug!("session already stopped");
            return;
        }
        self.state = SessionState::Closing;
        info!("stopping consumer session");

        // Basic.Cancel has to settle while the connection is still open.
        // Cancel and close failures are logged where they happen; the later
        // steps still run.
        if let Some(tag) = self.consumer_tag.take() {
            let transport_up = self
                .connection
                .as_ref()
                .map(|connection| connection.status().connected())
                .unwrap_or(false);
            if transport_up {
                if let Some(channel) = self.channel.as_ref() {
                    let _ = channel::cancel_consumer(channel, &tag).await;
                }
            }
        }

        if let Some(connection) = self.connection.take() {
            let _ = channel::close_connection(&connection).await;
        }
        self.channel = None;

        if let Err(err) = self.sink.close().await {
            error!(error = err.to_string(), "failure to close the output sink");
        }

        self.state = SessionState::Closed;
        info!(processed = self.processed, "consumer session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::SinkRecorder;
    use crate::sink::test_support::{memory_sink, SharedBuf};

    fn session() -> (ConsumerSession, SharedBuf) {
        let (sink, buffer) = memory_sink();
        let queue = QueueSpec::new("t1").durable().ttl(60_000);
        (
            ConsumerSession::new(EndpointConfig::default(), queue, sink),
            buffer,
        )
    }

    #[tokio::test]
    async fn stop_is_idempotent_even_without_a_connection() {
        let (mut session, _buffer) = session();

        session.stop().await;
        assert_eq!(session.state(), SessionState::Closed);

        session.stop().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.processed(), 0);
    }

    #[tokio::test]
    async fn stop_closes_the_sink() {
        let (mut session, _buffer) = session();

        session.stop().await;

        assert!(session.sink.is_closed());
    }

    #[tokio::test]
    async fn lifecycle_is_one_directional() {
        let (mut session, _buffer) = session();
        assert_eq!(session.state(), SessionState::Created);

        assert_eq!(
            session.open_channel().await,
            Err(DrainError::InvalidState("open_channel"))
        );
        assert_eq!(
            session.declare_queue().await,
            Err(DrainError::InvalidState("declare_queue"))
        );

        session.stop().await;
        assert_eq!(
            session.connect().await,
            Err(DrainError::InvalidState("connect"))
        );
    }

    #[tokio::test]
    async fn consume_requires_a_declared_queue() {
        let (mut session, _buffer) = session();

        let result = session
            .consume(TerminationPolicy::Unbounded, &SinkRecorder)
            .await;

        assert_eq!(result, Err(DrainError::InvalidState("consume")));
    }
}
