// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Queue Drain
//!
//! This module provides the error types for the consumer runtime. The
//! `DrainError` enum represents all failure scenarios that can occur during
//! connection, channel, queue declaration, consumption, and shutdown
//! operations. Failure sites log the underlying broker error before mapping
//! into a variant, so variants stay payload-light and comparable in tests.

use thiserror::Error;

/// Represents errors that can occur while draining a queue.
///
/// Connection and declaration variants are fatal to session startup.
/// Delivery-level variants (`Persist`, `Ack`, `Receive`) are logged and
/// skipped by the consumption loop. Shutdown variants (`CancelConsumer`,
/// `CloseConnection`) are logged by the shutdown sequence and never raised
/// out of it.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DrainError {
    /// Error establishing a connection to the broker
    #[error("failure to connect")]
    Connection,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    Channel,

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueue(String),

    /// The queue already exists with different durability or arguments
    #[error("queue `{0}` already exists with conflicting arguments")]
    QueueConflict(String),

    /// Error registering a consumer on the given queue
    #[error("failure to register a consumer on queue `{0}`")]
    RegisterConsumer(String),

    /// Error receiving a delivery from the consumer stream
    #[error("failure to receive a delivery: {0}")]
    Receive(String),

    /// Error persisting the delivery with the given tag
    #[error("failure to persist delivery `{0}`")]
    Persist(u64),

    /// Error acknowledging the delivery with the given tag
    #[error("failure to ack delivery `{0}`")]
    Ack(u64),

    /// Error cancelling the consumer registration during shutdown
    #[error("failure to cancel consumer `{0}`")]
    CancelConsumer(String),

    /// Error closing the connection during shutdown
    #[error("failure to close the connection")]
    CloseConnection,

    /// The named operation is not permitted in the current session state
    #[error("`{0}` is not permitted in the current session state")]
    InvalidState(&'static str),
}
