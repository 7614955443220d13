// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Declaration
//!
//! This module provides the queue definition used by a drain session and
//! the declaration call that materializes it on the broker. Declaring an
//! existing queue with identical parameters is a broker-side no-op and
//! still yields a fresh handle; declaring it with different parameters is
//! classified as a conflict so callers can distinguish operator error from
//! transport failure.

use crate::errors::DrainError;
use lapin::{
    options::QueueDeclareOptions,
    protocol::{AMQPErrorKind, AMQPSoftError},
    types::{AMQPValue, FieldTable, LongInt, ShortString},
    Channel,
};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";

/// Definition of the queue a session drains.
///
/// This struct implements the builder pattern to create and configure the
/// queue definition. The drain profile used in production is a durable
/// queue with a per-message TTL.
#[derive(Debug, Clone, Default)]
pub struct QueueSpec {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) ttl: Option<i32>,
}

impl QueueSpec {
    /// Creates a new queue spec with the given name.
    ///
    /// By default the queue is transient and carries no TTL argument.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    ///
    /// # Returns
    /// A new queue spec with default settings
    pub fn new(name: &str) -> QueueSpec {
        QueueSpec {
            name: name.to_owned(),
            durable: false,
            ttl: None,
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue.
    ///
    /// Messages older than the TTL are dropped by the broker.
    ///
    /// # Parameters
    /// * `ttl` - TTL in milliseconds
    ///
    /// # Returns
    /// Self for method chaining
    pub fn ttl(mut self, ttl: i32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// The queue name this spec declares.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handle returned by a successful declaration: the resolved queue name and
/// the broker-reported message count at declaration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub message_count: u32,
}

/// Declares the queue described by `spec` on the given channel.
///
/// # Parameters
/// * `channel` - An open channel to the broker
/// * `spec` - The queue definition to declare
///
/// # Returns
/// * `Result<QueueHandle, DrainError>` - The declaration handle, a
///   `QueueConflict` when the queue exists with different parameters, or a
///   `DeclareQueue` error otherwise
pub async fn declare_queue(channel: &Channel, spec: &QueueSpec) -> Result<QueueHandle, DrainError> {
    debug!(queue = %spec.name, "declaring queue");

    let mut queue_args = BTreeMap::new();
    if let Some(ttl) = spec.ttl {
        queue_args.insert(
            ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
            AMQPValue::LongInt(LongInt::from(ttl)),
        );
    }

    match channel
        .queue_declare(
            &spec.name,
            QueueDeclareOptions {
                passive: false,
                durable: spec.durable,
                exclusive: false,
                auto_delete: false,
                nowait: false,
            },
            FieldTable::from(queue_args),
        )
        .await
    {
        Ok(queue) => {
            debug!(
                queue = %spec.name,
                messages = queue.message_count(),
                "queue declared"
            );
            Ok(QueueHandle {
                name: queue.name().to_string(),
                message_count: queue.message_count(),
            })
        }
        Err(err) => {
            error!(
                error = err.to_string(),
                queue = %spec.name,
                "failure to declare the queue"
            );
            Err(classify_declare_error(&spec.name, &err))
        }
    }
}

fn classify_declare_error(name: &str, err: &lapin::Error) -> DrainError {
    if let lapin::Error::ProtocolError(amqp_err) = err {
        if let AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED) = amqp_err.kind() {
            return DrainError::QueueConflict(name.to_owned());
        }
    }
    DrainError::DeclareQueue(name.to_owned())
}
