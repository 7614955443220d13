// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Handlers
//!
//! This module defines the per-delivery processing seam and the three
//! concrete handlers the binary can pair with a termination policy. A
//! handler either succeeds (the loop then acknowledges the delivery) or
//! fails (the delivery is left unacknowledged and the loop moves on).

use crate::{errors::DrainError, policy::Remaining, sink::RecordSink};
use async_trait::async_trait;
use lapin::message::Delivery;
use std::str;
use tracing::{debug, error};

/// One delivered message, decoupled from the transport types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

impl From<Delivery> for Message {
    fn from(delivery: Delivery) -> Message {
        Message {
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            body: delivery.data,
        }
    }
}

/// Loop-side snapshot passed to the handler: the 1-based sequence number of
/// the delivery and the policy headroom observed before processing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub seq: u64,
    pub remaining: Remaining,
}

/// Processes one delivery.
///
/// Implementations must not acknowledge; acknowledgment belongs to the
/// consumption loop and happens only after `handle` returns `Ok`.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        sink: &mut RecordSink,
        message: &Message,
        progress: &Progress,
    ) -> Result<(), DrainError>;
}

/// Persists each payload as one record in the output sink.
///
/// Payloads must be valid UTF-8; anything else is a processing failure.
pub struct SinkRecorder;

#[async_trait]
impl MessageHandler for SinkRecorder {
    async fn handle(
        &self,
        sink: &mut RecordSink,
        message: &Message,
        progress: &Progress,
    ) -> Result<(), DrainError> {
        let text = match str::from_utf8(&message.body) {
            Ok(text) => text,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    tag = message.delivery_tag,
                    "payload is not valid utf-8"
                );
                return Err(DrainError::Persist(message.delivery_tag));
            }
        };

        if let Err(err) = sink.write_record(text).await {
            error!(
                error = err.to_string(),
                tag = message.delivery_tag,
                "failure to write the record"
            );
            return Err(DrainError::Persist(message.delivery_tag));
        }

        debug!(
            num = progress.seq,
            bytes = message.body.len(),
            remaining = %progress.remaining,
            "record persisted"
        );
        Ok(())
    }
}

/// Echoes each payload to stdout together with the remaining budget.
pub struct CountEcho;

#[async_trait]
impl MessageHandler for CountEcho {
    async fn handle(
        &self,
        _sink: &mut RecordSink,
        message: &Message,
        progress: &Progress,
    ) -> Result<(), DrainError> {
        let text = match str::from_utf8(&message.body) {
            Ok(text) => text,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    tag = message.delivery_tag,
                    "payload is not valid utf-8"
                );
                return Err(DrainError::Persist(message.delivery_tag));
            }
        };

        println!(" [x] Received: [{}]", message.body.len());
        if let Remaining::Count(count) = progress.remaining {
            println!("Messages remaining in queue: {count}");
        }
        println!("{text}");
        Ok(())
    }
}

/// Echoes only the payload size to stdout; payloads stay opaque bytes.
pub struct SizeEcho;

#[async_trait]
impl MessageHandler for SizeEcho {
    async fn handle(
        &self,
        _sink: &mut RecordSink,
        message: &Message,
        progress: &Progress,
    ) -> Result<(), DrainError> {
        if let Remaining::Time(window) = progress.remaining {
            println!(
                "Seconds remaining before closing: {:.3}",
                window.as_secs_f64()
            );
        }
        println!(" [x] Received: [{}]", message.body.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::memory_sink;
    use std::time::Duration;

    fn message(tag: u64, body: &[u8]) -> Message {
        Message {
            delivery_tag: tag,
            body: body.to_vec(),
            redelivered: false,
        }
    }

    fn progress(seq: u64, remaining: Remaining) -> Progress {
        Progress { seq, remaining }
    }

    #[tokio::test]
    async fn sink_recorder_persists_utf8_payloads() {
        let (mut sink, buffer) = memory_sink();
        SinkRecorder
            .handle(
                &mut sink,
                &message(1, b"abc"),
                &progress(1, Remaining::Time(Duration::from_secs(29))),
            )
            .await
            .unwrap();
        sink.close().await.unwrap();

        assert_eq!(buffer.contents(), "abc\n");
        assert_eq!(sink.records(), 1);
    }

    #[tokio::test]
    async fn sink_recorder_rejects_invalid_utf8() {
        let (mut sink, buffer) = memory_sink();
        let err = SinkRecorder
            .handle(
                &mut sink,
                &message(7, &[0xff, 0xfe]),
                &progress(1, Remaining::Unbounded),
            )
            .await
            .unwrap_err();
        sink.close().await.unwrap();

        assert_eq!(err, DrainError::Persist(7));
        assert_eq!(buffer.contents(), "");
        assert_eq!(sink.records(), 0);
    }

    #[tokio::test]
    async fn count_echo_requires_utf8_but_leaves_the_sink_alone() {
        let (mut sink, buffer) = memory_sink();
        CountEcho
            .handle(
                &mut sink,
                &message(1, b"2.17"),
                &progress(1, Remaining::Count(4)),
            )
            .await
            .unwrap();
        let err = CountEcho
            .handle(
                &mut sink,
                &message(2, &[0x80]),
                &progress(2, Remaining::Count(3)),
            )
            .await
            .unwrap_err();
        sink.close().await.unwrap();

        assert_eq!(err, DrainError::Persist(2));
        assert_eq!(buffer.contents(), "");
        assert_eq!(sink.records(), 0);
    }

    #[tokio::test]
    async fn size_echo_accepts_binary_payloads() {
        let (mut sink, _buffer) = memory_sink();
        SizeEcho
            .handle(
                &mut sink,
                &message(1, &[0x00, 0xff]),
                &progress(1, Remaining::Time(Duration::from_secs(2))),
            )
            .await
            .unwrap();

        assert_eq!(sink.records(), 0);
    }
}
