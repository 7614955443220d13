// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumption Loop
//!
//! This module drives a termination policy and a message handler over a
//! stream of deliveries. One loop serves every policy/handler pairing: the
//! policy is evaluated before each delivery, the handler runs on the
//! deliveries that make the cut, and acknowledgment follows handler success
//! one tag at a time. Cancellation is observed at the stream suspension
//! point, so an interrupt never tears a delivery in half.

use crate::{
    errors::DrainError,
    handler::{Message, MessageHandler, Progress},
    policy::TerminationPolicy,
    sink::RecordSink,
};
use async_trait::async_trait;
use futures_util::{pin_mut, Stream, StreamExt};
use lapin::{options::BasicAckOptions, Channel};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Acknowledgment seam between the loop and the transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Acknowledges exactly one delivery tag.
    async fn ack(&self, delivery_tag: u64) -> Result<(), DrainError>;
}

#[async_trait]
impl Acknowledger for Channel {
    async fn ack(&self, delivery_tag: u64) -> Result<(), DrainError> {
        match self
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(
                    error = err.to_string(),
                    tag = delivery_tag,
                    "failure to ack message"
                );
                Err(DrainError::Ack(delivery_tag))
            }
        }
    }
}

/// Why the consumption loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The termination policy was exhausted before a delivery
    PolicyExhausted,
    /// The session's cancellation token fired
    Cancelled,
    /// The broker closed the delivery stream
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainOutcome {
    pub(crate) reason: StopReason,
    pub(crate) processed: u64,
}

/// Drains deliveries until the policy exhausts, the token fires, or the
/// stream ends.
///
/// A delivery observed with the policy already exhausted is neither handled
/// nor acknowledged, and a deadline fires even while the queue is idle. A
/// failed handler or a failed ack leaves the delivery unacknowledged for
/// redelivery and the loop moves on; only a successful ack counts and
/// decrements a count-bounded policy.
pub(crate) async fn drain<S>(
    deliveries: S,
    acker: &dyn Acknowledger,
    handler: &dyn MessageHandler,
    mut policy: TerminationPolicy,
    sink: &mut RecordSink,
    cancel: &CancellationToken,
) -> DrainOutcome
where
    S: Stream<Item = Result<Message, DrainError>>,
{
    pin_mut!(deliveries);
    let mut processed = 0u64;

    loop {
        if policy.exhausted() {
            debug!("termination policy exhausted, leaving the loop");
            return DrainOutcome {
                reason: StopReason::PolicyExhausted,
                processed,
            };
        }

        let message = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("cancellation observed, leaving the loop");
                return DrainOutcome {
                    reason: StopReason::Cancelled,
                    processed,
                };
            }
            _ = until(policy.deadline()) => {
                debug!("deadline reached, leaving the loop");
                return DrainOutcome {
                    reason: StopReason::PolicyExhausted,
                    processed,
                };
            }
            next = deliveries.next() => match next {
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    error!(error = err.to_string(), "failure to receive a delivery");
                    continue;
                }
                None => {
                    debug!("delivery stream ended");
                    return DrainOutcome {
                        reason: StopReason::ChannelClosed,
                        processed,
                    };
                }
            },
        };

        // A delivery racing the deadline loses: it stays unacknowledged.
        if policy.exhausted() {
            debug!(
                tag = message.delivery_tag,
                "policy exhausted, delivery left unacknowledged"
            );
            return DrainOutcome {
                reason: StopReason::PolicyExhausted,
                processed,
            };
        }

        let progress = Progress {
            seq: processed + 1,
            remaining: policy.remaining(),
        };
        debug!(
            tag = message.delivery_tag,
            bytes = message.body.len(),
            redelivered = message.redelivered,
            remaining = %progress.remaining,
            "delivery received"
        );

        match handler.handle(sink, &message, &progress).await {
            Ok(()) => match acker.ack(message.delivery_tag).await {
                Ok(()) => {
                    processed += 1;
                    policy.note_processed();
                }
                Err(err) => {
                    warn!(
                        error = err.to_string(),
                        tag = message.delivery_tag,
                        "ack failed, delivery left for redelivery"
                    );
                }
            },
            Err(err) => {
                warn!(
                    error = err.to_string(),
                    tag = message.delivery_tag,
                    "failure to process delivery, continuing"
                );
            }
        }
    }
}

/// Sleeps until the policy's wakeup instant, or forever when it has none.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
