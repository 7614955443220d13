// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Termination Policies
//!
//! This module defines when a consumption loop stops accepting deliveries.
//! A policy is evaluated once per delivery, before the delivery is
//! processed: a delivery that arrives with the policy exhausted is neither
//! handled nor acknowledged. A deadline additionally doubles as a wakeup,
//! so an idle queue cannot hold the loop past it. The policy owns its own
//! termination state, so the loop mutates it in exactly one place.

use std::{fmt, time::Duration};
use tokio::time::Instant;

/// Bounds the lifetime of a consumption loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPolicy {
    /// Stop once the instant is reached, whether or not a delivery arrives
    Deadline(Instant),
    /// Stop once the remaining acknowledgment budget reaches zero
    RemainingCount(u64),
    /// Never stop; the loop runs until cancelled or the channel closes
    Unbounded,
}

impl TerminationPolicy {
    /// Creates a deadline policy expiring `window` from now.
    ///
    /// # Parameters
    /// * `window` - How long the loop may keep consuming
    ///
    /// # Returns
    /// A `Deadline` policy anchored to the current instant
    pub fn deadline_in(window: Duration) -> TerminationPolicy {
        TerminationPolicy::Deadline(Instant::now() + window)
    }

    /// The absolute wakeup instant, if this policy carries one.
    ///
    /// Lets the loop arm a timer so a deadline fires even while the queue
    /// is idle.
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            TerminationPolicy::Deadline(deadline) => Some(*deadline),
            _ => None,
        }
    }

    /// Reports whether the policy is exhausted.
    ///
    /// A deadline is exhausted once the current time reaches it; a count is
    /// exhausted at zero; `Unbounded` never exhausts.
    pub fn exhausted(&self) -> bool {
        match self {
            TerminationPolicy::Deadline(deadline) => Instant::now() >= *deadline,
            TerminationPolicy::RemainingCount(count) => *count == 0,
            TerminationPolicy::Unbounded => false,
        }
    }

    /// Reports the policy's observable headroom.
    ///
    /// # Returns
    /// Remaining time for deadlines (saturating at zero), remaining count
    /// for budgets, or `Remaining::Unbounded`
    pub fn remaining(&self) -> Remaining {
        match self {
            TerminationPolicy::Deadline(deadline) => {
                Remaining::Time(deadline.duration_since(Instant::now()))
            }
            TerminationPolicy::RemainingCount(count) => Remaining::Count(*count),
            TerminationPolicy::Unbounded => Remaining::Unbounded,
        }
    }

    /// Records one successfully acknowledged delivery.
    ///
    /// Only `RemainingCount` carries per-delivery state; the other policies
    /// ignore the call.
    pub fn note_processed(&mut self) {
        if let TerminationPolicy::RemainingCount(count) = self {
            *count = count.saturating_sub(1);
        }
    }
}

/// Headroom left under a policy, as rendered in receipt events and console
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Time(Duration),
    Count(u64),
    Unbounded,
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Time(window) => write!(f, "{:.3}s", window.as_secs_f64()),
            Remaining::Count(count) => write!(f, "{count} messages"),
            Remaining::Unbounded => write!(f, "unbounded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_exhausts_at_the_instant() {
        let policy = TerminationPolicy::deadline_in(Duration::from_secs(5));
        assert!(!policy.exhausted());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(policy.exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_remaining_counts_down_and_saturates() {
        let policy = TerminationPolicy::deadline_in(Duration::from_secs(5));
        assert_eq!(policy.remaining(), Remaining::Time(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(policy.remaining(), Remaining::Time(Duration::ZERO));
        assert!(policy.exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn only_deadlines_carry_a_wakeup_instant() {
        let at = Instant::now() + Duration::from_secs(5);
        assert_eq!(TerminationPolicy::Deadline(at).deadline(), Some(at));
        assert_eq!(TerminationPolicy::RemainingCount(3).deadline(), None);
        assert_eq!(TerminationPolicy::Unbounded.deadline(), None);
    }

    #[test]
    fn remaining_count_exhausts_after_the_budget() {
        let mut policy = TerminationPolicy::RemainingCount(2);
        assert!(!policy.exhausted());

        policy.note_processed();
        assert!(!policy.exhausted());
        assert_eq!(policy.remaining(), Remaining::Count(1));

        policy.note_processed();
        assert!(policy.exhausted());
        assert_eq!(policy.remaining(), Remaining::Count(0));
    }

    #[test]
    fn exhausted_count_stays_at_zero() {
        let mut policy = TerminationPolicy::RemainingCount(0);
        policy.note_processed();
        assert_eq!(policy.remaining(), Remaining::Count(0));
        assert!(policy.exhausted());
    }

    #[test]
    fn unbounded_never_exhausts() {
        let mut policy = TerminationPolicy::Unbounded;
        assert!(!policy.exhausted());

        policy.note_processed();
        assert!(!policy.exhausted());
        assert_eq!(policy.remaining(), Remaining::Unbounded);
    }

    #[test]
    fn remaining_renders_for_the_log() {
        assert_eq!(
            Remaining::Time(Duration::from_millis(29_971)).to_string(),
            "29.971s"
        );
        assert_eq!(Remaining::Count(3).to_string(), "3 messages");
        assert_eq!(Remaining::Unbounded.to_string(), "unbounded");
    }
}
