//! Per-operation linear backoff.

use std::{collections::BTreeMap, time::Duration};

use tokio::task::AbortHandle;

use crate::prelude::*;

pub const BASE_DELAY: Duration = Duration::from_secs(5 * 60);
pub const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

/// Logical operation with its own retry counter, for example `energi_data_service_spotprice`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, derive_more::Display)]
pub struct OperationKey(String);

impl OperationKey {
    #[must_use]
    pub fn spot_price(provider_id: &str) -> Self {
        Self(format!("{provider_id}_spotprice"))
    }

    /// Missing tomorrow prices, retried against all providers.
    #[must_use]
    pub fn tomorrow() -> Self {
        Self("spotprice".to_string())
    }

    #[must_use]
    pub fn co2(provider_id: &str) -> Self {
        Self(format!("{provider_id}_co2"))
    }

    #[must_use]
    pub fn tariff(provider_id: &str) -> Self {
        Self(format!("{provider_id}_tariff"))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryEntry {
    pub attempt_count: u32,
    pub next_delay: Duration,
}

/// `min(5 min × attempt, 60 min)`.
#[must_use]
pub fn backoff(attempt_count: u32) -> Duration {
    BASE_DELAY.saturating_mul(attempt_count).min(MAX_DELAY)
}

/// Attempt counters and pending timers, by operation.
#[derive(Default)]
pub struct RetryState {
    entries: BTreeMap<OperationKey, RetryEntry>,
    timers: BTreeMap<OperationKey, AbortHandle>,
}

impl RetryState {
    #[must_use]
    pub fn get(&self, key: &OperationKey) -> Option<RetryEntry> {
        self.entries.get(key).copied()
    }

    /// Count one more failure and return the delay before the next attempt.
    pub fn record_failure(&mut self, key: &OperationKey) -> Duration {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert(RetryEntry { attempt_count: 0, next_delay: Duration::ZERO });
        entry.attempt_count += 1;
        entry.next_delay = backoff(entry.attempt_count);
        entry.next_delay
    }

    /// Forget the operation entirely and cancel its pending timer.
    pub fn clear(&mut self, key: &OperationKey) {
        if self.entries.remove(key).is_some() {
            debug!(%key, "retry state cleared");
        }
        if let Some(timer) = self.timers.remove(key) {
            timer.abort();
        }
    }

    /// Track the timer, replacing and cancelling the previous one.
    pub fn arm(&mut self, key: OperationKey, timer: AbortHandle) {
        if let Some(previous) = self.timers.insert(key, timer) {
            previous.abort();
        }
    }

    /// Called by a timer that has fired, so that a later clear does not abort the running retry.
    pub fn disarm(&mut self, key: &OperationKey) {
        self.timers.remove(key);
    }

    #[must_use]
    pub fn n_pending(&self) -> usize {
        self.timers.len()
    }

    pub fn cancel_all(&mut self) {
        for (key, timer) in std::mem::take(&mut self.timers) {
            debug!(%key, "cancelling the retry");
            timer.abort();
        }
    }
}
