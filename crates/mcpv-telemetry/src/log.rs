//! Multi-subscriber structured log fan-out.
//!
//! Distinct from `tracing`: `tracing` gives process-local subscriber
//! layers, but this bus is consumed by the RPC/gateway surface to stream
//! records to *external* subscribers (the `Logs` RPC), each with its own
//! minimum level and independent backpressure. We layer a
//! small ring on top of a [`tokio::sync::broadcast`] channel; slow
//! subscribers lose intermediate entries exactly as `broadcast` already
//! does when a receiver falls behind (`RecvError::Lagged`), which matches
//! the "bounded buffer, drop oldest" contract directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Severity, ordered so `Level::Error >= Level::Info` etc. compares
/// correctly with a subscriber's minimum level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Fine-grained diagnostic detail.
    Trace,
    /// Debugging detail.
    Debug,
    /// Normal operational messages.
    Info,
    /// Recoverable problems.
    Warn,
    /// Unrecoverable problems for the emitting operation.
    Error,
}

/// One structured log record published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the record was emitted.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: Level,
    /// Subsystem the record originated from (e.g. `"scheduler"`,
    /// `"catalog"`).
    pub target: String,
    /// Human-readable message.
    pub message: String,
    /// Spec this record concerns, if any.
    pub spec_key: Option<String>,
}

/// Process-wide log fan-out. Cheaply `Clone`able; clones share the same
/// underlying broadcast channel.
#[derive(Clone)]
pub struct LogBus {
    sender: broadcast::Sender<LogRecord>,
}

/// The minimum-level view of the bus handed to one subscriber.
pub struct LogSubscription {
    receiver: broadcast::Receiver<LogRecord>,
    min_level: Level,
}

impl LogBus {
    /// Create a bus with the given per-subscriber ring capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a record to every current subscriber. Subscribers whose ring
    /// is full silently drop their oldest unread entry (broadcast
    /// semantics) rather than this call blocking.
    pub fn publish(&self, record: LogRecord) {
        // No active subscribers is not an error: the bus simply has no one
        // to deliver to yet.
        let _ = self.sender.send(record);
    }

    /// Subscribe with a minimum level; records below `min_level` are
    /// filtered out in [`LogSubscription::recv`] rather than at publish
    /// time, since a later subscriber with a lower minimum may still want
    /// them.
    #[must_use]
    pub fn subscribe(&self, min_level: Level) -> LogSubscription {
        LogSubscription {
            receiver: self.sender.subscribe(),
            min_level,
        }
    }
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl LogSubscription {
    /// Wait for the next record at or above this subscription's minimum
    /// level. Returns `None` once the bus itself is gone (all senders
    /// dropped).
    pub async fn recv(&mut self) -> Option<LogRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(record) if record.level >= self.min_level => return Some(record),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: Level, message: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            level,
            target: "test".to_string(),
            message: message.to_string(),
            spec_key: None,
        }
    }

    #[tokio::test]
    async fn subscriber_filters_below_minimum_level() {
        let bus = LogBus::new(16);
        let mut sub = bus.subscribe(Level::Warn);
        bus.publish(record(Level::Info, "ignored"));
        bus.publish(record(Level::Error, "kept"));
        let received = sub.recv().await.unwrap();
        assert_eq!(received.message, "kept");
    }

    #[tokio::test]
    async fn two_subscribers_with_different_minimums_each_get_their_own_filtered_view() {
        let bus = LogBus::new(16);
        let mut debug_sub = bus.subscribe(Level::Debug);
        let mut error_sub = bus.subscribe(Level::Error);
        bus.publish(record(Level::Info, "info-level"));

        let seen = debug_sub.recv().await.unwrap();
        assert_eq!(seen.message, "info-level");

        bus.publish(record(Level::Error, "error-level"));
        let seen = error_sub.recv().await.unwrap();
        assert_eq!(seen.message, "error-level");
    }
}
