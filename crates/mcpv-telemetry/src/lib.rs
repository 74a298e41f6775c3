//! # mcpv Telemetry
//!
//! The metrics/log bus: a pluggable [`Metrics`]
//! capability interface (`prometheus`/`noop`) and a multi-subscriber
//! structured [`LogBus`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod log;
pub mod metrics;

pub use log::{Level, LogBus, LogRecord, LogSubscription};
pub use metrics::{Metrics, NoopMetrics, PrometheusMetrics};
