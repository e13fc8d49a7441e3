//! # Utility Modules
//!
//! Supporting utilities for observability, logging and timing.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup for binaries
//! - **Metrics**: Thread-safe session counters
//! - **Timeout**: Bounded-wait wrappers and default durations

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::SessionMetrics;
