//! Telemetry: structured logging and metrics.
//!
//! - **Logging**: JSON/pretty/compact output via `tracing-subscriber`, with redaction
//!   of notification addresses and URL credentials
//! - **Metrics**: scheduler and execution counters through the `metrics` facade
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_core::telemetry::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default(), "production").expect("Failed to initialize logging");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, redact, LogFormat, LoggingConfig, RedactionConfig, SensitiveFieldRedactor};
pub use metrics::{describe_metrics, ExecutionMetrics, OperationTimer, SchedulerMetrics};
