//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and histograms via the Metrics collaborator)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with batch, transaction and operation IDs as fields
//! - Request ID flows from the HTTP layer into request spans
//! - Metrics are reached through a trait so the pipeline can run without an exporter

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{init_metrics, Metrics, NoopMetrics, PrometheusMetrics};
