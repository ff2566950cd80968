//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → stats.rs (in-process counters, periodic summary)
//!         → metrics.rs (Prometheus counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → MonitorHealth report
//! ```

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{PerformanceMetrics, StatsSnapshot};
