//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to node:
//!     → blockchain::client (per-call timeout, endpoint failover)
//!     → On transport failure: retries.rs (retry with backoff.rs delays)
//!
//! Scan loop tick fails:
//!     → backoff.rs delay before retrying the same blocks
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries only for transport failures, never for budget refusals
//! - Backoff delays carry up to 10% jitter

pub mod backoff;
pub mod retries;

pub use backoff::backoff_delay;
pub use retries::RetryPolicy;
