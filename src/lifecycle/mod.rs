//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every ShutdownSignal wakes → scan loop finishes its tick → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary triggers a graceful monitor stop
//! ```
//!
//! # Design Decisions
//! - The stop flag is level-triggered: late subscribers still observe it
//! - The scan loop checks it between ticks and before each block fetch

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
