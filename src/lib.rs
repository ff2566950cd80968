//! EVM transfer monitor library.

pub mod config;
pub mod chain;
pub mod blockchain;
pub mod monitor;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::MonitorConfig;
pub use lifecycle::Shutdown;
pub use monitor::Monitor;
