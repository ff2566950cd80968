//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MonitorConfig (validated, immutable)
//!     → ChainProfile + MonitorPolicy handed to the monitor
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → watcher.rs diffs against the running config
//!       (other sections: warn, restart required)
//!     → changed [policy] section applied through the monitor's update API
//! ```
//!
//! # Design Decisions
//! - The monitor core never reads files; it receives plain values
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ChainConfig, FeedConfig, HealthCheckConfig, LogFormat, MonitorConfig, NotifierConfig,
    ObservabilityConfig, PolicyConfig, RetryConfig, RpcConfig, ScannerConfig, TokenConfig,
};
pub use validation::ValidationError;
