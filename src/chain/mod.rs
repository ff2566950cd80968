//! Static chain metadata: confirmation targets and the token registry.

pub mod profile;
pub mod units;

pub use profile::{ChainProfile, ProfileError, TokenInfo, NATIVE_DECIMALS};
