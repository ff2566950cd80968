//! Immutable per-chain metadata.

use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

use crate::config::schema::ChainConfig;

/// Native coins always use 18 decimals on EVM chains.
pub const NATIVE_DECIMALS: u8 = 18;

/// A registered ERC-20 contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub contract: Address,
    pub decimals: u8,
}

/// Errors building a profile from configuration.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("token {symbol}: invalid contract address '{contract}'")]
    InvalidContract { symbol: String, contract: String },
}

/// Per-chain metadata, built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ChainProfile {
    name: String,
    rpc_urls: Vec<String>,
    chain_id: Option<u64>,
    native_symbol: String,
    confirmation_blocks: u64,
    block_time: Duration,
    l1_finality_blocks: Option<u64>,
    explorer_url: Option<String>,
    tokens: Vec<TokenInfo>,
    by_contract: HashMap<Address, usize>,
}

impl ChainProfile {
    /// Minimal profile; extend with the `with_*` builders.
    pub fn new(name: impl Into<String>, native_symbol: impl Into<String>, confirmation_blocks: u64) -> Self {
        Self {
            name: name.into(),
            rpc_urls: Vec::new(),
            chain_id: None,
            native_symbol: native_symbol.into(),
            confirmation_blocks,
            block_time: Duration::from_secs(12),
            l1_finality_blocks: None,
            explorer_url: None,
            tokens: Vec::new(),
            by_contract: HashMap::new(),
        }
    }

    /// Build from the `[chain]` configuration section.
    pub fn from_config(config: &ChainConfig) -> Result<Self, ProfileError> {
        let mut profile = Self::new(&config.name, &config.native_symbol, config.confirmation_blocks)
            .with_block_time(Duration::from_secs(config.block_time_secs));
        profile.rpc_urls = std::iter::once(config.rpc_url.clone())
            .chain(config.failover_urls.iter().cloned())
            .collect();
        profile.chain_id = config.chain_id;
        profile.l1_finality_blocks = config.l1_finality_blocks;
        profile.explorer_url = config.explorer_url.clone();

        for token in &config.tokens {
            let contract: Address = token.contract.parse().map_err(|_| ProfileError::InvalidContract {
                symbol: token.symbol.clone(),
                contract: token.contract.clone(),
            })?;
            profile = profile.with_token(&token.symbol, contract, token.decimals);
        }

        Ok(profile)
    }

    pub fn with_token(mut self, symbol: impl Into<String>, contract: Address, decimals: u8) -> Self {
        self.by_contract.insert(contract, self.tokens.len());
        self.tokens.push(TokenInfo {
            symbol: symbol.into(),
            contract,
            decimals,
        });
        self
    }

    pub fn with_l1_finality(mut self, blocks: u64) -> Self {
        self.l1_finality_blocks = Some(blocks);
        self
    }

    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary endpoint first, then failovers.
    pub fn rpc_urls(&self) -> &[String] {
        &self.rpc_urls
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn native_symbol(&self) -> &str {
        &self.native_symbol
    }

    pub fn block_time(&self) -> Duration {
        self.block_time
    }

    pub fn l1_finality_blocks(&self) -> Option<u64> {
        self.l1_finality_blocks
    }

    pub fn tokens(&self) -> &[TokenInfo] {
        &self.tokens
    }

    /// Look up a registered token by its contract address.
    pub fn token_by_contract(&self, contract: &Address) -> Option<&TokenInfo> {
        self.by_contract.get(contract).map(|&i| &self.tokens[i])
    }

    pub fn token(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }

    /// Chain target: local confirmations plus L1 finality, as one threshold.
    pub fn base_confirmations(&self) -> u64 {
        self.confirmation_blocks
            .saturating_add(self.l1_finality_blocks.unwrap_or(0))
    }

    /// Target for a candidate, adding `bonus` once when it is high value.
    pub fn required_confirmations(&self, high_value: bool, bonus: u64) -> u64 {
        if high_value {
            self.base_confirmations().saturating_add(bonus)
        } else {
            self.base_confirmations()
        }
    }

    /// Rough wall-clock time to reach `confirmations`.
    pub fn estimated_confirmation_time(&self, confirmations: u64) -> Duration {
        self.block_time.saturating_mul(confirmations.min(u32::MAX as u64) as u32)
    }

    /// Explorer link for a transaction, when an explorer is configured.
    pub fn explorer_tx_url(&self, hash: &TxHash) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), hash))
    }
}
