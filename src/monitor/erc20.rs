//! ERC-20 call-data decoding.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use thiserror::Error;

sol! {
    /// `transfer(address,uint256)`, selector `0xa9059cbb`.
    #[derive(Debug)]
    function transfer(address to, uint256 amount) external returns (bool);

    /// `transferFrom(address,address,uint256)`, selector `0x23b872dd`.
    #[derive(Debug)]
    function transferFrom(address from, address to, uint256 amount) external returns (bool);
}

/// Why call data could not be read as a token transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("call data shorter than a selector")]
    TooShort,
    #[error("selector 0x{0} is not a transfer")]
    UnknownSelector(String),
    #[error("malformed {method} arguments: {reason}")]
    Malformed { method: &'static str, reason: String },
}

/// Decoded arguments of a transfer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer {
    /// Present only for `transferFrom`; `transfer` moves the caller's tokens.
    pub from: Option<Address>,
    pub to: Address,
    pub amount: U256,
}

/// True when `input` begins with one of the transfer selectors.
pub fn is_transfer_call(input: &[u8]) -> bool {
    input.len() >= 4 && {
        let selector = &input[..4];
        selector == transferCall::SELECTOR || selector == transferFromCall::SELECTOR
    }
}

/// Decode `transfer` or `transferFrom` call data, selector included.
pub fn decode_transfer(input: &[u8]) -> Result<TokenTransfer, DecodeError> {
    if input.len() < 4 {
        return Err(DecodeError::TooShort);
    }

    let selector = &input[..4];
    if selector == transferCall::SELECTOR {
        let call = transferCall::abi_decode(input).map_err(|e| DecodeError::Malformed {
            method: "transfer",
            reason: e.to_string(),
        })?;
        Ok(TokenTransfer {
            from: None,
            to: call.to,
            amount: call.amount,
        })
    } else if selector == transferFromCall::SELECTOR {
        let call = transferFromCall::abi_decode(input).map_err(|e| DecodeError::Malformed {
            method: "transferFrom",
            reason: e.to_string(),
        })?;
        Ok(TokenTransfer {
            from: Some(call.from),
            to: call.to,
            amount: call.amount,
        })
    } else {
        Err(DecodeError::UnknownSelector(alloy::hex::encode(selector)))
    }
}
