//! ERC-20 metadata reads.

use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::DynProvider;

use crate::contracts::IERC20Metadata;
use crate::error::{with_timeout, ClmmError};

/// Decimals assumed when a token does not implement `decimals()`.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Symbol and decimals of an ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Clone)]
pub struct TokenClient {
    provider: DynProvider,
    timeout: Duration,
}

impl TokenClient {
    pub fn new(provider: DynProvider, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Reads symbol and decimals of `address`.
    ///
    /// A token that reverts on either call still resolves: decimals fall back to
    /// [`DEFAULT_DECIMALS`] and the symbol to an abbreviated address. Transport
    /// failures are returned so the caller can retry.
    pub async fn metadata(&self, address: Address) -> Result<TokenMetadata, ClmmError> {
        let token = IERC20Metadata::new(address, self.provider.clone());

        let decimals = match with_timeout("decimals", self.timeout, token.decimals().call())
            .await?
            .map_err(|e| ClmmError::from_contract("decimals", e))
        {
            Ok(decimals) => decimals,
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => {
                tracing::warn!(%address, error = %err, "decimals() unavailable, assuming {DEFAULT_DECIMALS}");
                DEFAULT_DECIMALS
            }
        };

        let symbol = match with_timeout("symbol", self.timeout, token.symbol().call())
            .await?
            .map_err(|e| ClmmError::from_contract("symbol", e))
        {
            Ok(symbol) if !symbol.trim().is_empty() => symbol.trim().to_string(),
            Ok(_) => short_address(address),
            Err(err) if err.is_transient() => return Err(err),
            Err(err) => {
                tracing::warn!(%address, error = %err, "symbol() unavailable");
                short_address(address)
            }
        };

        Ok(TokenMetadata {
            address,
            symbol,
            decimals,
        })
    }
}

/// `0x1234..abcd` style label for tokens without a readable symbol.
fn short_address(address: Address) -> String {
    let hex = address.to_string();
    format!("{}..{}", &hex[..6], &hex[hex.len() - 4..])
}
