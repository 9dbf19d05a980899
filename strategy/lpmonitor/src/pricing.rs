//! Token valuation.
//!
//! USD prices are derived from the monitored pools themselves: any token whose
//! symbol is a configured stablecoin is worth 1 USD, and prices propagate through
//! pool prices to the tokens paired with it, then one hop further. Positions whose
//! tokens cannot be reached are valued in units of their pool's token1.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::types::PoolRef;

/// Stablecoin symbols recognised out of the box.
pub const DEFAULT_STABLECOINS: &[&str] = &[
    "USDC", "USDT", "USD₮0", "USDT0", "USDE", "USDHL", "USDXL", "FEUSD", "DAI", "FRAX", "LUSD",
    "BUSD", "TUSD", "FDUSD", "PYUSD", "USDS",
];

/// Propagation passes when deriving prices through intermediate pairs.
const MAX_PASSES: usize = 3;

/// Wrapped-native symbols shown as their native asset.
pub fn default_symbol_aliases() -> BTreeMap<String, String> {
    [
        ("WHYPE", "HYPE"),
        ("WETH", "ETH"),
        ("WBTC", "BTC"),
        ("WAVAX", "AVAX"),
        ("WMATIC", "MATIC"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

/// Applies the alias table to an on-chain symbol, matching case-insensitively.
pub fn display_symbol(symbol: &str, aliases: &BTreeMap<String, String>) -> String {
    aliases
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(symbol))
        .map(|(_, to)| to.clone())
        .unwrap_or_else(|| symbol.to_string())
}

/// Case-insensitive set of stablecoin symbols.
#[derive(Debug, Clone, Default)]
pub struct StablecoinSet(HashSet<String>);

impl StablecoinSet {
    pub fn new<S: AsRef<str>>(symbols: impl IntoIterator<Item = S>) -> Self {
        Self(
            symbols
                .into_iter()
                .map(|s| s.as_ref().to_uppercase())
                .collect(),
        )
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.0.contains(&symbol.to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationUnit {
    Usd,
    /// Units of the position's own token1
    Token1,
}

/// Per-token prices used to value one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub price0: f64,
    pub price1: f64,
    pub unit: ValuationUnit,
}

impl Valuation {
    /// Values token0 at the pool price and token1 at one.
    pub fn in_token1(pool_price: f64) -> Self {
        Self {
            price0: pool_price,
            price1: 1.0,
            unit: ValuationUnit::Token1,
        }
    }

    pub fn value(&self, amount0: f64, amount1: f64) -> f64 {
        amount0 * self.price0 + amount1 * self.price1
    }
}

/// USD prices derived for one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct TokenPrices {
    usd: HashMap<Address, f64>,
}

impl TokenPrices {
    /// Derives USD prices from `(pool, token1-per-token0 price)` observations.
    pub fn derive<'a>(
        observations: impl IntoIterator<Item = (&'a PoolRef, f64)>,
        stablecoins: &StablecoinSet,
    ) -> Self {
        let observations: Vec<(&PoolRef, f64)> = observations
            .into_iter()
            .filter(|(_, price)| price.is_finite() && *price > 0.0)
            .collect();

        let mut usd = HashMap::new();
        for (pool, _) in &observations {
            for token in [&pool.token0, &pool.token1] {
                if stablecoins.contains(&token.symbol) {
                    usd.insert(token.address, 1.0);
                }
            }
        }

        for _ in 0..MAX_PASSES {
            let mut changed = false;
            for (pool, price) in &observations {
                let p0 = usd.get(&pool.token0.address).copied();
                let p1 = usd.get(&pool.token1.address).copied();
                match (p0, p1) {
                    (None, Some(p1)) => {
                        usd.insert(pool.token0.address, price * p1);
                        changed = true;
                    }
                    (Some(p0), None) => {
                        usd.insert(pool.token1.address, p0 / price);
                        changed = true;
                    }
                    _ => {}
                }
            }
            if !changed {
                break;
            }
        }

        Self { usd }
    }

    pub fn usd(&self, token: Address) -> Option<f64> {
        self.usd.get(&token).copied()
    }

    /// USD valuation when both tokens are priced, token1 units otherwise.
    pub fn valuation(&self, pool: &PoolRef, pool_price: f64) -> Valuation {
        match (self.usd(pool.token0.address), self.usd(pool.token1.address)) {
            (Some(price0), Some(price1)) => Valuation {
                price0,
                price1,
                unit: ValuationUnit::Usd,
            },
            _ => Valuation::in_token1(pool_price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenRef;
    use clients_clmm::DexFlavor;
    use rstest::{fixture, rstest};

    fn pool(symbol0: &str, byte0: u8, symbol1: &str, byte1: u8) -> PoolRef {
        let token = |symbol: &str, byte: u8| TokenRef {
            address: Address::repeat_byte(byte),
            symbol: symbol.to_string(),
            decimals: 18,
        };
        PoolRef {
            dex: "TestSwap".to_string(),
            flavor: DexFlavor::UniswapV3,
            address: Address::repeat_byte(byte0 ^ byte1),
            token0: token(symbol0, byte0),
            token1: token(symbol1, byte1),
            tick_spacing: 60,
            fee_tier: Some(3000),
        }
    }

    #[fixture]
    fn stablecoins() -> StablecoinSet {
        StablecoinSet::new(DEFAULT_STABLECOINS)
    }

    #[rstest]
    fn test_stable_token1_prices_token0(stablecoins: StablecoinSet) {
        let hype_usdc = pool("HYPE", 1, "USDC", 2);
        let prices = TokenPrices::derive([(&hype_usdc, 25.0)], &stablecoins);
        assert_eq!(prices.usd(Address::repeat_byte(1)), Some(25.0));
        let valuation = prices.valuation(&hype_usdc, 25.0);
        assert_eq!(valuation.unit, ValuationUnit::Usd);
        assert_eq!(valuation.value(2.0, 10.0), 60.0);
    }

    #[rstest]
    fn test_stable_token0_inverts_price(stablecoins: StablecoinSet) {
        let usdt_hype = pool("usd₮0", 2, "HYPE", 1);
        let prices = TokenPrices::derive([(&usdt_hype, 0.04)], &stablecoins);
        let hype = prices.usd(Address::repeat_byte(1)).unwrap();
        assert!((hype - 25.0).abs() < 1e-9);
    }

    #[rstest]
    fn test_prices_propagate_one_hop(stablecoins: StablecoinSet) {
        let kitten_hype = pool("KITTEN", 3, "HYPE", 1);
        let hype_usdc = pool("HYPE", 1, "USDC", 2);
        let prices =
            TokenPrices::derive([(&kitten_hype, 0.01), (&hype_usdc, 25.0)], &stablecoins);
        let kitten = prices.usd(Address::repeat_byte(3)).unwrap();
        assert!((kitten - 0.25).abs() < 1e-12);
    }

    #[rstest]
    fn test_unpriced_pair_falls_back_to_token1(stablecoins: StablecoinSet) {
        let a_b = pool("AAA", 4, "BBB", 5);
        let prices = TokenPrices::derive([(&a_b, 3.0)], &stablecoins);
        let valuation = prices.valuation(&a_b, 3.0);
        assert_eq!(valuation, Valuation::in_token1(3.0));
    }

    #[rstest]
    #[case("WHYPE", "HYPE")]
    #[case("weth", "ETH")]
    #[case("PURR", "PURR")]
    fn test_display_symbol(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(display_symbol(raw, &default_symbol_aliases()), expected);
    }
}
