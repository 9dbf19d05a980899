//! CLMM positions example: print every position of an owner with range status,
//! composition and unclaimed fees.
//! Usage: clmm-positions <owner_address> <position_manager_address> <rpc_url> [uniswap_v3|algebra_integral]

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{bail, Result};
use clients_clmm::DexFlavor;
use lpmonitor::{build_snapshot, ChainDataProvider, DexConfig, EvmChainProvider};
use url::Url;

const DEX_NAME: &str = "dex";

fn parse_flavor(value: Option<&String>) -> Result<DexFlavor> {
    match value.map(|s| s.trim()) {
        None | Some("uniswap_v3") => Ok(DexFlavor::UniswapV3),
        Some("algebra_integral") => Ok(DexFlavor::AlgebraIntegral),
        Some(other) => bail!("unknown flavor {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <owner_address> <position_manager_address> <rpc_url> [uniswap_v3|algebra_integral]",
            args.first().map(|s| s.as_str()).unwrap_or("clmm-positions")
        );
        std::process::exit(1);
    }

    let owner = Address::from_str(args[1].trim())?;
    let dex = DexConfig {
        name: DEX_NAME.to_string(),
        flavor: parse_flavor(args.get(4))?,
        position_manager: Address::from_str(args[2].trim())?,
        wallets: vec![owner],
    };
    let rpc_url = Url::parse(args[3].trim())?;

    let chain = EvmChainProvider::connect_http(
        rpc_url,
        std::slice::from_ref(&dex),
        Duration::from_secs(10),
    );
    chain.verify_dex(&dex).await?;

    let block = chain.latest_block().await?;
    let ids = chain.enumerate_positions(DEX_NAME, owner, block).await?;
    println!("Owner: {} | Flavor: {} | Block: {} | Positions: {}", owner, dex.flavor, block, ids.len());

    for id in ids {
        let raw = chain.position(DEX_NAME, owner, id, block).await?;
        println!("---");
        println!("  token_id: {}", id);
        if raw.liquidity == 0 {
            println!("  liquidity: 0 (closed)");
            continue;
        }

        let pool = chain.discover_pool(&raw.pool_key()).await?;
        let state = chain.pool_state(&pool, block).await?;
        let lower = chain.tick_fee_growth(&pool, raw.tick_lower, block).await?;
        let upper = chain.tick_fee_growth(&pool, raw.tick_upper, block).await?;
        let snapshot = build_snapshot(&raw, &pool, &state, &lower, &upper, utils::unix_timestamp_secs())?;

        let symbol0 = &pool.token0.symbol;
        let symbol1 = &pool.token1.symbol;
        println!("  pool: {} ({})", pool.label(), pool.address);
        println!("  ticks: [{}, {}) current {}", snapshot.tick_lower, snapshot.tick_upper, snapshot.current_tick);
        println!(
            "  price: {:.6} {}/{} | range {:.6} - {:.6}",
            snapshot.price, symbol1, symbol0, snapshot.lower_price, snapshot.upper_price
        );
        println!("  status: {:?}", snapshot.status);
        println!("  liquidity: {}", snapshot.liquidity);
        println!("  amount0: {:.6} {}", snapshot.amount0, symbol0);
        println!("  amount1: {:.6} {}", snapshot.amount1, symbol1);
        println!("  unclaimed fees: {:.6} {} + {:.6} {}", snapshot.unclaimed_fees0, symbol0, snapshot.unclaimed_fees1, symbol1);
        if snapshot.fee_inconsistency {
            println!("  warning: fee growth below checkpoint, fees clamped to zero");
        }
    }

    Ok(())
}
