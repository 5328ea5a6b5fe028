// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/main.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Binary entry point: parse arguments, load the rig config, bring up
// logging, then either print a test register program or hand everything to
// the supervisor and mine until interrupted.

use clap::Parser;
use thyrox_miner::algo::mining_funcs;
use thyrox_miner::core::types::Args;
use thyrox_miner::core::{Algorithm, Config};
use thyrox_miner::{Miner, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = match level {
        "debug" => "thyrox_miner=debug",
        "info" => "thyrox_miner=info",
        _ => "thyrox_miner=error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

/// A zeroed header of the right shape for one algorithm, for bench checks
/// against a docked board
fn test_header(algo: Algorithm) -> Vec<u8> {
    match algo {
        Algorithm::Odocrypt | Algorithm::Skunk => vec![0u8; 112],
        Algorithm::Ckb => vec![0u8; 44],
        Algorithm::Trb => vec![0u8; 52],
        Algorithm::Veo => vec![0u8; 48],
        Algorithm::Verus => vec![0u8; 1487],
        Algorithm::Xdag => vec![0u8; 144],
    }
}

fn run_test_mode(config: &Config) {
    let algo = config.pools[config.active_pool_index()].algo;
    let packet = mining_funcs(algo).construct_header_packets(&test_header(algo), 1);
    println!("test packet for {} ({} bytes):", algo, packet.len());
    for frame in packet.chunks(6) {
        println!("{}", hex::encode_upper(frame));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.cfg)?;
    init_logging(&config.debug);
    info!("Config file: {}", args.cfg);

    if let Err(err) = config.validate() {
        eprintln!("❌ Error: {}", err);
        std::process::exit(1);
    }

    if args.test || config.test {
        run_test_mode(&config);
        return Ok(());
    }

    info!("🚀 Starting thyrox miner");
    info!("📟 Device: {} @ {} baud", config.device, config.baudrate);
    info!("🧩 Boards: {} (poll {}ms, refresh {}ms)", config.muxnum, config.polldelay, config.noncetimeout);
    for pool in &config.pools {
        info!(
            "🌊 Pool: {} user {} algo {}{}",
            pool.url,
            pool.user,
            pool.algo,
            if pool.active { " [active]" } else { "" }
        );
    }

    let miner = Miner::new(config);
    miner.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    miner.stop().await;
    Ok(())
}
