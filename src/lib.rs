// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/lib.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// This file serves as the main library entry point for the thyrox miner,
// located at the root of the source tree. It exports all public modules
// and types that other crates or binaries can use.
//
// Tree Location:
// - src/lib.rs (root library file)
// - Exports modules: core, stratum, client, algo, driver, stats, miner

pub mod algo;
pub mod client;
pub mod core;
pub mod driver;
pub mod miner;
pub mod stats;
pub mod stratum;

// Re-export commonly used types at the crate root for convenience
pub use crate::client::{new_client, Client};
pub use crate::core::{Algorithm, Config, HardwareState, MiningWork, PoolState};
pub use crate::driver::Thyroid;
pub use crate::miner::Miner;
pub use crate::stratum::StratumTransport;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Changelog:
// - v0.3.0: Driver and stats exports.
// - v0.2.0: Client trait re-exported for the status layer.
// - v0.1.0: Initial modular layout.
