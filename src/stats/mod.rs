// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/stats/mod.rs
// Version: 0.1.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Statistics kept by the driver.
//
// Tree Location:
// - src/stats/mod.rs (stats module entry point)
// - Submodules: hashrate

pub mod hashrate;

pub use hashrate::HashRate;
