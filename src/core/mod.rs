// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/mod.rs
// Version: 0.1.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Module declaration for the core building blocks: shared types, target
// math, byte codecs and hash primitives.
//
// Tree Location:
// - src/core/mod.rs (core module entry point)
// - Submodules: types, difficulty, bytes, primitives

pub mod bytes;
pub mod difficulty;
pub mod primitives;
pub mod types;

// Re-export the types everything else touches constantly
pub use difficulty::{difficulty_to_target, hash_meets_target, target_to_difficulty, Target, U256};
pub use types::{
    Algorithm, Args, Config, HardwareState, Job, MiningWork, PoolConfig, PoolState, SingleNonce,
};
