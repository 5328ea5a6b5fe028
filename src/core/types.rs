// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/types.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// This file defines core data structures for the thyrox miner, located in the
// core subdirectory. It includes types for command-line arguments, the rig
// configuration file, pool/driver lifecycle states, status snapshots, and the
// work/nonce types exchanged between pool clients and the Thyroid driver.
//
// Tree Location:
// - src/core/types.rs (core data structures)
// - Depends on: clap, serde

use crate::core::bytes::ExtraNonce2;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Command-line arguments for the thyrox miner
#[derive(Parser, Debug)]
#[command(
    name = "thyrox",
    version,
    about = "Control plane for AGPF-style FPGA mining rigs",
    long_about = "Thyrox keeps one or more FPGA boards on a shared UART supplied with fresh\n\
                  pool work, collects candidate nonces, validates them and submits shares.\n\n\
                  Configuration lives in a JSON file (default: thyrox.json) with the classic\n\
                  rig keys: device, baudrate, muxnum, polldelay, noncetimeout, the pin\n\
                  groups and the pools array.\n\n\
                  Examples:\n\
                    Mining:    thyrox --cfg /opt/scripta/etc/thyrox.json\n\
                    Test mode: thyrox --test"
)]
pub struct Args {
    /// Path to the JSON config file
    #[arg(
        long = "cfg",
        value_name = "PATH",
        default_value = "thyrox.json",
        help = "Config file path (JSON)"
    )]
    pub cfg: String,

    /// Build a test header packet instead of mining
    #[arg(long, default_value = "false", help = "Test mode, build test header packet")]
    pub test: bool,
}

/// Mining algorithms the FPGA bitstreams implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Odocrypt,
    Skunk,
    Ckb,
    Trb,
    Veo,
    Verus,
    Xdag,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Odocrypt => "odocrypt",
            Algorithm::Skunk => "skunk",
            Algorithm::Ckb => "ckb",
            Algorithm::Trb => "trb",
            Algorithm::Veo => "veo",
            Algorithm::Verus => "verus",
            Algorithm::Xdag => "xdag",
        }
    }

    /// Weight applied to each golden nonce when feeding the hashrate ring.
    /// Odocrypt counts pool-difficulty shares, skunk hardware reports at a
    /// 1/256 threshold, the rest count raw nonces.
    pub fn nonce_weight(&self, pool_diff: f64) -> f64 {
        match self {
            Algorithm::Odocrypt => pool_diff,
            Algorithm::Skunk => 1.0 / 256.0,
            _ => 1.0,
        }
    }

    /// Long-poll pools push work rarely; the transport watchdog allows
    /// 300 seconds of silence instead of 30.
    pub fn long_poll(&self) -> bool {
        matches!(self, Algorithm::Veo)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a stratum connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PoolState {
    NotReady = 1,
    Alive = 2,
    Sick = 3,
    Dead = 4,
}

impl PoolState {
    pub fn from_u8(v: u8) -> PoolState {
        match v {
            2 => PoolState::Alive,
            3 => PoolState::Sick,
            4 => PoolState::Dead,
            _ => PoolState::NotReady,
        }
    }
}

/// Lifecycle of the FPGA driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum HardwareState {
    Programming = 1,
    Running = 2,
    NoResponse = 3,
    Stopped = 4,
}

impl HardwareState {
    pub fn from_u8(v: u8) -> HardwareState {
        match v {
            1 => HardwareState::Programming,
            2 => HardwareState::Running,
            3 => HardwareState::NoResponse,
            _ => HardwareState::Stopped,
        }
    }
}

/// Snapshot of one pool connection, as exposed to the status surface
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub status: PoolState,
    pub user: String,
    #[serde(rename = "pooladdr")]
    pub pool_addr: String,
    pub algo: String,
    pub accept: i32,
    pub reject: i32,
    pub discard: i32,
    pub diff: f64,
    #[serde(rename = "lastaccepted")]
    pub last_accepted: i64,
    pub active: bool,
}

/// Snapshot of the driver, as exposed to the status surface
#[derive(Debug, Clone, Serialize)]
pub struct DriverStats {
    pub name: &'static str,
    pub status: HardwareState,
    pub temperature: String,
    pub voltage: String,
    /// Golden nonce counts over the last 1m / 5m / 60m windows
    #[serde(rename = "noncenum")]
    pub nonce_num: [f64; 3],
    /// Estimated hashrate over the same windows
    pub hashrate: [f64; 3],
    /// Per-board nonce counters
    #[serde(rename = "noncestats")]
    pub nonce_stats: HashMap<usize, u64>,
    pub algo: String,
}

/// Full miner snapshot served by the external status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MinerStatus {
    pub devs: Vec<DriverStats>,
    #[serde(rename = "minerDown")]
    pub miner_down: bool,
    #[serde(rename = "minerUp")]
    pub miner_up: bool,
    pub pools: Vec<PoolStats>,
    pub time: i64,
}

/// Generic stratum job (odocrypt, skunk): the classic notify payload
#[derive(Debug, Clone, Default)]
pub struct GeneralJob {
    pub job_id: String,
    pub prev_hash: Vec<u8>,
    pub coinbase1: Vec<u8>,
    pub coinbase2: Vec<u8>,
    pub merkle_branch: Vec<Vec<u8>>,
    pub version: Vec<u8>,
    pub nbits: Vec<u8>,
    pub ntime: Vec<u8>,
    pub clean_jobs: bool,
    pub extra_nonce2: ExtraNonce2,
}

/// CKB job: the pool hands a pow hash, the FPGA owns the last 4 nonce bytes
#[derive(Debug, Clone, Default)]
pub struct CkbJob {
    pub job_id: String,
    pub pow_hash: Vec<u8>,
    pub clean_jobs: bool,
    pub extra_nonce2: ExtraNonce2,
}

/// TRB job: keccak challenge plus the pool payout address; share check is
/// modular against jdiff
#[derive(Debug, Clone, Default)]
pub struct TrbJob {
    pub job_id: String,
    pub challenge: Vec<u8>,
    pub pool_addr: Vec<u8>,
    pub jdiff: i64,
    pub clean_jobs: bool,
}

/// VEO job: a base64 block hash doubles as the job id
#[derive(Debug, Clone, Default)]
pub struct VeoJob {
    pub job_id: String,
    pub block_hash: String,
}

/// Verus job: three chained hashes plus version/ntime/nbits
#[derive(Debug, Clone, Default)]
pub struct VerusJob {
    pub job_id: String,
    pub version: Vec<u8>,
    pub hash1: Vec<u8>,
    pub hash2: Vec<u8>,
    pub hash3: Vec<u8>,
    pub nbits: Vec<u8>,
    pub ntime: Vec<u8>,
    pub clean_jobs: bool,
    pub extra_nonce2: ExtraNonce2,
}

/// Opaque job handle travelling with every piece of work. The driver never
/// looks inside; submit hands it back to the owning client.
#[derive(Debug, Clone)]
pub enum Job {
    General(GeneralJob),
    Ckb(CkbJob),
    Trb(TrbJob),
    Veo(VeoJob),
    Verus(VerusJob),
    Xdag,
}

impl Job {
    pub fn job_id(&self) -> &str {
        match self {
            Job::General(j) => &j.job_id,
            Job::Ckb(j) => &j.job_id,
            Job::Trb(j) => &j.job_id,
            Job::Veo(j) => &j.job_id,
            Job::Verus(j) => &j.job_id,
            Job::Xdag => "",
        }
    }
}

/// One unit of work handed to the driver. Immutable once emitted; the header
/// length is algorithm specific (80+32 generic, 44 CKB pre-nonce, 48 VEO
/// pre-pad, 1487 Verus).
#[derive(Debug, Clone)]
pub struct MiningWork {
    pub header: Vec<u8>,
    pub offset: usize,
    pub target: [u8; 32],
    pub difficulty: f64,
    pub job: Job,
}

/// A nonce record parsed out of the UART stream. The board job id correlates
/// it with cached work; zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleNonce {
    pub job_id: u8,
    pub nonce: [u8; 8],
}

/// One upstream pool entry from the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub pass: String,
    pub algo: Algorithm,
    #[serde(default)]
    pub active: bool,
}

impl PoolConfig {
    /// Strips the scheme prefix, leaving host:port for the dialer
    pub fn host(&self) -> &str {
        self.url.trim_start_matches("stratum+tcp://")
    }
}

fn default_device() -> String {
    "/dev/ttyAMA0".to_string()
}
fn default_baudrate() -> u32 {
    115_200
}
fn default_driver() -> String {
    "thyroid".to_string()
}
fn default_muxnum() -> usize {
    1
}
fn default_polldelay() -> u64 {
    60
}
fn default_noncetimeout() -> u64 {
    1000
}
fn default_debug() -> String {
    "error".to_string()
}
fn default_uartio() -> Vec<u64> {
    vec![5, 4, 3, 2]
}
fn default_jtagio() -> Vec<u64> {
    vec![26, 25, 24, 6]
}
fn default_resetio() -> Vec<u64> {
    vec![13, 12, 19, 18]
}
fn default_graymapping() -> Vec<u8> {
    vec![0, 3, 2, 6, 7, 5, 4, 12, 13, 15, 14, 10, 11]
}

/// Rig configuration, read from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial device path, or "@host:port" for a TCP tunneled UART
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_baudrate")]
    pub baudrate: u32,

    /// Driver selection; only "thyroid" is implemented
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Number of boards sharing the UART behind the mux
    #[serde(default = "default_muxnum")]
    pub muxnum: usize,

    /// Minimum milliseconds spent per scheduler tick
    #[serde(default = "default_polldelay")]
    pub polldelay: u64,

    /// Milliseconds a board may chew on one job before it gets fresh work
    #[serde(default = "default_noncetimeout")]
    pub noncetimeout: u64,

    /// Log level: debug, info or error
    #[serde(default = "default_debug")]
    pub debug: String,

    /// Console mux pins, most significant first
    #[serde(default = "default_uartio")]
    pub uartio: Vec<u64>,

    /// JTAG mux pins
    #[serde(default = "default_jtagio")]
    pub jtagio: Vec<u64>,

    /// Reset mux pins
    #[serde(default = "default_resetio")]
    pub resetio: Vec<u64>,

    /// Physical slot layout; informational
    #[serde(default)]
    pub slot: Vec<usize>,

    /// 1-based slots the scheduler must never feed
    #[serde(default)]
    pub skipslots: Vec<usize>,

    /// Board index to mux code table
    #[serde(default = "default_graymapping")]
    pub graymapping: Vec<u8>,

    #[serde(default)]
    pub pools: Vec<PoolConfig>,

    #[serde(default)]
    pub test: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: default_device(),
            baudrate: default_baudrate(),
            driver: default_driver(),
            muxnum: default_muxnum(),
            polldelay: default_polldelay(),
            noncetimeout: default_noncetimeout(),
            debug: default_debug(),
            uartio: default_uartio(),
            jtagio: default_jtagio(),
            resetio: default_resetio(),
            slot: Vec::new(),
            skipslots: Vec::new(),
            graymapping: default_graymapping(),
            pools: Vec::new(),
            test: false,
        }
    }
}

impl Config {
    /// Load the config from a JSON file, falling back to built-in defaults
    /// when the file is missing
    pub fn load(path: &str) -> crate::Result<Config> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!("No config file found. Using built-in defaults.");
                Ok(Config::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Index of the active pool; first entry when none is marked
    pub fn active_pool_index(&self) -> usize {
        self.pools.iter().position(|p| p.active).unwrap_or(0)
    }

    /// Validate the parts a typo would silently break
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("No pools configured. Add a pools[] entry with url, user and algo".to_string());
        }
        for pool in &self.pools {
            if !pool.host().contains(':') && pool.algo != Algorithm::Xdag {
                return Err(format!("Pool url must be host:port, got: {}", pool.url));
            }
        }
        if self.driver != "thyroid" {
            return Err(format!("Unknown driver: {}", self.driver));
        }
        if self.muxnum == 0 {
            return Err("muxnum must be at least 1".to_string());
        }
        if self.muxnum > 1 && self.graymapping.len() <= self.muxnum {
            return Err("graymapping must cover every board index".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.device, "/dev/ttyAMA0");
        assert_eq!(cfg.baudrate, 115_200);
        assert_eq!(cfg.muxnum, 1);
        assert_eq!(cfg.polldelay, 60);
        assert_eq!(cfg.noncetimeout, 1000);
        assert_eq!(cfg.uartio, vec![5, 4, 3, 2]);
        assert_eq!(cfg.graymapping[7], 12);
    }

    #[test]
    fn test_pool_config_parse() {
        let raw = r#"{
            "pools": [
                {"url": "stratum+tcp://ckb.example.com:4300", "user": "ckb1qyq.1", "pass": "x", "algo": "ckb", "active": true},
                {"url": "stratum+tcp://skunk.example.com:3362", "user": "worker", "algo": "skunk"}
            ]
        }"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.pools.len(), 2);
        assert_eq!(cfg.pools[0].algo, Algorithm::Ckb);
        assert_eq!(cfg.pools[0].host(), "ckb.example.com:4300");
        assert!(!cfg.pools[1].active);
        assert_eq!(cfg.active_pool_index(), 0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_pools() {
        let cfg = Config::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_algorithm_round_trip() {
        for algo in [
            Algorithm::Odocrypt,
            Algorithm::Skunk,
            Algorithm::Ckb,
            Algorithm::Trb,
            Algorithm::Veo,
            Algorithm::Verus,
            Algorithm::Xdag,
        ] {
            let json = serde_json::to_string(&algo).unwrap();
            assert_eq!(json, format!("\"{}\"", algo.as_str()));
            let back: Algorithm = serde_json::from_str(&json).unwrap();
            assert_eq!(back, algo);
        }
    }
}

// Changelog:
// - v0.3.0: Added skipslots and graymapping keys, moved the gray table out of
//   the board module and into config.
// - v0.2.0: TCP tunnel device syntax, per-family job payloads in the Job enum.
// - v0.1.0: Initial config surface and pool/driver states.
