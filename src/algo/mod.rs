// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/mod.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Per-algorithm adapters: how a header becomes register writes, how a
// returned nonce becomes a hash again, how that hash is judged, which UART
// framing the bitstream speaks and what the pool wants submitted. The
// driver only ever talks to the MiningFuncs trait; it contains no
// algorithm switches of its own.
//
// Tree Location:
// - src/algo/mod.rs (adapter trait + registry)
// - Submodules: odocrypt, skunk, ckb, trb, veo, verus, xdag
// - Depends on: core

pub mod ckb;
pub mod odocrypt;
pub mod skunk;
pub mod trb;
pub mod veo;
pub mod verus;
pub mod xdag;

use crate::core::{Algorithm, MiningWork};

/// Control-register write opcode; every frame on the wire is 0x06 addr b0..b3
pub const WRITE_CTRL: u8 = 0x06;
/// Register holding the job tag the board echoes back with every nonce
pub const ADDR_JOB_ID: u8 = 0x30;
/// Marker preceding the job id byte in the job-id register write, and the
/// frame sync pattern of the marker nonce protocol
pub const JOB_ID_MARKER: [u8; 3] = [0x89, 0xAB, 0xCD];

const TEST_MODE_PACKET: [u8; 6] = [0x06, 0x81, 0x00, 0x00, 0x00, 0x00];

/// Which shape of nonce frames the bitstream emits on the UART
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceFraming {
    /// 8-byte zero preamble, count byte, 9-byte records
    Legacy,
    /// 0x89ABCD sync, job id, 4-byte little-endian nonce
    Marker,
}

/// What check_and_submit hands to the pool client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPayload {
    /// the 8-byte hardware nonce
    Nonce,
    /// the full rebuilt header (veo, verus, xdag rebuild the share from it)
    FullHeader,
}

/// The three pure functions every algorithm brings, plus its wire dialect
pub trait MiningFuncs: Send + Sync {
    /// Recompute the hash of a dispatched header with its returned nonce
    fn regen_hash(&self, input: &[u8]) -> Vec<u8>;

    /// Judge a golden hash against the pool's acceptance rule
    fn diff_check(&self, hash: &[u8], work: &MiningWork) -> bool;

    /// Turn a work header into the register-write program for one board
    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8>;

    fn nonce_framing(&self) -> NonceFraming {
        NonceFraming::Legacy
    }

    fn submit_payload(&self) -> SubmitPayload {
        SubmitPayload::Nonce
    }
}

/// Adapter lookup; one instance per algorithm is all anyone needs
pub fn mining_funcs(algo: Algorithm) -> Box<dyn MiningFuncs> {
    match algo {
        Algorithm::Odocrypt => Box::new(odocrypt::OdocryptFuncs),
        Algorithm::Skunk => Box::new(skunk::SkunkFuncs),
        Algorithm::Ckb => Box::new(ckb::CkbFuncs),
        Algorithm::Trb => Box::new(trb::TrbFuncs),
        Algorithm::Veo => Box::new(veo::VeoFuncs),
        Algorithm::Verus => Box::new(verus::VerusFuncs),
        Algorithm::Xdag => Box::new(xdag::XdagFuncs),
    }
}

/// Append one 6-byte register write. Addresses above 0xFF wrap into the
/// register page the same way the hardware decodes them.
pub(crate) fn push_reg(packet: &mut Vec<u8>, addr: usize, payload: &[u8]) {
    packet.push(WRITE_CTRL);
    packet.push((addr & 0xFF) as u8);
    packet.extend_from_slice(&payload[..4]);
}

pub(crate) fn push_job_id(packet: &mut Vec<u8>, board_job_id: u8) {
    packet.push(WRITE_CTRL);
    packet.push(ADDR_JOB_ID);
    packet.extend_from_slice(&JOB_ID_MARKER);
    packet.push(board_job_id);
}

pub(crate) fn push_test_mode(packet: &mut Vec<u8>) {
    packet.extend_from_slice(&TEST_MODE_PACKET);
}


// Changelog:
// - v0.3.0: Framing and submit payload moved onto the trait so the driver
//   lost its algorithm switch.
// - v0.2.0: Registry function replaces the string-keyed map.
// - v0.1.0: Trait extraction from the odocrypt and ckb miners.
