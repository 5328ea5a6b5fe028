// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/veo.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Amoveo adapter. Header registers fill top-down while the header walks up,
// the fabric resumes sha256 from a 12-round midstate, and difficulty is a
// leading-bits score rather than a byte compare.
//
// Tree Location:
// - src/algo/veo.rs (VEO adapter)
// - Depends on: algo, core

use crate::algo::{push_job_id, push_reg, MiningFuncs, SubmitPayload};
use crate::core::primitives::{sha256, sha256_midstate12};
use crate::core::MiningWork;

const ADDR_BLOCK_W15: usize = 0x27;
const ADDR_MIDSTATE_7: usize = 0x47;

const NONCE_LEN: usize = 7;
const HEADER_LEN: usize = 55 - NONCE_LEN;

/// Score a hash by its leading zero bits plus the byte after them; shares
/// must score at least the pool difficulty
pub fn veo_hash_score(hash: &[u8]) -> i64 {
    let mut x = 0u32;
    let mut z = 0u32;
    for i in 0..31 {
        let b = hash[i] as u32;
        let next = hash[i + 1] as u32;
        if b == 0 {
            x += 8;
            continue;
        } else if b < 2 {
            x += 7;
            z = next;
        } else if b < 4 {
            x += 6;
            z = (next / 2) + ((b % 2) * 128);
        } else if b < 8 {
            x += 5;
            z = (next / 4) + ((b % 4) * 64);
        } else if b < 16 {
            x += 4;
            z = (next / 8) + ((b % 8) * 32);
        } else if b < 32 {
            x += 3;
            z = (next / 16) + ((b % 16) * 16);
        } else if b < 64 {
            x += 2;
            z = (next / 32) + ((b % 32) * 8);
        } else if b < 128 {
            x += 1;
            z = (next / 64) + ((b % 64) * 4);
        } else {
            z = (next / 128) + ((b % 128) * 2);
        }
        break;
    }
    (256 * x + z) as i64
}

pub struct VeoFuncs;

impl MiningFuncs for VeoFuncs {
    fn regen_hash(&self, input: &[u8]) -> Vec<u8> {
        if input.len() < 56 {
            return sha256(&[0]).to_vec();
        }
        // byte 48 is dead padding the fabric skips
        let mut packed = Vec::with_capacity(55);
        packed.extend_from_slice(&input[..48]);
        packed.extend_from_slice(&input[49..56]);
        sha256(&packed).to_vec()
    }

    fn diff_check(&self, hash: &[u8], work: &MiningWork) -> bool {
        veo_hash_score(hash) >= work.difficulty as i64
    }

    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8> {
        assert_eq!(header.len(), HEADER_LEN, "Unable to ConstructHeaderPackets");
        let mut padded = header.to_vec();
        padded.extend_from_slice(&[0u8; 8]);

        let mut packet = Vec::with_capacity(6 * 21);
        let mut addr = ADDR_BLOCK_W15;
        for word in padded[..48].chunks_exact(4) {
            push_reg(&mut packet, addr, word);
            addr -= 1;
        }

        let midstate = sha256_midstate12(&padded[..56]);
        let mut addr = ADDR_MIDSTATE_7;
        for word in midstate.chunks_exact(4) {
            push_reg(&mut packet, addr, word);
            addr -= 1;
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
    fn test_hash_score_counts_leading_zero_bits() {
        let mut hash = [0u8; 32];
        hash[0] = 0x80;
        assert_eq!(veo_hash_score(&hash), 0);

        // one zero byte then 0x01: 8 + 7 leading zero bits
        hash[0] = 0x00;
        hash[1] = 0x01;
        hash[2] = 0x00;
        assert_eq!(veo_hash_score(&hash), 256 * 15);

        let all_zero = [0u8; 32];
        // 31 zero bytes scanned, 8 bits each
        assert_eq!(veo_hash_score(&all_zero), 256 * 248);
    }

    #[test]
    fn test_diff_check_uses_score() {
        let mut hash = [0u8; 32];
        hash[3] = 0x01;
        let score = veo_hash_score(&hash);
        let work = |d: f64| MiningWork {
            header: Vec::new(),
            offset: 0,
            target: [0u8; 32],
            difficulty: d,
            job: crate::core::Job::Xdag,
        };
        assert!(VeoFuncs.diff_check(&hash, &work(score as f64)));
        assert!(!VeoFuncs.diff_check(&hash, &work(score as f64 + 1.0)));
    }

    #[test]
    fn test_packet_addresses_descend() {
        let header = vec![0xC3u8; HEADER_LEN];
        let packet = VeoFuncs.construct_header_packets(&header, 0x11);
        // 12 block words, 8 midstate words, job id: 21 frames
        assert_eq!(packet.len(), 6 * 21);
        assert_eq!(packet[1], 0x27);
        assert_eq!(packet[6 + 1], 0x26);
        assert_eq!(packet[6 * 11 + 1], 0x1C);
        assert_eq!(packet[6 * 12 + 1], 0x47);
        assert_eq!(packet[6 * 19 + 1], 0x40);
        assert_eq!(
            &packet[6 * 20..],
            &[0x06, 0x30, 0x89, 0xAB, 0xCD, 0x11]
        );
    }

    #[test]
    fn test_regen_skips_pad_byte() {
        let mut input = vec![0u8; 56];
        for (i, b) in input.iter_mut().enumerate() {
            *b = i as u8;
        }
        let direct = {
            let mut packed = input[..48].to_vec();
            packed.extend_from_slice(&input[49..56]);
            sha256(&packed).to_vec()
        };
        assert_eq!(VeoFuncs.regen_hash(&input), direct);
    }
}

// Changelog:
// - v0.2.0: Full-header submit payload; score helper exposed for the client.
// - v0.1.0: Initial VEO adapter.
