// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/skunk.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Skunk adapter. The fabric resumes from an 80-byte midstate blob: 64 bytes
// of first-block state plus the 16-byte p0p1 tail. Both halves go out
// byte-reversed per word.
//
// Tree Location:
// - src/algo/skunk.rs (skunk adapter)
// - Depends on: algo, core

use crate::algo::{push_job_id, push_reg, MiningFuncs};
use crate::core::bytes::rev_bytes;
use crate::core::difficulty::hash_meets_target;
use crate::core::primitives::skunk_midstate;
use crate::core::MiningWork;

const ADDR_MIDSTATE_0: usize = 0x40;
const ADDR_MIDSTATE_F: usize = 0x4F;
const ADDR_BLOCK_W01: usize = 0x19;
const ADDR_BLOCK_W04: usize = 0x1C;

/// Trailing write the bitstream wants after the job id
const TERMINATOR: [u8; 6] = [0x06, 0x1C, 0x00, 0x00, 0x00, 0x00];

const FULL_INPUT_LEN: usize = 120;

pub struct SkunkFuncs;

impl MiningFuncs for SkunkFuncs {
    fn regen_hash(&self, input: &[u8]) -> Vec<u8> {
        if input.len() < 88 {
            return vec![0xFF; 32];
        }
        // first 76 reversed-domain header bytes plus the solved nonce word
        let mut header = input[..76].to_vec();
        header.extend_from_slice(&rev_bytes(&input[116..120]));
        rev_bytes(&crate::core::primitives::skunk_hash(&header))
    }

    fn diff_check(&self, hash: &[u8], work: &MiningWork) -> bool {
        hash_meets_target(hash, &work.target)
    }

    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8> {
        let midstate_blob = skunk_midstate(header);
        let midstates = &midstate_blob[..64];
        let p0p1 = &midstate_blob[64..];

        let mut packet = Vec::with_capacity(6 * 22);
        for addr in ADDR_MIDSTATE_0..=ADDR_MIDSTATE_F {
            let cursor = (addr - ADDR_MIDSTATE_0) * 4;
            push_reg(&mut packet, addr, &rev_bytes(&midstates[cursor..cursor + 4]));
        }
        for addr in ADDR_BLOCK_W01..=ADDR_BLOCK_W04 {
            let cursor = (addr - ADDR_BLOCK_W01) * 4;
            push_reg(&mut packet, addr, &rev_bytes(&p0p1[cursor..cursor + 4]));
        }
        push_job_id(&mut packet, board_job_id);
        packet.extend_from_slice(&TERMINATOR);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_program_layout() {
        let header = vec![0x5Au8; 112];
        let packet = SkunkFuncs.construct_header_packets(&header, 3);
        // 16 midstate words, 4 p0p1 words, job id, terminator: 22 frames
        assert_eq!(packet.len(), 6 * 22);
        assert_eq!(packet[1], 0x40);
        // p0p1 words land at 0x19..0x1C
        assert_eq!(packet[6 * 16 + 1], 0x19);
        assert_eq!(packet[6 * 19 + 1], 0x1C);
        assert_eq!(&packet[6 * 20..6 * 21], &[0x06, 0x30, 0x89, 0xAB, 0xCD, 3]);
        assert_eq!(&packet[6 * 21..], &TERMINATOR);
    }

    #[test]
    fn test_p0p1_words_are_reversed_header_tail() {
        let mut header = vec![0u8; 112];
        for (i, b) in header.iter_mut().enumerate() {
            *b = i as u8;
        }
        let packet = SkunkFuncs.construct_header_packets(&header, 1);
        // first p0p1 frame carries header[64..68] reversed
        assert_eq!(&packet[6 * 16 + 2..6 * 16 + 6], &[67, 66, 65, 64]);
    }

    #[test]
    fn test_regen_short_input_is_sentinel() {
        assert_eq!(SkunkFuncs.regen_hash(&[0u8; 16]), vec![0xFF; 32]);
    }

    #[test]
    fn test_diff_check_is_strict_compare() {
        let work = MiningWork {
            header: Vec::new(),
            offset: 0,
            target: {
                let mut t = [0u8; 32];
                t[2] = 0x10;
                t
            },
            difficulty: 1.0,
            job: crate::core::Job::Xdag,
        };
        let mut below = [0u8; 32];
        below[3] = 0xFF;
        let mut above = [0u8; 32];
        above[1] = 0x01;
        assert!(SkunkFuncs.diff_check(&below, &work));
        assert!(!SkunkFuncs.diff_check(&above, &work));
        assert!(!SkunkFuncs.diff_check(&work.target.clone(), &work));
    }
}

// Changelog:
// - v0.2.0: Midstate split through the primitives leaf.
// - v0.1.0: Initial skunk register program.
