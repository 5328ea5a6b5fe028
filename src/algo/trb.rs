// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/trb.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// TRB adapter. The pow is keccak256 then ripemd160 then sha256, and shares
// are judged by a modular rule: hash mod jdiff must not exceed
// jdiff / pool_difficulty.
//
// Tree Location:
// - src/algo/trb.rs (TRB adapter)
// - Depends on: algo, core

use crate::algo::{push_job_id, push_reg, push_test_mode, MiningFuncs};
use crate::core::difficulty::U256;
use crate::core::primitives::{keccak256, ripemd160, sha256};
use crate::core::{Job, MiningWork};

const ADDR_BLOCK_W00: usize = 0x18;

pub struct TrbFuncs;

impl MiningFuncs for TrbFuncs {
    fn regen_hash(&self, input: &[u8]) -> Vec<u8> {
        if input.len() < 52 + 16 {
            return sha256(&[0]).to_vec();
        }
        sha256(&ripemd160(&keccak256(input))).to_vec()
    }

    fn diff_check(&self, hash: &[u8], work: &MiningWork) -> bool {
        let Job::Trb(job) = &work.job else {
            return false;
        };
        if job.jdiff <= 0 || work.difficulty < 1.0 {
            return false;
        }
        let hash_int = U256::from_big_endian(&hash[..32.min(hash.len())]);
        let jdiff = U256::from(job.jdiff as u64);
        let remainder = (hash_int % jdiff).low_u64();
        // the pool difficulty truncates to an integer before the division
        let compare_r = job.jdiff / (work.difficulty as i64);
        remainder <= compare_r as u64
    }

    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8> {
        let mut packet = Vec::with_capacity(6 * 6);
        let mut addr = ADDR_BLOCK_W00;
        for word in header[..16].chunks_exact(4) {
            push_reg(&mut packet, addr, word);
            addr += 1;
        }
        push_job_id(&mut packet, board_job_id);
        push_test_mode(&mut packet);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TrbJob;

    fn work_with_jdiff(jdiff: i64, difficulty: f64) -> MiningWork {
        MiningWork {
            header: Vec::new(),
            offset: 0,
            target: [0u8; 32],
            difficulty,
            job: Job::Trb(TrbJob {
                job_id: "t".into(),
                challenge: vec![0; 32],
                pool_addr: vec![0; 20],
                jdiff,
                clean_jobs: false,
            }),
        }
    }

    #[test]
    fn test_modular_check() {
        // hash value 1000, jdiff 100: remainder 0, passes any difficulty
        let mut hash = [0u8; 32];
        hash[30] = 0x03;
        hash[31] = 0xE8;
        assert!(TrbFuncs.diff_check(&hash, &work_with_jdiff(100, 10.0)));

        // hash value 1037: remainder 37 against compare 100/10 = 10
        hash[30] = 0x04;
        hash[31] = 0x0D;
        assert!(!TrbFuncs.diff_check(&hash, &work_with_jdiff(100, 10.0)));
        // an easier pool difficulty lets the same remainder through
        assert!(TrbFuncs.diff_check(&hash, &work_with_jdiff(100, 2.0)));
    }

    #[test]
    fn test_fractional_difficulty_truncates_before_dividing() {
        // hash value 1030: remainder 30 against jdiff 100
        let mut hash = [0u8; 32];
        hash[30] = 0x04;
        hash[31] = 0x06;
        // difficulty 3.9 truncates to 3, so the bound is 100/3 = 33
        assert!(TrbFuncs.diff_check(&hash, &work_with_jdiff(100, 3.9)));
        // remainder 37 sits above that bound
        hash[31] = 0x0D;
        assert!(!TrbFuncs.diff_check(&hash, &work_with_jdiff(100, 3.9)));
    }

    #[test]
    fn test_degenerate_jobs_never_pass() {
        let hash = [0u8; 32];
        assert!(!TrbFuncs.diff_check(&hash, &work_with_jdiff(0, 10.0)));
        assert!(!TrbFuncs.diff_check(&hash, &work_with_jdiff(100, 0.0)));
    }

    #[test]
    fn test_packet_program_layout() {
        let header = (0u8..52).collect::<Vec<_>>();
        let packet = TrbFuncs.construct_header_packets(&header, 9);
        // 4 header words, job id, test mode: 6 frames
        assert_eq!(packet.len(), 6 * 6);
        assert_eq!(packet[1], 0x18);
        assert_eq!(&packet[2..6], &[0, 1, 2, 3]);
        assert_eq!(packet[6 * 3 + 1], 0x1B);
        assert_eq!(&packet[6 * 4..6 * 5], &[0x06, 0x30, 0x89, 0xAB, 0xCD, 9]);
    }

    #[test]
    fn test_regen_pipeline_shape() {
        let input = vec![0xABu8; 76];
        let hash = TrbFuncs.regen_hash(&input);
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, sha256(&ripemd160(&keccak256(&input))).to_vec());
    }
}

// Changelog:
// - v0.2.1: Pool difficulty truncates to an integer before the modular
//   bound is derived.
// - v0.2.0: jdiff check reads the job payload instead of a side channel.
// - v0.1.0: Initial TRB adapter.
