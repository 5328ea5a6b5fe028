// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/xdag.rs
// Version: 0.1.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// XDAG adapter. The helper daemon already delivers a ready-made register
// program, so the header passes through untouched; we only tag it and seed
// the two counter registers with fresh entropy.
//
// Tree Location:
// - src/algo/xdag.rs (XDAG adapter)
// - Depends on: algo, core, rand

use crate::algo::{push_job_id, push_reg, MiningFuncs, SubmitPayload};
use crate::core::MiningWork;
use rand::RngCore;

const ADDR_INIT_CNT0: usize = 0x28;
const ADDR_INIT_CNT1: usize = 0x29;

pub struct XdagFuncs;

impl MiningFuncs for XdagFuncs {
    fn regen_hash(&self, _input: &[u8]) -> Vec<u8> {
        vec![0x00, 0x00, 0x00, 0x00]
    }

    fn diff_check(&self, _hash: &[u8], _work: &MiningWork) -> bool {
        true
    }

    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8> {
        let mut packet = header.to_vec();
        push_job_id(&mut packet, board_job_id);

        let mut rng = rand::thread_rng();
        let mut seed = [0u8; 4];
        rng.fill_bytes(&mut seed);
        push_reg(&mut packet, ADDR_INIT_CNT0, &seed);
        rng.fill_bytes(&mut seed);
        push_reg(&mut packet, ADDR_INIT_CNT1, &seed);
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
    fn test_header_passes_through_with_tag_and_seeds() {
        let header = vec![0x06, 0x10, 0x65, 0x68, 0x36, 0x91];
        let packet = XdagFuncs.construct_header_packets(&header, 0x3C);
        assert_eq!(&packet[..6], &header[..]);
        assert_eq!(&packet[6..12], &[0x06, 0x30, 0x89, 0xAB, 0xCD, 0x3C]);
        assert_eq!(packet[12], 0x06);
        assert_eq!(packet[13], 0x28);
        assert_eq!(packet[18], 0x06);
        assert_eq!(packet[19], 0x29);
        assert_eq!(packet.len(), header.len() + 18);
    }
}
