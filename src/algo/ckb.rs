// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/ckb.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// CKB adapter. The board resumes the eaglesong sponge from the midstate of
// the 32-byte pow hash; the 12-byte extranonce tail rides along in the
// block registers with the last word reserved for the fabric's own nonce.
//
// Tree Location:
// - src/algo/ckb.rs (CKB adapter)
// - Depends on: algo, core

use crate::algo::{push_job_id, push_reg, push_test_mode, MiningFuncs, NonceFraming};
use crate::core::bytes::rev_bytes;
use crate::core::difficulty::hash_meets_target;
use crate::core::primitives::{eaglesong_hash, eaglesong_midstate, sha256};
use crate::core::MiningWork;

const ADDR_BLOCK_W8: usize = 0x20;
const ADDR_MIDSTATE_0: usize = 0x40;

const NONCE_LEN: usize = 4;
const HEADER_LEN: usize = 48 - NONCE_LEN;

pub struct CkbFuncs;

impl MiningFuncs for CkbFuncs {
    fn regen_hash(&self, input: &[u8]) -> Vec<u8> {
        if input.len() < 52 {
            // harmless sentinel that can never carry three zero bytes
            return sha256(&[0]).to_vec();
        }
        let mut full_header = input[..44].to_vec();
        full_header.extend_from_slice(&rev_bytes(&input[48..52]));
        eaglesong_hash(&full_header).to_vec()
    }

    fn diff_check(&self, hash: &[u8], work: &MiningWork) -> bool {
        hash_meets_target(hash, &work.target)
    }

    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8> {
        assert_eq!(
            header.len(),
            HEADER_LEN,
            "Unable to ConstructHeaderPackets, Header: {}",
            hex::encode_upper(header)
        );
        // the 12 counter bytes past the pow hash; the final 4 are reserved
        let tail = &header[32..32 + 16 - 4];

        let mut packet = Vec::with_capacity(6 * 21);
        let mut addr = ADDR_BLOCK_W8;
        for word in tail.chunks_exact(4) {
            push_reg(&mut packet, addr, word);
            addr += 1;
        }

        let midstate = rev_bytes(&eaglesong_midstate(&header[..32]));
        let mut addr = ADDR_MIDSTATE_0;
        for word in midstate.chunks_exact(4) {
            push_reg(&mut packet, addr, word);
            addr += 1;
        }

        push_job_id(&mut packet, board_job_id);
        push_test_mode(&mut packet);
        packet
    }

    fn nonce_framing(&self) -> NonceFraming {
        NonceFraming::Marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regen_matches_eaglesong_of_patched_header() {
        // 44-byte pre-nonce header plus the hardware's 8-byte nonce record;
        // the significant word sits in the high half, little endian
        let mut input = Vec::new();
        input.extend_from_slice(
            &hex::decode("d5a74fba920ad0d35ec5726f26327547cbc82180e356e5ccf6cf2e6bd75f8a6600c904bd0000000000000000")
                .unwrap(),
        );
        assert_eq!(input.len(), HEADER_LEN);
        input.extend_from_slice(&[0, 0, 0, 0, 0x26, 0x40, 0x11, 0x00]);
        let hash = CkbFuncs.regen_hash(&input);
        let expected = eaglesong_hash(
            &hex::decode("d5a74fba920ad0d35ec5726f26327547cbc82180e356e5ccf6cf2e6bd75f8a6600c904bd0000000000114026")
                .unwrap(),
        );
        assert_eq!(hash, expected.to_vec());
    }

    #[test]
    fn test_packet_program_layout() {
        let header = vec![0x11u8; HEADER_LEN];
        let packet = CkbFuncs.construct_header_packets(&header, 0x42);
        // 3 tail words, 16 midstate words, job id, test mode: 21 frames
        assert_eq!(packet.len(), 6 * 21);
        assert_eq!(packet[1], 0x20);
        assert_eq!(packet[6 + 1], 0x21);
        assert_eq!(packet[12 + 1], 0x22);
        assert_eq!(packet[18 + 1], 0x40);
        assert_eq!(
            &packet[6 * 19..6 * 20],
            &[0x06, 0x30, 0x89, 0xAB, 0xCD, 0x42]
        );
        assert_eq!(&packet[6 * 20..], &[0x06, 0x81, 0, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "Unable to ConstructHeaderPackets")]
    fn test_wrong_header_length_panics() {
        CkbFuncs.construct_header_packets(&[0u8; 40], 1);
    }
}

// Changelog:
// - v0.2.0: Midstate resume; marker framing.
// - v0.1.0: Initial CKB register program.
