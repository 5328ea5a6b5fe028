// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/algo/odocrypt.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Odocrypt adapter. Work arrives as the word-reversed 80-byte header with
// the 32-byte target appended; the fabric checks the target itself, so the
// host-side diff check always passes and regen only gates on the leading
// zero bytes.
//
// Tree Location:
// - src/algo/odocrypt.rs (odocrypt adapter)
// - Depends on: algo, core

use crate::algo::{push_job_id, push_reg, push_test_mode, MiningFuncs, NonceFraming};
use crate::core::bytes::{rev_bytes, rev_hash_words};
use crate::core::primitives::sha256d;
use crate::core::MiningWork;

const ADDR_HEADER_00: usize = 0x18;
const ADDR_HEADER_19: usize = 0x2B;
const ADDR_TARGET_00: usize = 0x40;
const ADDR_TARGET_07: usize = 0x47;

const WORK_HEADER_LEN: usize = 112;
const FULL_INPUT_LEN: usize = WORK_HEADER_LEN + 8;

/// Rebuild the plain 80-byte block header a solved nonce belongs to: undo
/// the word reversal and patch the nonce word in
pub fn submitted_header(reversed_header: &[u8], nonce: &[u8]) -> Vec<u8> {
    let mut plain = rev_hash_words(&reversed_header[..80]);
    plain[76..80].copy_from_slice(&nonce[4..8]);
    plain
}

pub struct OdocryptFuncs;

impl MiningFuncs for OdocryptFuncs {
    fn regen_hash(&self, input: &[u8]) -> Vec<u8> {
        if input.len() < FULL_INPUT_LEN {
            return sha256d(&[0]).to_vec();
        }
        let header = submitted_header(input, &input[WORK_HEADER_LEN..]);
        rev_bytes(&sha256d(&header))
    }

    fn diff_check(&self, _hash: &[u8], _work: &MiningWork) -> bool {
        // the dispatched target already encodes the pool difficulty
        true
    }

    fn construct_header_packets(&self, header: &[u8], board_job_id: u8) -> Vec<u8> {
        let target = &header[80..];
        let mut packet = Vec::with_capacity(6 * 30);
        for addr in ADDR_HEADER_00..=ADDR_HEADER_19 {
            let cursor = (addr - ADDR_HEADER_00) * 4;
            push_reg(&mut packet, addr, &header[cursor..cursor + 4]);
        }
        let rev_target = rev_bytes(target);
        for addr in ADDR_TARGET_00..=ADDR_TARGET_07 {
            let cursor = (addr - ADDR_TARGET_00) * 4;
            push_reg(&mut packet, addr, &rev_target[cursor..cursor + 4]);
        }
        push_test_mode(&mut packet);
        push_job_id(&mut packet, board_job_id);
        packet
    }

    fn nonce_framing(&self) -> NonceFraming {
        NonceFraming::Marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // proven solution from a live run: submitting nonce C6B1D5A6 against
    // this header replaces its last 4 bytes
    const WORK_HEADER: &str = "00000020039949A3D2755F68EB1BE7F06BC471E06DC1D0099D0AF7FB00307EB700000000D1F1022F58EF3BF019472955CB5AB02853CCB66DBDD2A77164DC46790EC31129106B2A5AB34E301B00000000";
    const SUBMITTED_HEADER: &str = "00000020039949A3D2755F68EB1BE7F06BC471E06DC1D0099D0AF7FB00307EB700000000D1F1022F58EF3BF019472955CB5AB02853CCB66DBDD2A77164DC46790EC31129106B2A5AB34E301BC6B1D5A6";

    #[test]
    fn test_proven_solution_header_rebuild() {
        let plain = hex::decode(WORK_HEADER).unwrap();
        let reversed = rev_hash_words(&plain);
        let nonce = [0, 0, 0, 0, 0xC6, 0xB1, 0xD5, 0xA6];
        let rebuilt = submitted_header(&reversed, &nonce);
        assert_eq!(hex::encode_upper(&rebuilt), SUBMITTED_HEADER);
    }

    #[test]
    fn test_packet_program_layout() {
        let mut header = rev_hash_words(&hex::decode(WORK_HEADER).unwrap());
        header.extend_from_slice(&[0xEE; 32]);
        let packet = OdocryptFuncs.construct_header_packets(&header, 7);
        // 20 header words, 8 target words, test mode, job id: 30 frames
        assert_eq!(packet.len(), 6 * 30);
        assert_eq!(packet[0], 0x06);
        assert_eq!(packet[1], 0x18);
        // header words are written unreversed
        assert_eq!(&packet[2..6], &header[0..4]);
        // target words come from the wholly reversed target
        let target_frame = &packet[6 * 20..6 * 21];
        assert_eq!(target_frame[1], 0x40);
        assert_eq!(&target_frame[2..6], &[0xEE; 4]);
        // the tail carries test mode then the tagged job id
        assert_eq!(&packet[6 * 28..6 * 29], &[0x06, 0x81, 0, 0, 0, 0]);
        assert_eq!(&packet[6 * 29..], &[0x06, 0x30, 0x89, 0xAB, 0xCD, 7]);
    }

    #[test]
    fn test_regen_short_input_is_sentinel() {
        let hash = OdocryptFuncs.regen_hash(&[0u8; 10]);
        assert_eq!(hash.len(), 32);
    }
}

// Changelog:
// - v0.2.0: Marker framing; submitted-header rebuild shared with regen.
// - v0.1.0: Initial register program.
