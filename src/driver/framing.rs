// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/driver/framing.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Nonce frame parsers for the UART return path, written as tokio-util
// decoders so the driver just consumes a stream of SingleNonce whatever the
// bitstream dialect. Two shapes exist in the wild:
//
//   legacy:  <8 x 00> <count> { <jobid> <nonce[8]> } x count
//   marker:  <89 AB CD> <jobid> <nonce_le[4]>
//
// Records tagged with job id zero are noise and never surface.
//
// Tree Location:
// - src/driver/framing.rs (UART nonce decoders)
// - Depends on: tokio-util, bytes, algo, core

use crate::algo::{NonceFraming, JOB_ID_MARKER};
use crate::core::SingleNonce;
use bytes::{Buf, BytesMut};
use std::collections::VecDeque;
use tokio_util::codec::Decoder;

/// Cap on garbage we keep around while hunting for a frame start
const SCAN_BACKLOG: usize = 4096;

#[derive(Default)]
pub struct LegacyNonceCodec {
    queue: VecDeque<SingleNonce>,
}

impl Decoder for LegacyNonceCodec {
    type Item = SingleNonce;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SingleNonce>, Self::Error> {
        loop {
            if let Some(nonce) = self.queue.pop_front() {
                return Ok(Some(nonce));
            }
            if src.len() < 9 {
                return Ok(None);
            }

            let data = &src[..];
            let mut preamble = None;
            for index in 0..data.len() - 8 {
                if data[index..index + 8].iter().all(|&b| b == 0) {
                    preamble = Some(index);
                    break;
                }
            }
            let Some(index) = preamble else {
                // no preamble anywhere; keep a tail in case one straddles
                if src.len() > SCAN_BACKLOG {
                    let drop = src.len() - 7;
                    src.advance(drop);
                }
                return Ok(None);
            };

            let count = data[index + 8] as usize;
            let frame_end = index + 9 + count * 9;
            if data.len() < frame_end {
                // waiting for more data
                return Ok(None);
            }
            if count > 0 && data[index + 9] == 0 {
                // jobid is never zero; this preamble was part of the payload
                src.advance(1);
                continue;
            }
            for record in data[index + 9..frame_end].to_vec().chunks_exact(9) {
                if record[0] == 0 {
                    continue;
                }
                let mut nonce = [0u8; 8];
                nonce.copy_from_slice(&record[1..9]);
                self.queue.push_back(SingleNonce {
                    job_id: record[0],
                    nonce,
                });
            }
            src.advance(frame_end);
        }
    }
}

#[derive(Default)]
pub struct MarkerNonceCodec;

impl Decoder for MarkerNonceCodec {
    type Item = SingleNonce;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SingleNonce>, Self::Error> {
        loop {
            if src.len() < JOB_ID_MARKER.len() + 5 {
                return Ok(None);
            }
            let data = &src[..];
            let mut marker = None;
            for index in 0..=data.len() - JOB_ID_MARKER.len() {
                if data[index..index + 3] == JOB_ID_MARKER {
                    marker = Some(index);
                    break;
                }
            }
            let Some(index) = marker else {
                // drop scanned garbage, keep a possible partial marker
                let drop = src.len() - 2;
                src.advance(drop);
                return Ok(None);
            };
            if data.len() < index + 8 {
                src.advance(index);
                return Ok(None);
            }
            let job_id = data[index + 3];
            let mut nonce = [0u8; 8];
            // the wire word is little endian; store it reversed in the high
            // half so the regen path sees one uniform layout
            for (i, b) in data[index + 4..index + 8].iter().enumerate() {
                nonce[7 - i] = *b;
            }
            src.advance(index + 8);
            if job_id == 0 {
                continue;
            }
            return Ok(Some(SingleNonce { job_id, nonce }));
        }
    }
}

/// The decoder matching an adapter's declared framing
pub enum NonceCodec {
    Legacy(LegacyNonceCodec),
    Marker(MarkerNonceCodec),
}

impl NonceCodec {
    pub fn for_framing(framing: NonceFraming) -> Self {
        match framing {
            NonceFraming::Legacy => NonceCodec::Legacy(LegacyNonceCodec::default()),
            NonceFraming::Marker => NonceCodec::Marker(MarkerNonceCodec),
        }
    }
}

impl Decoder for NonceCodec {
    type Item = SingleNonce;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SingleNonce>, Self::Error> {
        match self {
            NonceCodec::Legacy(c) => c.decode(src),
            NonceCodec::Marker(c) => c.decode(src),
        }
    }
}


// Changelog:
// - v0.2.0: Decoders replace the hand-rolled split functions; framing picked
//   by the adapter, not the driver.
// - v0.1.0: Legacy preamble parser.
