// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/driver/mod.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Driver layer: the serial (or TCP-tunneled) port shared by all boards, the
// control-write constants, the nonce framing and the Thyroid scheduler.
//
// Tree Location:
// - src/driver/mod.rs (driver module entry point)
// - Submodules: thyroid, framing, board, bitstream
// - Depends on: tokio, tokio-serial, thiserror

pub mod bitstream;
pub mod board;
pub mod framing;
pub mod thyroid;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub use thyroid::Thyroid;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Port: {0}")]
    Port(String),
    #[error("gpio: {0}")]
    Gpio(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read side of the UART, serial or tunneled
pub type PortReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write side of the UART
pub type PortWriter = Box<dyn AsyncWrite + Send + Unpin>;

const NONCE_READ_CTRL_ADDR: u8 = 0x0B;
const START_MINE_CTRL_ADDR: u8 = 0x08;
const PULL_LOW: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
const PULL_HIGH: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Toggle the nonce-read strobe: pull low then high
pub fn read_nonce_packet() -> Vec<u8> {
    let mut p = Vec::with_capacity(12);
    p.push(crate::algo::WRITE_CTRL);
    p.push(NONCE_READ_CTRL_ADDR);
    p.extend_from_slice(&PULL_LOW);
    p.push(crate::algo::WRITE_CTRL);
    p.push(NONCE_READ_CTRL_ADDR);
    p.extend_from_slice(&PULL_HIGH);
    p
}

/// Raise the start-mine line
pub fn start_mine_packet() -> Vec<u8> {
    let mut p = Vec::with_capacity(6);
    p.push(crate::algo::WRITE_CTRL);
    p.push(START_MINE_CTRL_ADDR);
    p.extend_from_slice(&PULL_HIGH);
    p
}

/// Open the FPGA link. A device path of "@host:port" tunnels the UART over
/// TCP; anything else is a serial device at 8-N-1.
pub async fn open_port(device: &str, baudrate: u32) -> Result<(PortReader, PortWriter), DriverError> {
    if let Some(addr) = device.strip_prefix('@') {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(|e| DriverError::Port(format!("{}: {}", addr, e)))?;
        let _ = stream.set_nodelay(true);
        let (r, w) = stream.into_split();
        return Ok((Box::new(r), Box::new(w)));
    }

    let builder = tokio_serial::new(device, baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None);
    let port = tokio_serial::SerialStream::open(&builder)
        .map_err(|e| DriverError::Port(format!("{}: {}", device, e)))?;
    let (r, w) = tokio::io::split(port);
    Ok((Box::new(r), Box::new(w)))
}


// Changelog:
// - v0.3.0: Port halves exposed as trait objects so tests can inject a
//   duplex pipe.
// - v0.2.0: TCP tunnel syntax.
// - v0.1.0: Serial open with the classic control strobes.
