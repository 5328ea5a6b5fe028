// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/driver/bitstream.rs
// Version: 0.1.1
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Shell-outs to openocd: flashing bitstreams over the rig's JTAG and reading
// the XADC temperature/voltage report. Odocrypt bitstreams rotate every ten
// days, so their file names carry the blocktime bucket.
//
// Tree Location:
// - src/driver/bitstream.rs (openocd shell-outs)
// - Depends on: tokio, core

use crate::core::Algorithm;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

pub const BITSTREAM_DIR: &str = "/opt/scripta/bitstreams";

const RPI_INTERFACE_PATH: &str = "/usr/share/openocd/scripts/interface/raspberrypi-native.cfg";
const XC7_CFG_PATH: &str = "/usr/share/openocd/scripts/cpld/xilinx-xc7.cfg";
const XADC_PATH: &str = "/usr/share/openocd/scripts/fpga/xilinx-xadc.cfg";
const ADAPTER_INIT: &str = "adapter_khz 3000; init;";

/// Seconds per odocrypt bitstream epoch: ten days
pub const ODO_EPOCH_SECS: u32 = 10 * 24 * 60 * 60;

/// Bucket a block timestamp to its bitstream epoch
pub fn odo_bucket(timestamp: u32) -> u32 {
    timestamp - timestamp % ODO_EPOCH_SECS
}

/// File name for an algorithm's bitstream; odocrypt names carry the epoch
pub fn bitstream_name(algo: Algorithm, odo_timestamp: Option<u32>) -> String {
    match (algo, odo_timestamp) {
        (Algorithm::Odocrypt, Some(ts)) => format!("{}-{}.bit", algo, odo_bucket(ts)),
        _ => format!("{}.bit", algo),
    }
}

/// Flash a bitstream through openocd
pub async fn program_bit(bitstream_name: &str) -> std::io::Result<()> {
    let bitstream_path = Path::new(BITSTREAM_DIR).join(bitstream_name);
    info!("bit path: {}", bitstream_path.display());
    let pld_load = format!(
        "{} xc7_program xc7.tap; pld load 0 {}; exit",
        ADAPTER_INIT,
        bitstream_path.display()
    );
    let openocd_cmd = format!(
        "sudo openocd -f {} -f {} -c '{}'",
        RPI_INTERFACE_PATH, XC7_CFG_PATH, pld_load
    );
    let status = Command::new("/bin/sh").arg("-c").arg(openocd_cmd).status().await?;
    if !status.success() {
        return Err(std::io::Error::other(format!("openocd exited: {}", status)));
    }
    Ok(())
}

/// Read TEMP / VCCINT from the XADC report; lines look like
/// "TEMP 79.05 C" and "VCCINT 0.983 V"
pub async fn read_sensors() -> std::io::Result<(String, String)> {
    let read_info = format!("{} xadc_report xc7.tap; exit", ADAPTER_INIT);
    let openocd_cmd = format!(
        "sudo openocd -f {} -f {} -f {} -c '{}'",
        RPI_INTERFACE_PATH, XC7_CFG_PATH, XADC_PATH, read_info
    );
    let out = Command::new("/bin/sh").arg("-c").arg(openocd_cmd).output().await?;
    let mut temp = String::new();
    let mut voltage = String::new();
    for line in String::from_utf8_lossy(&out.stdout).lines() {
        if let Some(v) = line.strip_prefix("TEMP ") {
            temp = v.split_whitespace().next().unwrap_or("").to_string();
        }
        if let Some(v) = line.strip_prefix("VCCINT ") {
            voltage = v.split_whitespace().next().unwrap_or("").to_string();
        }
    }
    Ok((temp, voltage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odo_bucket_is_ten_days() {
        let ts: u32 = 0x5D9617E3;
        let bucket = odo_bucket(ts);
        assert_eq!(bucket % ODO_EPOCH_SECS, 0);
        assert!(ts - bucket < ODO_EPOCH_SECS);
        // everything inside one epoch shares a bitstream
        assert_eq!(odo_bucket(bucket), bucket);
        assert_eq!(odo_bucket(bucket + ODO_EPOCH_SECS - 1), bucket);
        assert_eq!(odo_bucket(bucket + ODO_EPOCH_SECS), bucket + ODO_EPOCH_SECS);
    }

    #[test]
    fn test_bitstream_names() {
        assert_eq!(bitstream_name(Algorithm::Ckb, None), "ckb.bit");
        let named = bitstream_name(Algorithm::Odocrypt, Some(1_571_000_000));
        assert!(named.starts_with("odocrypt-"));
        assert!(named.ends_with(".bit"));
    }
}
