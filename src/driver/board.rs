// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/driver/board.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Board selection over the rig's mux GPIOs. Three pin groups exist: console
// (UART), JTAG and reset. A board index is translated through the configured
// gray table and driven MSB first; code zero releases the mux. Pin numbers
// and the gray table come from the config file only; there are no built-in
// board variants.
//
// Tree Location:
// - src/driver/board.rs (GPIO board mux)
// - Depends on: sysfs_gpio, core

use crate::core::types::Config;
use crate::driver::DriverError;
use sysfs_gpio::{Direction, Pin};

pub struct PinGroup {
    pins: Vec<Pin>,
}

impl PinGroup {
    pub fn new(numbers: &[u64]) -> Result<Self, DriverError> {
        let mut pins = Vec::with_capacity(numbers.len());
        for n in numbers {
            let pin = Pin::new(*n);
            pin.export()
                .map_err(|e| DriverError::Gpio(format!("export {}: {}", n, e)))?;
            pin.set_direction(Direction::Out)
                .map_err(|e| DriverError::Gpio(format!("direction {}: {}", n, e)))?;
            pins.push(pin);
        }
        Ok(PinGroup { pins })
    }

    /// Drive the group to a code, most significant pin first
    pub fn drive(&self, code: u8) -> Result<(), DriverError> {
        let width = self.pins.len();
        for (i, pin) in self.pins.iter().enumerate() {
            let bit = (code >> (width - 1 - i)) & 1;
            pin.set_value(bit)
                .map_err(|e| DriverError::Gpio(format!("set: {}", e)))?;
        }
        Ok(())
    }
}

pub struct BoardMux {
    console: PinGroup,
    jtag: PinGroup,
    reset: PinGroup,
    gray: Vec<u8>,
}

impl BoardMux {
    pub fn from_config(cfg: &Config) -> Result<Self, DriverError> {
        Ok(BoardMux {
            console: PinGroup::new(&cfg.uartio)?,
            jtag: PinGroup::new(&cfg.jtagio)?,
            reset: PinGroup::new(&cfg.resetio)?,
            gray: cfg.graymapping.clone(),
        })
    }

    fn code_for(&self, board_id: u8) -> u8 {
        self.gray
            .get(board_id as usize)
            .copied()
            .unwrap_or(board_id)
    }

    /// Route the shared UART to a board; id 0 releases the mux
    pub fn select_console(&self, board_id: u8) -> Result<(), DriverError> {
        self.console.drive(self.code_for(board_id))
    }

    pub fn select_jtag(&self, board_id: u8) -> Result<(), DriverError> {
        self.jtag.drive(board_id)
    }

    /// Press and release a board's reset line
    pub fn pulse_reset(&self, board_id: u8) -> Result<(), DriverError> {
        self.reset.drive(board_id)?;
        self.reset.drive(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_table_lookup_falls_back_to_identity() {
        let mux = BoardMux {
            console: PinGroup { pins: Vec::new() },
            jtag: PinGroup { pins: Vec::new() },
            reset: PinGroup { pins: Vec::new() },
            gray: vec![0, 3, 2, 6],
        };
        assert_eq!(mux.code_for(1), 3);
        assert_eq!(mux.code_for(3), 6);
        // indexes past the table drive their own value
        assert_eq!(mux.code_for(9), 9);
    }
}

// Changelog:
// - v0.2.0: Pin lists and the gray table are pure config; dropped the three
//   hard-coded board variants.
// - v0.1.0: Initial sysfs mux.
