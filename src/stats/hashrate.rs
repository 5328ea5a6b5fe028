// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/stats/hashrate.rs
// Version: 0.1.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// One hour of per-second nonce weights in a ring, summed over arbitrary
// trailing windows for the status surface.
//
// Tree Location:
// - src/stats/hashrate.rs (hashrate ring buffer)
// - Depends on: std

pub const WINDOW_SLOTS: usize = 3600;

pub struct HashRate {
    data_series: Box<[f64; WINDOW_SLOTS]>,
    current_pos: usize,
}

impl Default for HashRate {
    fn default() -> Self {
        HashRate {
            data_series: Box::new([0.0; WINDOW_SLOTS]),
            current_pos: 0,
        }
    }
}

impl HashRate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one second's worth of weighted nonces
    pub fn add(&mut self, num: f64) {
        self.current_pos = (self.current_pos + 1) % WINDOW_SLOTS;
        self.data_series[self.current_pos] = num;
    }

    /// Sum of the most recent n slots; unfilled slots count as zero
    pub fn recent_n_sum(&self, recent_n: usize) -> f64 {
        let mut sum = 0.0;
        for i in 0..recent_n.min(WINDOW_SLOTS) {
            let pos = (self.current_pos + WINDOW_SLOTS - i) % WINDOW_SLOTS;
            sum += self.data_series[pos];
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_sums_match_added_values() {
        let mut hr = HashRate::new();
        let added: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        for v in &added {
            hr.add(*v);
        }
        for n in [1usize, 7, 60, 100] {
            let expected: f64 = added[added.len() - n..].iter().sum();
            assert!((hr.recent_n_sum(n) - expected).abs() < 1e-9, "window {}", n);
        }
        // beyond what was added, the empty slots contribute nothing
        assert!((hr.recent_n_sum(3600) - added.iter().sum::<f64>()).abs() < 1e-9);
    }

    #[test]
    fn test_ring_wraps_after_an_hour() {
        let mut hr = HashRate::new();
        for _ in 0..WINDOW_SLOTS {
            hr.add(1.0);
        }
        hr.add(5.0);
        assert!((hr.recent_n_sum(1) - 5.0).abs() < 1e-9);
        // the full window now holds 3599 ones and one five
        assert!((hr.recent_n_sum(WINDOW_SLOTS) - 3604.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_ring_sums_to_zero() {
        let hr = HashRate::new();
        assert_eq!(hr.recent_n_sum(3600), 0.0);
    }
}
