// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/miner/mod.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// The supervisor: builds one client per configured pool, keeps their
// connection loops running, wires the Thyroid driver to the active pool and
// serves the status snapshot the external HTTP layer renders. Exactly one
// pool is active at a time; there is no failover.
//
// Tree Location:
// - src/miner/mod.rs (supervisor)
// - Depends on: client, driver, core

use crate::client::{new_client, Client};
use crate::core::types::{Config, MinerStatus};
use crate::core::Algorithm;
use crate::driver::board::BoardMux;
use crate::driver::thyroid::{Thyroid, ThyroidConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Miner {
    config: Config,
    clients: StdMutex<Vec<Arc<dyn Client>>>,
    driver: StdMutex<Option<Arc<Thyroid>>>,
    active_idx: AtomicUsize,
    client_tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Miner {
    pub fn new(config: Config) -> Self {
        Miner {
            config,
            clients: StdMutex::new(Vec::new()),
            driver: StdMutex::new(None),
            active_idx: AtomicUsize::new(0),
            client_tasks: StdMutex::new(Vec::new()),
        }
    }

    fn build_clients(&self) -> Arc<dyn Client> {
        let mut clients: Vec<Arc<dyn Client>> = Vec::with_capacity(self.config.pools.len());
        for pool in &self.config.pools {
            let client = new_client(pool);
            let task = tokio::spawn({
                let client = Arc::clone(&client);
                async move { client.start().await }
            });
            self.client_tasks.lock().unwrap().push(task);
            clients.push(client);
        }
        let active = self.config.active_pool_index();
        self.active_idx.store(active, Ordering::Relaxed);
        let active_client = Arc::clone(&clients[active]);
        *self.clients.lock().unwrap() = clients;
        active_client
    }

    /// Wire everything and start mining
    pub async fn start(&self) {
        let active_client = self.build_clients();
        info!(
            "⛏️  Active pool: {} ({})",
            active_client.pool_stats().pool_addr,
            active_client.algo_name()
        );

        let mux = if self.config.muxnum > 1 {
            match BoardMux::from_config(&self.config) {
                Ok(mux) => Some(mux),
                Err(e) => {
                    warn!("board mux unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let driver = Arc::new(Thyroid::new(
            ThyroidConfig::from_config(&self.config),
            Arc::clone(&active_client),
            mux,
        ));

        // odocrypt bitstreams rotate with the blocktime; the driver flashes
        // those itself once it has seen work
        if active_client.algo_name() != Algorithm::Odocrypt {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.program_bitstream(None).await });
        }

        driver.start().await;
        *self.driver.lock().unwrap() = Some(driver);
    }

    /// Tear down the driver and every pool connection, then start over
    pub async fn reload(&self) {
        info!("Reloading miner");
        self.stop().await;
        self.start().await;
    }

    pub async fn stop(&self) {
        let driver = self.driver.lock().unwrap().take();
        if let Some(driver) = driver {
            driver.stop().await;
        }
        let clients: Vec<Arc<dyn Client>> = self.clients.lock().unwrap().drain(..).collect();
        for client in clients {
            info!("Stopping pool: {}", client.pool_stats().pool_addr);
            client.stop().await;
        }
        for task in self.client_tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    /// Reprogram the active bitstream on demand
    pub async fn program_bitstream(&self) {
        let driver = self.driver.lock().unwrap().clone();
        if let Some(driver) = driver {
            driver.program_bitstream(None).await;
        }
    }

    /// The snapshot served by the external status endpoint
    pub async fn status(&self) -> MinerStatus {
        let driver = self.driver.lock().unwrap().clone();
        let devs = match driver {
            Some(driver) => vec![driver.driver_stats().await],
            None => Vec::new(),
        };
        let active = self.active_idx.load(Ordering::Relaxed);
        let pools = self
            .clients
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut stats = c.pool_stats();
                stats.active = i == active;
                stats
            })
            .collect();
        MinerStatus {
            devs,
            miner_down: false,
            miner_up: true,
            pools,
            time: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PoolConfig;

    fn two_pool_config() -> Config {
        let mut cfg = Config::default();
        cfg.pools = vec![
            PoolConfig {
                url: "stratum+tcp://skunk.example.com:3362".into(),
                user: "a".into(),
                pass: "x".into(),
                algo: Algorithm::Skunk,
                active: false,
            },
            PoolConfig {
                url: "stratum+tcp://ckb.example.com:4300".into(),
                user: "b".into(),
                pass: "x".into(),
                algo: Algorithm::Ckb,
                active: true,
            },
        ];
        cfg
    }

    #[tokio::test]
    async fn test_build_clients_marks_active() {
        let miner = Miner::new(two_pool_config());
        let active = miner.build_clients();
        assert_eq!(active.algo_name(), Algorithm::Ckb);
        let status_pools: Vec<bool> = miner
            .clients
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, _)| i == miner.active_idx.load(Ordering::Relaxed))
            .collect();
        assert_eq!(status_pools, vec![false, true]);
        miner.stop().await;
    }
}

// Changelog:
// - v0.2.0: Reload path; status snapshot moved here from the HTTP layer.
// - v0.1.0: Initial wiring of clients and driver.
