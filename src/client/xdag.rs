// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/client/xdag.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// XDAG client. The rig runs a local helper daemon that owns the actual pool
// connection; this client polls it over HTTP for pre-built register blobs
// and posts back the nonce tail of solved headers. The old approach of
// spawning and scraping the xdag binary is gone.
//
// Tree Location:
// - src/client/xdag.rs (XDAG helper client)
// - Depends on: reqwest, core

use crate::client::{Client, ClientCore, ClientError, DeprecationSignal};
use crate::core::types::{PoolConfig, PoolStats};
use crate::core::{Algorithm, Job, MiningWork, PoolState};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const HELPER_URL: &str = "http://127.0.0.1:1234";
/// A work blob shorter than this cannot carry a full register program
const MIN_WORK_HEX_LEN: usize = 288;

pub struct XdagClient {
    helper_url: String,
    user: String,
    pool_url: String,
    http: reqwest::Client,
    core: ClientCore,
    quit: AtomicBool,
}

impl XdagClient {
    pub fn new(pool: &PoolConfig) -> Self {
        XdagClient {
            helper_url: HELPER_URL.to_string(),
            user: pool.user.clone(),
            pool_url: pool.url.clone(),
            http: reqwest::Client::new(),
            core: ClientCore::new(),
            quit: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn with_helper_url(pool: &PoolConfig, url: &str) -> Self {
        let mut client = Self::new(pool);
        client.helper_url = url.to_string();
        client
    }
}

#[async_trait]
impl Client for XdagClient {
    async fn start(self: Arc<Self>) {
        // the helper owns the pool connection; nothing to supervise here
        debug!("xdag helper at {} for pool {}", self.helper_url, self.pool_url);
        while !self.quit.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn stop(&self) {
        self.quit.store(true, Ordering::Relaxed);
    }

    fn algo_name(&self) -> Algorithm {
        Algorithm::Xdag
    }

    fn pool_state(&self) -> PoolState {
        PoolState::Alive
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            status: self.pool_state(),
            user: self.user.clone(),
            pool_addr: self.helper_url.clone(),
            algo: Algorithm::Xdag.to_string(),
            accept: self.core.accept.load(Ordering::Relaxed),
            reject: self.core.reject.load(Ordering::Relaxed),
            discard: self.core.discard.load(Ordering::Relaxed),
            diff: -1.0,
            last_accepted: self.core.last_accept.load(Ordering::Relaxed),
            active: false,
        }
    }

    async fn get_work(&self) -> Result<(MiningWork, Option<DeprecationSignal>), ClientError> {
        let body = self
            .http
            .get(format!("{}/getWork", self.helper_url))
            .send()
            .await
            .map_err(|e| ClientError::Other(format!("xdag getWork: {}", e)))?
            .text()
            .await
            .map_err(|e| ClientError::Other(format!("xdag getWork body: {}", e)))?;

        if body.len() < MIN_WORK_HEX_LEN {
            return Err(ClientError::Other(format!(
                "Invalid response, only received {} bytes",
                body.len()
            )));
        }
        let header = hex::decode(body.trim())
            .map_err(|e| ClientError::Other(format!("xdag work blob: {}", e)))?;

        Ok((
            MiningWork {
                header,
                offset: 0,
                target: [0u8; 32],
                difficulty: -1.0,
                job: Job::Xdag,
            },
            None,
        ))
    }

    /// The driver hands the full blob plus nonce; the helper wants the last
    /// 8 bytes in hex
    async fn submit(&self, header: &[u8], job: &Job) -> Result<(), ClientError> {
        let Job::Xdag = job else {
            return Err(ClientError::WrongJob);
        };
        if header.len() < 144 {
            return Err(ClientError::Other("Wrong Nonce Len".into()));
        }
        let nonce_strip = &header[header.len() - 8..];
        debug!("xdag submit tail {}", hex::encode(nonce_strip));

        let resp = self
            .http
            .post(format!("{}/submit", self.helper_url))
            .body(hex::encode(nonce_strip))
            .send()
            .await;
        match resp {
            Ok(r) => {
                debug!("xdag resp: {:?}", r.status());
                self.core.record_accept();
                Ok(())
            }
            Err(e) => {
                self.core.record_reject();
                Err(ClientError::Other(format!("xdag submit: {}", e)))
            }
        }
    }

    fn core(&self) -> &ClientCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> PoolConfig {
        PoolConfig {
            url: "xdag.example.org:13654".into(),
            user: "wallet.worker".into(),
            pass: String::new(),
            algo: Algorithm::Xdag,
            active: false,
        }
    }

    #[tokio::test]
    async fn test_short_blob_is_rejected() {
        // a helper that answers with a too-short body
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                use tokio::io::AsyncWriteExt;
                let _ = sock
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nabcd")
                    .await;
            }
        });
        let client = XdagClient::with_helper_url(&test_pool(), &format!("http://{}", addr));
        assert!(client.get_work().await.is_err());
    }

    #[tokio::test]
    async fn test_submit_requires_full_blob() {
        let client = XdagClient::with_helper_url(&test_pool(), "http://127.0.0.1:1");
        let short = vec![0u8; 100];
        assert!(client.submit(&short, &Job::Xdag).await.is_err());
    }
}

// Changelog:
// - v0.2.0: Re-scoped to a plain HTTP client of the helper; no more process
//   spawning or killall.
// - v0.1.0: Initial helper scrape.
