// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/client/ckb.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// CKB stratum client. The pool pushes a raw 32-byte target and a pow hash;
// work is pow_hash plus extranonce1 plus our counter, 44 bytes, and the FPGA
// appends the remaining 4 nonce bytes on its own.
//
// Tree Location:
// - src/client/ckb.rs (CKB pool client)
// - Depends on: stratum, core, serde_json

use crate::client::{Client, ClientCore, ClientError, DeprecationSignal};
use crate::core::bytes::{rev_bytes, ExtraNonce2};
use crate::core::difficulty::{target_to_difficulty, Target};
use crate::core::types::{CkbJob, PoolConfig, PoolStats};
use crate::core::{Algorithm, Job, MiningWork, PoolState};
use crate::stratum::{StratumError, StratumTransport};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tracing::{info, warn};

struct Inner {
    transport: Option<Arc<StratumTransport>>,
    nonce1: Vec<u8>,
    /// pool-granted extranonce2 width minus the 4 bytes the FPGA returns
    nonce2_size: usize,
    target: Target,
    current_job: CkbJob,
}

pub struct CkbClient {
    host: String,
    user: String,
    password: String,
    core: ClientCore,
    inner: StdMutex<Inner>,
    quit: AtomicBool,
}

impl CkbClient {
    pub fn new(pool: &PoolConfig) -> Self {
        CkbClient {
            host: pool.host().to_string(),
            user: pool.user.clone(),
            password: pool.pass.clone(),
            core: ClientCore::new(),
            inner: StdMutex::new(Inner {
                transport: None,
                nonce1: Vec::new(),
                nonce2_size: 4,
                target: [0u8; 32],
                current_job: CkbJob::default(),
            }),
            quit: AtomicBool::new(false),
        }
    }

    async fn start_pool_conn(self: &Arc<Self>) {
        self.core.deprecate_outstanding_jobs();

        let transport = Arc::new(StratumTransport::new(false));
        transport.set_error_callback(Arc::new(|_err| {}));

        self.subscribe_to_target_changes(&transport);
        self.subscribe_to_job_notifications(&transport);

        self.inner.lock().unwrap().transport = Some(Arc::clone(&transport));

        info!("Connecting to {}", self.host);
        if transport.dial(&self.host).await.is_err() {
            return;
        }

        let result = match transport
            .call("mining.subscribe", json!(["thyrox-miner", null]))
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!("ERROR Error in response from stratum: {}", e);
                transport.close().await;
                return;
            }
        };
        let parsed = result.as_array().and_then(|reply| {
            let nonce1 = hex::decode(reply.get(1)?.as_str()?).ok()?;
            let nonce2_size = reply.get(2)?.as_u64()? as usize;
            Some((nonce1, nonce2_size))
        });
        let Some((nonce1, nonce2_size)) = parsed else {
            warn!("ERROR Invalid response from stratum: {:?}", result);
            return;
        };
        {
            let mut inner = self.inner.lock().unwrap();
            inner.nonce1 = nonce1;
            // the fpga returns 4 bytes of the counter space
            inner.nonce2_size = nonce2_size.saturating_sub(4);
        }

        let client = Arc::clone(self);
        tokio::spawn(async move {
            match transport
                .call("mining.authorize", json!([client.user, client.password]))
                .await
            {
                Ok(result) => info!("Authorization of {}: {:?}", client.user, result),
                Err(e) => warn!("Unable to authorize: {}", e),
            }
        });
    }

    fn subscribe_to_target_changes(self: &Arc<Self>, transport: &StratumTransport) {
        let weak = Arc::downgrade(self);
        transport.set_notification_handler(
            "mining.set_target",
            Arc::new(move |params, _result| {
                let Some(client) = weak.upgrade() else { return };
                let decoded = params
                    .first()
                    .and_then(Value::as_str)
                    .and_then(|s| hex::decode(s).ok());
                let Some(raw) = decoded else {
                    warn!("invalid target string");
                    return;
                };
                if raw.len() != 32 {
                    warn!("unable to decode target");
                    return;
                }
                info!("Stratum server changed target to {}", hex::encode(&raw));
                client.core.deprecate_outstanding_jobs();
                let mut inner = client.inner.lock().unwrap();
                inner.target.copy_from_slice(&raw);
            }),
        );
    }

    fn subscribe_to_job_notifications(self: &Arc<Self>, transport: &StratumTransport) {
        let weak = Arc::downgrade(self);
        transport.set_notification_handler(
            "mining.notify",
            Arc::new(move |params, _result| {
                let Some(client) = weak.upgrade() else { return };
                if params.len() < 5 {
                    warn!("invalid params");
                    return;
                }
                let Some(job_id) = params[0].as_str() else {
                    warn!("invalid jobId");
                    return;
                };
                let pow_hash = params[1]
                    .as_str()
                    .and_then(|s| hex::decode(s).ok());
                let Some(pow_hash) = pow_hash else {
                    warn!("invalid powHash");
                    return;
                };
                let Some(clean_jobs) = params[4].as_bool() else {
                    warn!("invalid cleanJob req");
                    return;
                };
                let nonce2_size = client.inner.lock().unwrap().nonce2_size;
                client.add_new_stratum_job(CkbJob {
                    job_id: job_id.to_string(),
                    pow_hash,
                    clean_jobs,
                    extra_nonce2: ExtraNonce2::new(nonce2_size),
                });
            }),
        );
    }

    fn add_new_stratum_job(&self, job: CkbJob) {
        let clean = job.clean_jobs;
        let job_id = job.job_id.clone();
        self.inner.lock().unwrap().current_job = job;
        if clean {
            self.core.record_discard();
            self.core.deprecate_outstanding_jobs();
            self.core.fire_clean_job_event();
        }
        self.core.add_job_to_deprecate(&job_id);
    }
}

#[async_trait]
impl Client for CkbClient {
    async fn start(self: Arc<Self>) {
        self.start_pool_conn().await;
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            if self.quit.load(Ordering::Relaxed) {
                return;
            }
            let transport = self.inner.lock().unwrap().transport.clone();
            let Some(transport) = transport else { continue };
            match transport.pool_state() {
                PoolState::Alive | PoolState::NotReady => continue,
                PoolState::Dead => {
                    warn!("Pool dead, retry after 30s");
                    transport.close().await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    self.start_pool_conn().await;
                }
                PoolState::Sick => {
                    transport.close().await;
                    self.start_pool_conn().await;
                }
            }
        }
    }

    async fn stop(&self) {
        self.quit.store(true, Ordering::Relaxed);
        let transport = self.inner.lock().unwrap().transport.clone();
        if let Some(transport) = transport {
            transport.close().await;
        }
    }

    fn algo_name(&self) -> Algorithm {
        Algorithm::Ckb
    }

    fn pool_state(&self) -> PoolState {
        self.inner
            .lock()
            .unwrap()
            .transport
            .as_ref()
            .map(|t| t.pool_state())
            .unwrap_or(PoolState::NotReady)
    }

    fn pool_stats(&self) -> PoolStats {
        let diff = target_to_difficulty(&self.inner.lock().unwrap().target);
        PoolStats {
            status: self.pool_state(),
            user: self.user.clone(),
            pool_addr: format!("stratum+tcp://{}", self.host),
            algo: Algorithm::Ckb.to_string(),
            accept: self.core.accept.load(Ordering::Relaxed),
            reject: self.core.reject.load(Ordering::Relaxed),
            discard: self.core.discard.load(Ordering::Relaxed),
            diff,
            last_accepted: self.core.last_accept.load(Ordering::Relaxed),
            active: false,
        }
    }

    async fn get_work(&self) -> Result<(MiningWork, Option<DeprecationSignal>), ClientError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.current_job.job_id.is_empty() {
            return Err(ClientError::NoJobYet);
        }
        let signal = self.core.deprecation_signal(&inner.current_job.job_id);

        let job = inner.current_job.clone();
        let en2 = job.extra_nonce2.bytes();
        inner.current_job.extra_nonce2.increment();

        let target = inner.target;
        let mut header = Vec::with_capacity(44);
        header.extend_from_slice(&job.pow_hash);
        header.extend_from_slice(&inner.nonce1);
        header.extend_from_slice(&en2);

        Ok((
            MiningWork {
                header,
                offset: 0,
                target,
                difficulty: target_to_difficulty(&target),
                job: Job::Ckb(job),
            },
            signal,
        ))
    }

    async fn submit(&self, nonce: &[u8], job: &Job) -> Result<(), ClientError> {
        let Job::Ckb(sj) = job else {
            return Err(ClientError::WrongJob);
        };
        if nonce.len() < 8 {
            return Err(ClientError::Other("short nonce".into()));
        }
        // counter bytes followed by the little-endian fpga word, reversed
        let mut nonce2 = sj.extra_nonce2.bytes();
        nonce2.extend_from_slice(&rev_bytes(&nonce[4..]));
        let transport = self
            .inner
            .lock()
            .unwrap()
            .transport
            .clone()
            .ok_or(StratumError::NotConnected)
            .map_err(ClientError::from)?;

        let params = json!([self.user, sj.job_id, hex::encode(nonce2)]);
        match transport.call("mining.submit", params).await {
            Ok(_) => {
                self.core.record_accept();
                Ok(())
            }
            Err(e) => {
                self.core.record_reject();
                Err(e.into())
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

    fn test_client() -> Arc<CkbClient> {
        Arc::new(CkbClient::new(&PoolConfig {
            url: "stratum+tcp://ckb.example.com:4300".into(),
            user: "ckb1qyq8fxuxz49nvatawuqye0fydpm4gulcs6usgyfkrr.1".into(),
            pass: "x".into(),
            algo: Algorithm::Ckb,
            active: true,
        }))
    }

    #[tokio::test]
    async fn test_header_is_44_bytes_pre_nonce() {
        let client = test_client();
        {
            let mut inner = client.inner.lock().unwrap();
            inner.nonce1 = hex::decode("00c904bd").unwrap();
            inner.nonce2_size = 8;
        }
        client.add_new_stratum_job(CkbJob {
            job_id: "j1".into(),
            pow_hash: hex::decode(
                "d5a74fba920ad0d35ec5726f26327547cbc82180e356e5ccf6cf2e6bd75f8a66",
            )
            .unwrap(),
            clean_jobs: false,
            extra_nonce2: ExtraNonce2::new(8),
        });
        let (work, _) = client.get_work().await.unwrap();
        assert_eq!(work.header.len(), 32 + 4 + 8);
        assert_eq!(&work.header[..32], &hex::decode(
            "d5a74fba920ad0d35ec5726f26327547cbc82180e356e5ccf6cf2e6bd75f8a66"
        ).unwrap()[..]);
        // first dispatch carries counter zero
        assert_eq!(&work.header[36..], &[0u8; 8]);
        let (work2, _) = client.get_work().await.unwrap();
        assert_eq!(work2.header[43], 1);
    }
}

// Changelog:
// - v0.2.0: Raw-target pushes, difficulty derived for display only.
// - v0.1.0: Initial CKB client with the 44-byte pre-nonce header.
