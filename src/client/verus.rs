// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/client/verus.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// VerusHash stratum client. The 1487-byte header layout (version, three
// 32-byte hashes, ntime, nbits, 32 bytes of extranonce, the 0xFD4005 01
// solution preamble and a 1343-byte empty solution) is carried verbatim
// from the upstream rig; there is no independent specification for it.
//
// Tree Location:
// - src/client/verus.rs (Verus pool client)
// - Depends on: stratum, core, serde_json

use crate::client::{Client, ClientCore, ClientError, DeprecationSignal};
use crate::core::bytes::ExtraNonce2;
use crate::core::difficulty::Target;
use crate::core::types::{PoolConfig, PoolStats, VerusJob};
use crate::core::{Algorithm, Job, MiningWork, PoolState};
use crate::stratum::{StratumError, StratumTransport};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tracing::{info, warn};

pub const HEADER_LEN: usize = 1487;
const SOLUTION_PREAMBLE: [u8; 4] = [0xfd, 0x40, 0x05, 0x01];
const EMPTY_SOLUTION_LEN: usize = 1343;
const SOLUTION_OFFSET: usize = 140;
const SOLUTION_NONCE_OFFSET: usize = 1332;

struct Inner {
    transport: Option<Arc<StratumTransport>>,
    extranonce1: Vec<u8>,
    extranonce2_size: usize,
    target: Target,
    difficulty: f64,
    current_job: VerusJob,
}

pub struct VerusClient {
    host: String,
    user: String,
    password: String,
    core: ClientCore,
    inner: StdMutex<Inner>,
    quit: AtomicBool,
}

impl VerusClient {
    pub fn new(pool: &PoolConfig) -> Self {
        VerusClient {
            host: pool.host().to_string(),
            user: pool.user.clone(),
            password: pool.pass.clone(),
            core: ClientCore::new(),
            inner: StdMutex::new(Inner {
                transport: None,
                extranonce1: Vec::new(),
                extranonce2_size: 32,
                target: [0u8; 32],
                difficulty: 0.0,
                current_job: VerusJob::default(),
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
            .call("mining.subscribe", json!(["thyrox-miner"]))
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
            let en1_hex = reply.get(1)?.as_str()?;
            let extranonce1 = hex::decode(en1_hex).ok()?;
            // the 32-byte extranonce region is split between pool and miner
            Some((extranonce1.clone(), 32usize.saturating_sub(extranonce1.len())))
        });
        let Some((extranonce1, extranonce2_size)) = parsed else {
            warn!("ERROR Invalid response from stratum: {:?}", result);
            transport.close().await;
            return;
        };
        {
            let mut inner = self.inner.lock().unwrap();
            inner.extranonce1 = extranonce1;
            inner.extranonce2_size = extranonce2_size;
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
                let Some(target_hex) = params.first().and_then(Value::as_str) else {
                    warn!("ERROR No target parameter supplied by stratum server");
                    return;
                };
                info!("Stratum server changed difficulty to {}", &target_hex[..16.min(target_hex.len())]);
                client.set_target(target_hex);
            }),
        );
    }

    fn set_target(&self, target_hex: &str) {
        let Ok(raw) = hex::decode(target_hex) else {
            warn!("ERROR Error setting target to {}", target_hex);
            return;
        };
        if raw.len() > 32 {
            warn!("ERROR Error setting target to {}", target_hex);
            return;
        }
        self.core.deprecate_outstanding_jobs();
        let mut inner = self.inner.lock().unwrap();
        inner.target = [0u8; 32];
        inner.target[32 - raw.len()..].copy_from_slice(&raw);
        inner.difficulty = 1.0;
    }

    fn subscribe_to_job_notifications(self: &Arc<Self>, transport: &StratumTransport) {
        let weak = Arc::downgrade(self);
        transport.set_notification_handler(
            "mining.notify",
            Arc::new(move |params, _result| {
                let Some(client) = weak.upgrade() else { return };
                let en2_size = client.inner.lock().unwrap().extranonce2_size;
                match parse_notify(&params, en2_size) {
                    Ok(job) => client.add_new_stratum_job(job),
                    Err(e) => warn!("ERROR {}", e),
                }
            }),
        );
    }

    fn add_new_stratum_job(&self, job: VerusJob) {
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

fn hex_param(params: &[Value], idx: usize, what: &str) -> Result<Vec<u8>, ClientError> {
    params
        .get(idx)
        .and_then(Value::as_str)
        .and_then(|s| hex::decode(s).ok())
        .ok_or_else(|| {
            ClientError::BadNotification(format!(
                "Wrong {} parameter supplied by stratum server",
                what
            ))
        })
}

/// Notify layout: job id, version, hash1..hash3, ntime, nbits, clean flag
fn parse_notify(params: &[Value], extranonce2_size: usize) -> Result<VerusJob, ClientError> {
    if params.len() < 8 {
        return Err(ClientError::BadNotification(
            "Wrong number of parameters supplied by stratum server".into(),
        ));
    }
    let job_id = params[0]
        .as_str()
        .ok_or_else(|| {
            ClientError::BadNotification("Wrong job_id parameter supplied by stratum server".into())
        })?
        .to_string();
    let version = hex_param(params, 1, "version")?;
    let hash1 = hex_param(params, 2, "hash1")?;
    let hash2 = hex_param(params, 3, "hash2")?;
    let hash3 = hex_param(params, 4, "hash3")?;
    let ntime = hex_param(params, 5, "ntime")?;
    let nbits = hex_param(params, 6, "nbits")?;
    let clean_jobs = params[7].as_bool().ok_or_else(|| {
        ClientError::BadNotification("Wrong clean_jobs parameter supplied by stratum server".into())
    })?;
    Ok(VerusJob {
        job_id,
        version,
        hash1,
        hash2,
        hash3,
        nbits,
        ntime,
        clean_jobs,
        extra_nonce2: ExtraNonce2::new(extranonce2_size),
    })
}

#[async_trait]
impl Client for VerusClient {
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
        Algorithm::Verus
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
        PoolStats {
            status: self.pool_state(),
            user: self.user.clone(),
            pool_addr: format!("stratum+tcp://{}", self.host),
            algo: Algorithm::Verus.to_string(),
            accept: self.core.accept.load(Ordering::Relaxed),
            reject: self.core.reject.load(Ordering::Relaxed),
            discard: self.core.discard.load(Ordering::Relaxed),
            diff: self.inner.lock().unwrap().difficulty,
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
        let difficulty = inner.difficulty;

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(&job.version);
        header.extend_from_slice(&job.hash1);
        header.extend_from_slice(&job.hash2);
        header.extend_from_slice(&job.hash3);
        header.extend_from_slice(&job.ntime);
        header.extend_from_slice(&job.nbits);
        header.extend_from_slice(&inner.extranonce1);
        header.extend_from_slice(&en2);
        header.extend_from_slice(&SOLUTION_PREAMBLE);
        header.extend_from_slice(&[0u8; EMPTY_SOLUTION_LEN]);

        Ok((
            MiningWork {
                header,
                offset: 0,
                target,
                difficulty,
                job: Job::Verus(job),
            },
            signal,
        ))
    }

    /// The driver hands the full header plus nonce; the submitted solution is
    /// the 1347-byte tail with the first 4 nonce bytes patched in
    async fn submit(&self, header: &[u8], job: &Job) -> Result<(), ClientError> {
        let Job::Verus(sj) = job else {
            return Err(ClientError::WrongJob);
        };
        if header.len() < HEADER_LEN + 4 {
            return Err(ClientError::Other("short verus header".into()));
        }
        let mut solution = header[SOLUTION_OFFSET..HEADER_LEN].to_vec();
        let sol_nonce = &header[HEADER_LEN..];
        solution[SOLUTION_NONCE_OFFSET..SOLUTION_NONCE_OFFSET + 4]
            .copy_from_slice(&sol_nonce[..4]);

        let extranonce2 = hex::encode(sj.extra_nonce2.bytes());
        let ntime = hex::encode(&sj.ntime);
        let transport = self
            .inner
            .lock()
            .unwrap()
            .transport
            .clone()
            .ok_or(StratumError::NotConnected)
            .map_err(ClientError::from)?;

        let params = json!([self.user, sj.job_id, ntime, extranonce2, hex::encode(solution)]);
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

    fn sample_job(en2_size: usize) -> VerusJob {
        VerusJob {
            job_id: "d785".into(),
            version: hex::decode("04000100").unwrap(),
            hash1: vec![0x11; 32],
            hash2: vec![0x22; 32],
            hash3: vec![0x33; 32],
            ntime: hex::decode("298b305d").unwrap(),
            nbits: hex::decode("543d0e1b").unwrap(),
            clean_jobs: false,
            extra_nonce2: ExtraNonce2::new(en2_size),
        }
    }

    #[tokio::test]
    async fn test_header_is_1487_bytes() {
        let client = Arc::new(VerusClient::new(&PoolConfig {
            url: "stratum+tcp://verus.example.com:9999".into(),
            user: "RHkz1um1133mBZBU32ckcAKTY4wdJdCkdK.noname".into(),
            pass: "x".into(),
            algo: Algorithm::Verus,
            active: true,
        }));
        {
            let mut inner = client.inner.lock().unwrap();
            inner.extranonce1 = vec![0x0F; 4];
            inner.extranonce2_size = 28;
        }
        client.add_new_stratum_job(sample_job(28));

        let (work, _) = client.get_work().await.unwrap();
        assert_eq!(work.header.len(), HEADER_LEN);
        // solution preamble sits right after the 32-byte extranonce region
        assert_eq!(&work.header[140..144], &SOLUTION_PREAMBLE);
        assert!(work.header[144..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_notify_takes_ntime_before_nbits() {
        let params = vec![
            json!("d785"),
            json!("04000100"),
            json!(hex::encode([0x11u8; 32])),
            json!(hex::encode([0x22u8; 32])),
            json!(hex::encode([0x33u8; 32])),
            json!("298b305d"),
            json!("543d0e1b"),
            json!(true),
        ];
        let job = parse_notify(&params, 28).unwrap();
        assert_eq!(job.ntime, hex::decode("298b305d").unwrap());
        assert_eq!(job.nbits, hex::decode("543d0e1b").unwrap());
        assert!(job.clean_jobs);
    }
}

// Changelog:
// - v0.2.0: Solution patched from the returned nonce at offset 1332.
// - v0.1.0: Initial Verus client with the carried header layout.
