// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/client/general.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// The classic stratum client used by the odocrypt and skunk pipelines:
// subscribe/authorize, difficulty pushes, 9-field notify, coinbase + merkle
// fold, and the word-reversed 80-byte header with the target appended for
// the register file.
//
// Tree Location:
// - src/client/general.rs (generic stratum pool client)
// - Depends on: stratum, core, serde_json

use crate::client::{Client, ClientCore, ClientError, DeprecationSignal};
use crate::core::bytes::{rev_hash_words, ExtraNonce2};
use crate::core::difficulty::{difficulty_to_target, Target};
use crate::core::primitives::sha256d;
use crate::core::types::{GeneralJob, PoolConfig, PoolStats};
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
    extranonce1: Vec<u8>,
    extranonce2_size: usize,
    target: Target,
    difficulty: f64,
    current_job: GeneralJob,
}

pub struct GeneralClient {
    host: String,
    user: String,
    password: String,
    algo: Algorithm,
    core: ClientCore,
    inner: StdMutex<Inner>,
    quit: AtomicBool,
}

impl GeneralClient {
    pub fn new(pool: &PoolConfig) -> Self {
        GeneralClient {
            host: pool.host().to_string(),
            user: pool.user.clone(),
            password: pool.pass.clone(),
            algo: pool.algo,
            core: ClientCore::new(),
            inner: StdMutex::new(Inner {
                transport: None,
                extranonce1: Vec::new(),
                extranonce2_size: 4,
                target: [0u8; 32],
                difficulty: 0.0,
                current_job: GeneralJob::default(),
            }),
            quit: AtomicBool::new(false),
        }
    }

    async fn start_pool_conn(self: &Arc<Self>) {
        self.core.deprecate_outstanding_jobs();

        let transport = Arc::new(StratumTransport::new(false));
        // a broken connection is noticed by the supervisor loop; nothing to
        // do here beyond letting the state go Sick
        transport.set_error_callback(Arc::new(|_err| {}));

        self.subscribe_to_difficulty_changes(&transport);
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
                return;
            }
        };
        let Some((extranonce1, extranonce2_size)) = parse_subscribe_reply(&result) else {
            warn!("ERROR Invalid response from stratum: {:?}", result);
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

    fn subscribe_to_difficulty_changes(self: &Arc<Self>, transport: &StratumTransport) {
        let weak = Arc::downgrade(self);
        transport.set_notification_handler(
            "mining.set_difficulty",
            Arc::new(move |params, _result| {
                let Some(client) = weak.upgrade() else { return };
                let Some(diff) = params.first().and_then(Value::as_f64) else {
                    warn!("ERROR Invalid difficulty supplied by stratum server");
                    return;
                };
                info!("Stratum server changed difficulty to {}", diff);
                client.set_difficulty(diff);
            }),
        );
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

    fn set_difficulty(&self, difficulty: f64) {
        let target = match difficulty_to_target(difficulty) {
            Ok(t) => t,
            Err(e) => {
                warn!("ERROR Error setting difficulty to {}: {}", difficulty, e);
                return;
            }
        };
        self.core.deprecate_outstanding_jobs();
        let mut inner = self.inner.lock().unwrap();
        inner.target = target;
        inner.difficulty = difficulty;
    }

    fn add_new_stratum_job(&self, job: GeneralJob) {
        let mut inner = self.inner.lock().unwrap();
        let clean = job.clean_jobs;
        let job_id = job.job_id.clone();
        inner.current_job = job;
        drop(inner);
        if clean {
            self.core.record_discard();
            self.core.deprecate_outstanding_jobs();
            self.core.fire_clean_job_event();
        }
        self.core.add_job_to_deprecate(&job_id);
    }
}

fn parse_subscribe_reply(result: &Value) -> Option<(Vec<u8>, usize)> {
    let reply = result.as_array()?;
    if reply.len() < 3 {
        return None;
    }
    let extranonce1 = hex::decode(reply[1].as_str()?).ok()?;
    let extranonce2_size = reply[2].as_u64()? as usize;
    Some((extranonce1, extranonce2_size))
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

/// Decode the 9-field mining.notify payload
fn parse_notify(params: &[Value], extranonce2_size: usize) -> Result<GeneralJob, ClientError> {
    if params.len() < 9 {
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
    let prev_hash = hex_param(params, 1, "prevhash")?;
    let coinbase1 = hex_param(params, 2, "coinb1")?;
    let coinbase2 = hex_param(params, 3, "coinb2")?;
    let merkle_branch = params[4]
        .as_array()
        .ok_or_else(|| {
            ClientError::BadNotification(
                "Wrong merkle_branch parameter supplied by stratum server".into(),
            )
        })?
        .iter()
        .map(|b| {
            b.as_str()
                .and_then(|s| hex::decode(s).ok())
                .ok_or_else(|| {
                    ClientError::BadNotification(
                        "Wrong merkle_branch parameter supplied by stratum server".into(),
                    )
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let version = hex_param(params, 5, "version")?;
    let nbits = hex_param(params, 6, "nbits")?;
    let ntime = hex_param(params, 7, "ntime")?;
    let clean_jobs = params[8].as_bool().ok_or_else(|| {
        ClientError::BadNotification("Wrong clean_jobs parameter supplied by stratum server".into())
    })?;

    Ok(GeneralJob {
        job_id,
        prev_hash,
        coinbase1,
        coinbase2,
        merkle_branch,
        version,
        nbits,
        ntime,
        clean_jobs,
        extra_nonce2: ExtraNonce2::new(extranonce2_size),
    })
}

#[async_trait]
impl Client for GeneralClient {
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
                    warn!("Pool sick, reconnecting");
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
        self.algo
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
            algo: self.algo.to_string(),
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

        // snapshot before the tick so the job carries the extranonce the
        // header was built with
        let job = inner.current_job.clone();
        let en2 = job.extra_nonce2.bytes();
        inner.current_job.extra_nonce2.increment();

        let target = inner.target;
        let difficulty = inner.difficulty;

        // the arbitrary transaction, folded against the merkle branches
        let mut arbtx = Vec::new();
        arbtx.extend_from_slice(&job.coinbase1);
        arbtx.extend_from_slice(&inner.extranonce1);
        arbtx.extend_from_slice(&en2);
        arbtx.extend_from_slice(&job.coinbase2);
        let mut merkle_root = sha256d(&arbtx).to_vec();
        for branch in &job.merkle_branch {
            let mut m = merkle_root;
            m.extend_from_slice(branch);
            merkle_root = sha256d(&m).to_vec();
        }

        let mut header = Vec::with_capacity(80 + 32);
        header.extend_from_slice(&job.version);
        header.extend_from_slice(&job.prev_hash);
        header.extend_from_slice(&rev_hash_words(&merkle_root));
        header.extend_from_slice(&job.ntime);
        header.extend_from_slice(&job.nbits);
        header.extend_from_slice(&[0, 0, 0, 0]);
        let mut header = rev_hash_words(&header);
        header.extend_from_slice(&target);

        Ok((
            MiningWork {
                header,
                offset: 0,
                target,
                difficulty,
                job: Job::General(job),
            },
            signal,
        ))
    }

    async fn submit(&self, nonce: &[u8], job: &Job) -> Result<(), ClientError> {
        let Job::General(sj) = job else {
            return Err(ClientError::WrongJob);
        };
        if nonce.len() < 8 {
            return Err(ClientError::Other("short nonce".into()));
        }
        let nonce_str = hex::encode(&nonce[4..]);
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

        let params = json!([self.user, sj.job_id, extranonce2, ntime, nonce_str]);
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

    fn test_client() -> Arc<GeneralClient> {
        Arc::new(GeneralClient::new(&PoolConfig {
            url: "stratum+tcp://dgb-odocrypt.example.com:11115".into(),
            user: "DEesW1UoEAUtM8mrwGHjfz1gdwPwqqRPzJ".into(),
            pass: "x".into(),
            algo: Algorithm::Odocrypt,
            active: true,
        }))
    }

    fn sample_notify() -> Vec<Value> {
        vec![
            json!("job-1"),
            json!("039949a3d2755f68eb1be7f06bc471e06dc1d0099d0af7fb00307eb700000000"),
            json!("01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff"),
            json!("ffffffff0100f2052a010000001976a914000000000000000000000000000000000000000088ac00000000"),
            json!(["d1f1022f58ef3bf019472955cb5ab02853ccb66dbdd2a77164dc46790ec31129"]),
            json!("00000020"),
            json!("1b304eb3"),
            json!("5a2a6b10"),
            json!(true),
        ]
    }

    #[test]
    fn test_parse_notify_shape() {
        let job = parse_notify(&sample_notify(), 4).unwrap();
        assert_eq!(job.job_id, "job-1");
        assert_eq!(job.prev_hash.len(), 32);
        assert_eq!(job.version, vec![0x00, 0x00, 0x00, 0x20]);
        assert_eq!(job.merkle_branch.len(), 1);
        assert!(job.clean_jobs);
        assert_eq!(job.extra_nonce2.size, 4);
    }

    #[test]
    fn test_parse_notify_rejects_short_params() {
        let mut params = sample_notify();
        params.truncate(5);
        assert!(parse_notify(&params, 4).is_err());
    }

    #[tokio::test]
    async fn test_get_work_before_notify_is_no_job() {
        let client = test_client();
        match client.get_work().await {
            Err(ClientError::NoJobYet) => {}
            other => panic!("expected NoJobYet, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_get_work_header_shape_and_extranonce_tick() {
        let client = test_client();
        client.set_difficulty(512.0);
        client.add_new_stratum_job(parse_notify(&sample_notify(), 4).unwrap());

        let (work1, signal) = client.get_work().await.unwrap();
        assert!(signal.is_some());
        // 80 reversed header bytes plus the 32-byte target
        assert_eq!(work1.header.len(), 112);
        assert_eq!(&work1.header[80..], &work1.target[..]);
        assert!((work1.difficulty - 512.0).abs() < f64::EPSILON);

        let (work2, _) = client.get_work().await.unwrap();
        // extranonce ticked, so the coinbase and the merkle root moved
        assert_ne!(work1.header[..80], work2.header[..80]);
        let Job::General(j1) = &work1.job else { unreachable!() };
        let Job::General(j2) = &work2.job else { unreachable!() };
        assert_eq!(j1.extra_nonce2.value, 0);
        assert_eq!(j2.extra_nonce2.value, 1);
    }

    #[tokio::test]
    async fn test_last_target_wins() {
        let client = test_client();
        client.add_new_stratum_job(parse_notify(&sample_notify(), 4).unwrap());
        client.set_difficulty(2.0);
        let t2 = difficulty_to_target(2.0).unwrap();
        assert_eq!(client.get_work().await.unwrap().0.target, t2);
        client.set_difficulty(4096.0);
        let t4096 = difficulty_to_target(4096.0).unwrap();
        assert_eq!(client.get_work().await.unwrap().0.target, t4096);
    }

    #[tokio::test]
    async fn test_clean_job_closes_outstanding_signals() {
        let client = test_client();
        let mut first = parse_notify(&sample_notify(), 4).unwrap();
        first.clean_jobs = false;
        client.add_new_stratum_job(first);
        let (_, signal) = client.get_work().await.unwrap();
        let signal = signal.unwrap();
        assert!(signal.has_changed().is_ok());

        let mut second = parse_notify(&sample_notify(), 4).unwrap();
        second.job_id = "job-2".into();
        second.clean_jobs = true;
        client.add_new_stratum_job(second);
        // the old signal is now closed, and work comes from the new job only
        assert!(signal.has_changed().is_err());
        let (work, _) = client.get_work().await.unwrap();
        assert_eq!(work.job.job_id(), "job-2");
    }
}

// Changelog:
// - v0.3.0: Weak handler captures; job snapshot carries the pre-tick
//   extranonce.
// - v0.2.0: Split out of the odocrypt client for reuse by skunk.
// - v0.1.0: Subscribe/authorize/notify and the reversed header build.
