// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/client/trb.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// TRB (Tellor) stratum client. The pool hands out a 32-byte keccak challenge
// and its 20-byte payout address; the share check is modular against the
// job's jdiff rather than a byte-compare against a target.
//
// Tree Location:
// - src/client/trb.rs (TRB pool client)
// - Depends on: stratum, core, serde_json

use crate::client::{Client, ClientCore, ClientError, DeprecationSignal};
use crate::core::difficulty::{difficulty_to_target, Target};
use crate::core::types::{PoolConfig, PoolStats, TrbJob};
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
    difficulty: f64,
    current_job: TrbJob,
}

pub struct TrbClient {
    host: String,
    user: String,
    password: String,
    core: ClientCore,
    inner: StdMutex<Inner>,
    quit: AtomicBool,
}

impl TrbClient {
    pub fn new(pool: &PoolConfig) -> Self {
        TrbClient {
            host: pool.host().to_string(),
            user: pool.user.clone(),
            password: pool.pass.clone(),
            core: ClientCore::new(),
            inner: StdMutex::new(Inner {
                transport: None,
                difficulty: 0.0,
                current_job: TrbJob::default(),
            }),
            quit: AtomicBool::new(false),
        }
    }

    async fn start_pool_conn(self: &Arc<Self>) {
        self.core.deprecate_outstanding_jobs();

        let transport = Arc::new(StratumTransport::new(false));
        transport.set_error_callback(Arc::new(|_err| {}));

        self.subscribe_to_difficulty_changes(&transport);
        self.subscribe_to_job_notifications(&transport);

        self.inner.lock().unwrap().transport = Some(Arc::clone(&transport));

        info!("Connecting to {}", self.host);
        if transport.dial(&self.host).await.is_err() {
            return;
        }
        if let Err(e) = transport
            .call("mining.subscribe", json!(["thyrox-miner"]))
            .await
        {
            warn!("ERROR Error in response from stratum: {}", e);
            return;
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
                client.core.deprecate_outstanding_jobs();
                client.inner.lock().unwrap().difficulty = diff;
            }),
        );
    }

    fn subscribe_to_job_notifications(self: &Arc<Self>, transport: &StratumTransport) {
        let weak = Arc::downgrade(self);
        transport.set_notification_handler(
            "mining.notify",
            Arc::new(move |params, _result| {
                let Some(client) = weak.upgrade() else { return };
                match parse_notify(&params) {
                    Ok(job) => client.add_new_stratum_job(job),
                    Err(e) => warn!("ERROR {}", e),
                }
            }),
        );
    }

    fn add_new_stratum_job(&self, job: TrbJob) {
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

/// Notify layout: job id, 32-byte challenge, 20-byte pool address, jdiff,
/// clean flag
fn parse_notify(params: &[Value]) -> Result<TrbJob, ClientError> {
    if params.len() < 5 {
        return Err(ClientError::BadNotification(
            "Wrong number of parameters supplied by stratum server".into(),
        ));
    }
    let job_id = params[0]
        .as_str()
        .ok_or_else(|| ClientError::BadNotification("Wrong job_id parameter".into()))?
        .to_string();
    let challenge = params[1]
        .as_str()
        .and_then(|s| hex::decode(s).ok())
        .filter(|b| b.len() == 32)
        .ok_or_else(|| ClientError::BadNotification("Wrong challenge parameter".into()))?;
    let pool_addr = params[2]
        .as_str()
        .and_then(|s| hex::decode(s).ok())
        .filter(|b| b.len() == 20)
        .ok_or_else(|| ClientError::BadNotification("Wrong pool address parameter".into()))?;
    let jdiff = params[3]
        .as_i64()
        .ok_or_else(|| ClientError::BadNotification("Wrong jDiff parameter".into()))?;
    let clean_jobs = params[4]
        .as_bool()
        .ok_or_else(|| ClientError::BadNotification("Wrong clean_jobs parameter".into()))?;

    Ok(TrbJob {
        job_id,
        challenge,
        pool_addr,
        jdiff,
        clean_jobs,
    })
}

#[async_trait]
impl Client for TrbClient {
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
        Algorithm::Trb
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
            algo: Algorithm::Trb.to_string(),
            accept: self.core.accept.load(Ordering::Relaxed),
            reject: self.core.reject.load(Ordering::Relaxed),
            discard: self.core.discard.load(Ordering::Relaxed),
            diff: self.inner.lock().unwrap().difficulty,
            last_accepted: self.core.last_accept.load(Ordering::Relaxed),
            active: false,
        }
    }

    async fn get_work(&self) -> Result<(MiningWork, Option<DeprecationSignal>), ClientError> {
        let inner = self.inner.lock().unwrap();
        if inner.current_job.job_id.is_empty() {
            return Err(ClientError::NoJobYet);
        }
        let signal = self.core.deprecation_signal(&inner.current_job.job_id);
        let job = inner.current_job.clone();
        let difficulty = inner.difficulty;
        let target: Target = if difficulty > 0.0 {
            difficulty_to_target(difficulty).unwrap_or([0u8; 32])
        } else {
            [0u8; 32]
        };

        // header as received: challenge then the payout address
        let mut header = Vec::with_capacity(52);
        header.extend_from_slice(&job.challenge);
        header.extend_from_slice(&job.pool_addr);

        Ok((
            MiningWork {
                header,
                offset: 0,
                target,
                difficulty,
                job: Job::Trb(job),
            },
            signal,
        ))
    }

    async fn submit(&self, nonce: &[u8], job: &Job) -> Result<(), ClientError> {
        let Job::Trb(sj) = job else {
            return Err(ClientError::WrongJob);
        };
        let transport = self
            .inner
            .lock()
            .unwrap()
            .transport
            .clone()
            .ok_or(StratumError::NotConnected)
            .map_err(ClientError::from)?;

        let params = json!([self.user, sj.job_id, hex::encode(nonce)]);
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

    #[test]
    fn test_parse_notify_field_sizes() {
        let params = vec![
            json!("trb-1"),
            json!("4c2adcc59d69789a5d37d5ba95a81c76eb117b86335036b145ed08a8801ea4d0"),
            json!("7f97009879cbbbcbd6ca0ced94644d25be4bef15"),
            json!(4),
            json!(false),
        ];
        let job = parse_notify(&params).unwrap();
        assert_eq!(job.challenge.len(), 32);
        assert_eq!(job.pool_addr.len(), 20);
        assert_eq!(job.jdiff, 4);
    }

    #[tokio::test]
    async fn test_header_is_challenge_then_address() {
        let client = Arc::new(TrbClient::new(&PoolConfig {
            url: "stratum+tcp://trb.example.cn:11002".into(),
            user: "0x23aebde41bab8a5688422582d0faecbf0f84bf67.1".into(),
            pass: "x".into(),
            algo: Algorithm::Trb,
            active: true,
        }));
        let challenge =
            hex::decode("4c2adcc59d69789a5d37d5ba95a81c76eb117b86335036b145ed08a8801ea4d0")
                .unwrap();
        let addr = hex::decode("7f97009879cbbbcbd6ca0ced94644d25be4bef15").unwrap();
        client.add_new_stratum_job(TrbJob {
            job_id: "trb-1".into(),
            challenge: challenge.clone(),
            pool_addr: addr.clone(),
            jdiff: 1000,
            clean_jobs: false,
        });
        let (work, _) = client.get_work().await.unwrap();
        assert_eq!(work.header.len(), 52);
        assert_eq!(&work.header[..32], &challenge[..]);
        assert_eq!(&work.header[32..], &addr[..]);
    }
}

// Changelog:
// - v0.2.0: jdiff travels with the job; modular check moved to the adapter.
// - v0.1.0: Initial TRB client.
