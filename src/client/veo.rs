// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/client/veo.rs
// Version: 0.2.1
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// Amoveo (VEO) client. The dialect replaces method strings with integer
// message ids, correlates calls on a fixed id, and ships opaque fields in
// base64. Work headers get two 4-byte random pads so the fabric searches a
// wider space; the randomness lives here and only here, so the header we
// cache is byte for byte the one the board mined on.
//
// Tree Location:
// - src/client/veo.rs (VEO pool client)
// - Depends on: stratum, core, base64, rand

use crate::client::{Client, ClientCore, ClientError, DeprecationSignal};
use crate::core::types::{PoolConfig, PoolStats, VeoJob};
use crate::core::{Algorithm, Job, MiningWork, PoolState};
use crate::stratum::{StratumError, StratumTransport};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tracing::{info, warn};

pub const METHOD_ID_SUBSCRIBE: i64 = 0;
pub const METHOD_ID_SUBMIT_WORK: i64 = 1;
pub const METHOD_ID_NEW_BLOCK_HASH: i64 = 2;
pub const METHOD_ID_NEW_JOB_DIFF: i64 = 3;

struct Inner {
    transport: Option<Arc<StratumTransport>>,
    difficulty: i64,
    current_job: VeoJob,
}

pub struct VeoClient {
    host: String,
    user: String,
    core: ClientCore,
    inner: StdMutex<Inner>,
    quit: AtomicBool,
}

fn field_str(result: &Option<Value>, key: &str) -> Option<String> {
    result
        .as_ref()?
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn field_i64(result: &Option<Value>, key: &str) -> Option<i64> {
    result.as_ref()?.get(key).and_then(Value::as_i64)
}

impl VeoClient {
    pub fn new(pool: &PoolConfig) -> Self {
        VeoClient {
            host: pool.host().to_string(),
            user: pool.user.clone(),
            core: ClientCore::new(),
            inner: StdMutex::new(Inner {
                transport: None,
                difficulty: 0,
                current_job: VeoJob::default(),
            }),
            quit: AtomicBool::new(false),
        }
    }

    async fn start_pool_conn(self: &Arc<Self>) {
        self.core.deprecate_outstanding_jobs();

        let transport = Arc::new(StratumTransport::new(true));
        transport.set_error_callback(Arc::new(|_err| {}));

        self.subscribe_to_difficulty_changes(&transport);
        self.subscribe_to_job_notifications(&transport);

        self.inner.lock().unwrap().transport = Some(Arc::clone(&transport));

        info!("Connecting to {}", self.host);
        if transport.dial(&self.host).await.is_err() {
            return;
        }
        // the pool replies with the first job through the notification path
        if let Err(e) = transport
            .call(METHOD_ID_SUBSCRIBE, json!({ "id": self.user }))
            .await
        {
            warn!("veo subscribe: {}", e);
        }
    }

    fn subscribe_to_difficulty_changes(self: &Arc<Self>, transport: &StratumTransport) {
        let weak = Arc::downgrade(self);
        transport.set_notification_handler(
            METHOD_ID_NEW_JOB_DIFF,
            Arc::new(move |_params, result| {
                let Some(client) = weak.upgrade() else { return };
                let Some(diff) = field_i64(&result, "jDiff") else { return };
                info!("Stratum server changed difficulty to {}", diff);
                client.set_difficulty(diff);
            }),
        );
    }

    fn subscribe_to_job_notifications(self: &Arc<Self>, transport: &StratumTransport) {
        let weak = Arc::downgrade(self);
        transport.set_notification_handler(
            METHOD_ID_NEW_BLOCK_HASH,
            Arc::new(move |_params, result| {
                let Some(client) = weak.upgrade() else { return };
                let Some(bhash) = field_str(&result, "bHash") else { return };
                if let Some(diff) = field_i64(&result, "jDiff") {
                    if diff != 0 {
                        info!("Stratum server changed difficulty to {}", diff);
                        client.set_difficulty(diff);
                    }
                }
                client.add_new_stratum_job(VeoJob {
                    job_id: bhash.clone(),
                    block_hash: bhash,
                });
            }),
        );
    }

    fn set_difficulty(&self, difficulty: i64) {
        self.core.deprecate_outstanding_jobs();
        self.inner.lock().unwrap().difficulty = difficulty;
    }

    fn add_new_stratum_job(&self, job: VeoJob) {
        // every new block hash obsoletes whatever came before, so each one
        // counts as a clean job
        let job_id = job.job_id.clone();
        self.inner.lock().unwrap().current_job = job;
        self.core.deprecate_outstanding_jobs();
        self.core.fire_clean_job_event();
        self.core.add_job_to_deprecate(&job_id);
    }
}

#[async_trait]
impl Client for VeoClient {
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
        Algorithm::Veo
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
            algo: Algorithm::Veo.to_string(),
            accept: self.core.accept.load(Ordering::Relaxed),
            reject: self.core.reject.load(Ordering::Relaxed),
            discard: self.core.discard.load(Ordering::Relaxed),
            diff: self.inner.lock().unwrap().difficulty as f64,
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
        let difficulty = inner.difficulty as f64;
        drop(inner);

        let block_hash = BASE64
            .decode(&job.block_hash)
            .map_err(|e| ClientError::BadNotification(format!("bad bHash: {}", e)))?;

        // two random pads widen the nonce space; the board echoes them back
        // inside the rebuilt header so they must not be regenerated anywhere
        let mut rng = rand::thread_rng();
        let mut pad1 = [0u8; 4];
        let mut pad2 = [0u8; 4];
        rng.fill_bytes(&mut pad1);
        rng.fill_bytes(&mut pad2);

        let mut header = Vec::with_capacity(48);
        header.extend_from_slice(&block_hash);
        header.extend_from_slice(&pad1);
        header.extend_from_slice(&[0, 0, 0, 0]);
        header.extend_from_slice(&pad2);
        header.extend_from_slice(&[0, 0, 0, 0]);

        Ok((
            MiningWork {
                header,
                offset: 0,
                target: [0u8; 32],
                difficulty,
                job: Job::Veo(job),
            },
            signal,
        ))
    }

    /// For VEO the driver hands over the full rebuilt header; the share is
    /// the base64 of bytes 32..55 of its 55-byte packed form
    async fn submit(&self, header: &[u8], job: &Job) -> Result<(), ClientError> {
        let Job::Veo(_) = job else {
            return Err(ClientError::WrongJob);
        };
        if header.len() < 56 {
            return Err(ClientError::Other("short veo header".into()));
        }
        let mut packed = Vec::with_capacity(55);
        packed.extend_from_slice(&header[..48]);
        packed.extend_from_slice(&header[49..56]);
        let nonce_encoded = BASE64.encode(&packed[32..55]);

        let transport = self
            .inner
            .lock()
            .unwrap()
            .transport
            .clone()
            .ok_or(StratumError::NotConnected)
            .map_err(ClientError::from)?;

        let params = json!({ "id": self.user, "nonce": nonce_encoded });
        match transport.call(METHOD_ID_SUBMIT_WORK, params).await {
            Ok(_) => {
                self.core.record_accept();
                Ok(())
            }
            Err(e) => {
                warn!("veo submit share err: {}", e);
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

    fn test_client() -> Arc<VeoClient> {
        Arc::new(VeoClient::new(&PoolConfig {
            url: "stratum+tcp://stratum.veopool.example:8086".into(),
            user: "BJP1y2bNVefilvrxu2YjK0PSRPcql.x86".into(),
            pass: String::new(),
            algo: Algorithm::Veo,
            active: true,
        }))
    }

    #[tokio::test]
    async fn test_header_layout_and_pads() {
        let client = test_client();
        let bhash = BASE64.encode([0xABu8; 32]);
        client.add_new_stratum_job(VeoJob {
            job_id: bhash.clone(),
            block_hash: bhash,
        });
        client.set_difficulty(8844);

        let (work, _) = client.get_work().await.unwrap();
        assert_eq!(work.header.len(), 48);
        assert_eq!(&work.header[..32], &[0xAB; 32]);
        // the two zero runs sit between the random pads
        assert_eq!(&work.header[36..40], &[0, 0, 0, 0]);
        assert_eq!(&work.header[44..48], &[0, 0, 0, 0]);
        assert!((work.difficulty - 8844.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_result_field_helpers() {
        let result = Some(json!({"bHash": "qqqq", "jDiff": 8844}));
        assert_eq!(field_str(&result, "bHash").as_deref(), Some("qqqq"));
        assert_eq!(field_i64(&result, "jDiff"), Some(8844));
        assert_eq!(field_i64(&None, "jDiff"), None);
    }
}

// Changelog:
// - v0.2.1: Randomness confined to get_work.
// - v0.2.0: Integer method ids via the MethodKey sum type.
// - v0.1.0: Initial Amoveo client.
