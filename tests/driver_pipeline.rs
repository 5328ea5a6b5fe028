// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: tests/driver_pipeline.rs
// Version: 0.2.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// End-to-end driver run against an in-memory port: work gets dispatched with
// a tagged job id, a framed nonce comes back, and the rebuilt header reaches
// the client's submit path. Nonces with unknown tags are counted and
// dropped.
//
// Tree Location:
// - tests/driver_pipeline.rs (thyroid pipeline integration test)
// - Depends on: driver, client, core, tokio

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thyrox_miner::client::{Client, ClientCore, ClientError, DeprecationSignal};
use thyrox_miner::core::types::PoolStats;
use thyrox_miner::core::{Algorithm, Job, MiningWork, PoolState};
use thyrox_miner::driver::thyroid::{Thyroid, ThyroidConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

const WORK_HEADER_LEN: usize = 144;

/// A pool client that serves one fixed piece of xdag-style work and records
/// everything submitted to it
struct FixedWorkClient {
    core: ClientCore,
    submit_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl FixedWorkClient {
    fn new(submit_tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        FixedWorkClient {
            core: ClientCore::new(),
            submit_tx,
        }
    }

    fn work_header() -> Vec<u8> {
        (0..WORK_HEADER_LEN).map(|i| i as u8).collect()
    }
}

#[async_trait]
impl Client for FixedWorkClient {
    async fn start(self: Arc<Self>) {}

    async fn stop(&self) {}

    fn algo_name(&self) -> Algorithm {
        Algorithm::Xdag
    }

    fn pool_state(&self) -> PoolState {
        PoolState::Alive
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            status: PoolState::Alive,
            user: "test".into(),
            pool_addr: "test://".into(),
            algo: Algorithm::Xdag.to_string(),
            accept: 0,
            reject: 0,
            discard: 0,
            diff: 1.0,
            last_accepted: 0,
            active: true,
        }
    }

    async fn get_work(&self) -> Result<(MiningWork, Option<DeprecationSignal>), ClientError> {
        Ok((
            MiningWork {
                header: Self::work_header(),
                offset: 0,
                target: [0u8; 32],
                difficulty: 1.0,
                job: Job::Xdag,
            },
            None,
        ))
    }

    async fn submit(&self, payload: &[u8], _job: &Job) -> Result<(), ClientError> {
        let _ = self.submit_tx.send(payload.to_vec());
        Ok(())
    }

    fn core(&self) -> &ClientCore {
        &self.core
    }
}

fn test_config() -> ThyroidConfig {
    ThyroidConfig {
        device: String::new(),
        baudrate: 115_200,
        mux_nums: 1,
        poll_delay: Duration::from_millis(5),
        nonce_timeout: Duration::from_millis(200),
        skip_slots: HashSet::new(),
    }
}

/// Pull bytes off the far end of the port until a job-id register write
/// shows up, returning the tag the driver assigned
async fn wait_for_job_tag(rx: &mut mpsc::UnboundedReceiver<u8>, window: &mut Vec<u8>) -> u8 {
    loop {
        let byte = rx.recv().await.expect("port closed");
        window.push(byte);
        let n = window.len();
        if n >= 6
            && window[n - 6] == 0x06
            && window[n - 5] == 0x30
            && window[n - 4..n - 1] == [0x89, 0xAB, 0xCD]
        {
            return window[n - 1];
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dispatch_nonce_return_and_submit() {
    let (driver_side, test_side) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(driver_side);

    let (submit_tx, mut submit_rx) = mpsc::unbounded_channel();
    let client = Arc::new(FixedWorkClient::new(submit_tx));
    let driver = Arc::new(Thyroid::new(test_config(), client.clone(), None));
    driver
        .start_with_port(Box::new(reader), Box::new(writer))
        .await;

    // drain what the driver writes; surface it byte by byte
    let (byte_tx, mut byte_rx) = mpsc::unbounded_channel();
    let (mut far_reader, mut far_writer) = tokio::io::split(test_side);
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        loop {
            match far_reader.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    for b in &buf[..n] {
                        let _ = byte_tx.send(*b);
                    }
                }
            }
        }
    });

    let mut window = Vec::new();
    let tag = tokio::time::timeout(
        Duration::from_secs(5),
        wait_for_job_tag(&mut byte_rx, &mut window),
    )
    .await
    .expect("driver never dispatched work");
    assert_ne!(tag, 0);
    assert!(driver.work_cache_len() >= 1);
    assert!(driver.work_cache_len() <= 255);

    // a legacy frame answering with that tag
    let nonce = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04];
    let mut frame = vec![0u8; 8];
    frame.push(1);
    frame.push(tag);
    frame.extend_from_slice(&nonce);
    far_writer.write_all(&frame).await.unwrap();
    far_writer.flush().await.unwrap();

    let submitted = tokio::time::timeout(Duration::from_secs(5), submit_rx.recv())
        .await
        .expect("nonce never reached submit")
        .unwrap();

    // the xdag adapter submits the full rebuilt header
    let mut expected = FixedWorkClient::work_header();
    expected.extend_from_slice(&nonce);
    assert_eq!(submitted, expected);
    assert!(driver.golden_nonce_count() >= 1);
    assert_eq!(driver.share_count(), 1);

    // an unknown tag is counted but never submitted
    let golden_before = driver.golden_nonce_count();
    let mut stray = vec![0u8; 8];
    stray.push(1);
    stray.push(200); // never dispatched
    stray.extend_from_slice(&nonce);
    far_writer.write_all(&stray).await.unwrap();
    far_writer.flush().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while driver.golden_nonce_count() == golden_before {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stray nonce never counted");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(driver.share_count(), 1, "stray tag must not submit");

    driver.stop().await;
}
