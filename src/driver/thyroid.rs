// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/driver/thyroid.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// The Thyroid driver: time-slices one UART across up to N boards behind the
// mux, keeps every board supplied with fresh work, parses the framed nonce
// stream coming back and routes validated solutions to the active pool
// client. Six tasks cooperate: create-work, read-nonce, process-nonce,
// mine-poll, nonce-stats and the watchdog.
//
// A board gets work pushed, is left alone to traverse its nonce space, and
// is refreshed either by a clean-job flush or its own refresh deadline.
// Per-board deadlines keep one slow board from starving the rest.
//
// Tree Location:
// - src/driver/thyroid.rs (multiplexed FPGA driver)
// - Depends on: algo, client, core, stats, tokio

use crate::algo::{mining_funcs, MiningFuncs, SubmitPayload};
use crate::client::Client;
use crate::core::types::{Config, DriverStats};
use crate::core::{Algorithm, HardwareState, MiningWork, SingleNonce};
use crate::driver::board::BoardMux;
use crate::driver::framing::NonceCodec;
use crate::driver::{bitstream, open_port, read_nonce_packet, start_mine_packet};
use crate::driver::{PortReader, PortWriter};
use crate::stats::HashRate;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Mutex as TokioMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);
/// Effective hashes represented by one traversed nonce space
const FOUR_GIGA: f64 = 4_000_000_000.0;
/// Bound on concurrent share submissions; a nonce burst must not flood the
/// pool socket
const SUBMIT_WORKERS: usize = 4;

/// Allocate the next board job tag; wraps within 1..=255, zero is reserved
/// for line noise
fn next_board_job_id(prev: u8) -> u8 {
    (prev % 255) + 1
}

pub struct ThyroidConfig {
    pub device: String,
    pub baudrate: u32,
    pub mux_nums: usize,
    pub poll_delay: Duration,
    pub nonce_timeout: Duration,
    pub skip_slots: HashSet<usize>,
}

impl ThyroidConfig {
    pub fn from_config(cfg: &Config) -> Self {
        ThyroidConfig {
            device: cfg.device.clone(),
            baudrate: cfg.baudrate,
            mux_nums: cfg.muxnum.max(1),
            poll_delay: Duration::from_millis(cfg.polldelay.max(1)),
            nonce_timeout: Duration::from_millis(cfg.noncetimeout.max(1)),
            skip_slots: cfg.skipslots.iter().copied().collect(),
        }
    }
}

pub struct Thyroid {
    cfg: ThyroidConfig,
    client: StdMutex<Arc<dyn Client>>,
    funcs: StdMutex<Arc<dyn MiningFuncs>>,
    mux: Option<BoardMux>,

    writer: TokioMutex<Option<PortWriter>>,
    work_cache: StdMutex<HashMap<u8, MiningWork>>,
    job_board_map: StdMutex<HashMap<u8, usize>>,
    nonce_stats: StdMutex<HashMap<usize, u64>>,
    current_board: AtomicUsize,

    share_counter: AtomicU64,
    golden_nonce_counter: AtomicU64,
    wronghash_counter: AtomicU64,
    state: AtomicU8,
    hr: StdMutex<HashRate>,
    block_time_field: StdMutex<Vec<u8>>,

    feed_dog: StdMutex<Option<mpsc::Sender<()>>>,
    submit_sem: Arc<Semaphore>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Thyroid {
    pub fn new(cfg: ThyroidConfig, client: Arc<dyn Client>, mux: Option<BoardMux>) -> Self {
        let funcs: Arc<dyn MiningFuncs> = Arc::from(mining_funcs(client.algo_name()));
        Thyroid {
            cfg,
            client: StdMutex::new(client),
            funcs: StdMutex::new(funcs),
            mux,
            writer: TokioMutex::new(None),
            work_cache: StdMutex::new(HashMap::new()),
            job_board_map: StdMutex::new(HashMap::new()),
            nonce_stats: StdMutex::new(HashMap::new()),
            current_board: AtomicUsize::new(0),
            share_counter: AtomicU64::new(0),
            golden_nonce_counter: AtomicU64::new(0),
            wronghash_counter: AtomicU64::new(0),
            state: AtomicU8::new(HardwareState::Stopped as u8),
            hr: StdMutex::new(HashRate::new()),
            block_time_field: StdMutex::new(Vec::new()),
            feed_dog: StdMutex::new(None),
            submit_sem: Arc::new(Semaphore::new(SUBMIT_WORKERS)),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    /// Point the driver at another pool client; the adapter set follows the
    /// client's algorithm
    pub fn set_client(&self, client: Arc<dyn Client>) {
        *self.funcs.lock().unwrap() = Arc::from(mining_funcs(client.algo_name()));
        *self.client.lock().unwrap() = client;
    }

    fn active_client(&self) -> Arc<dyn Client> {
        self.client.lock().unwrap().clone()
    }

    fn active_funcs(&self) -> Arc<dyn MiningFuncs> {
        self.funcs.lock().unwrap().clone()
    }

    pub fn hardware_state(&self) -> HardwareState {
        HardwareState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn share_count(&self) -> u64 {
        self.share_counter.load(Ordering::Relaxed)
    }

    pub fn golden_nonce_count(&self) -> u64 {
        self.golden_nonce_counter.load(Ordering::Relaxed)
    }

    pub fn wronghash_count(&self) -> u64 {
        self.wronghash_counter.load(Ordering::Relaxed)
    }

    pub fn work_cache_len(&self) -> usize {
        self.work_cache.lock().unwrap().len()
    }

    /// Open the configured port and spawn the driver tasks. A port that
    /// cannot be opened leaves nothing to drive; that is the one fatal path.
    pub async fn start(self: &Arc<Self>) {
        let (reader, writer) = match open_port(&self.cfg.device, self.cfg.baudrate).await {
            Ok(halves) => halves,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        };
        // let the boards settle after the port toggles their lines
        tokio::time::sleep(Duration::from_millis(618)).await;
        self.start_with_port(reader, writer).await;
    }

    /// Spawn all driver tasks on an already open port
    pub async fn start_with_port(self: &Arc<Self>, reader: PortReader, writer: PortWriter) {
        info!("Starting thyroid driver");
        *self.writer.lock().await = Some(writer);
        self.state
            .store(HardwareState::Running as u8, Ordering::Relaxed);

        let (work_tx, work_rx) = mpsc::channel::<MiningWork>(1);
        let work_rx = Arc::new(TokioMutex::new(work_rx));
        let (clean_tx, clean_rx) = mpsc::channel::<bool>(1);
        let (nonce_tx, nonce_rx) = mpsc::channel::<SingleNonce>(100);
        let (feed_tx, feed_rx) = mpsc::channel::<()>(1);
        *self.feed_dog.lock().unwrap() = Some(feed_tx);

        // Register the stale-work drains on the active client. Clearing too
        // much work is fine; mining a deprecated job is not.
        let client = self.active_client();
        {
            let drain_rx = Arc::clone(&work_rx);
            client.set_deprecated_job_call(Arc::new(move |_job_id| {
                if let Ok(mut rx) = drain_rx.try_lock() {
                    while rx.try_recv().is_ok() {}
                }
            }));
            let clean_tx = clean_tx.clone();
            client.set_clean_job_event_call(Arc::new(move || {
                let _ = clean_tx.try_send(true);
            }));
        }

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(tokio::spawn(Arc::clone(self).create_work(work_tx)));
        tasks.push(tokio::spawn(Arc::clone(self).read_nonce(reader, nonce_tx)));
        tasks.push(tokio::spawn(Arc::clone(self).process_nonce(nonce_rx)));
        tasks.push(tokio::spawn(
            Arc::clone(self).mine_poll(Arc::clone(&work_rx), clean_rx),
        ));
        tasks.push(tokio::spawn(Arc::clone(self).nonce_statistic()));
        tasks.push(tokio::spawn(Arc::clone(self).watch_dog(feed_rx)));
    }

    pub async fn stop(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        *self.feed_dog.lock().unwrap() = None;
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.state
            .store(HardwareState::Stopped as u8, Ordering::Relaxed);
    }

    /// Pull work from the pool into the 1-deep dispatch channel. Odocrypt
    /// work additionally drives the ten-day bitstream rotation: no work
    /// flows while the fabric reprograms.
    async fn create_work(self: Arc<Self>, work_tx: mpsc::Sender<MiningWork>) {
        let mut odo_bucket = 0u32;
        loop {
            let client = self.active_client();
            let (work, _deprecation) = match client.get_work().await {
                Ok(w) => w,
                Err(e) => {
                    warn!("ERROR fetching work: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if client.algo_name() == Algorithm::Odocrypt && work.header.len() >= 72 {
                let field: [u8; 4] = work.header[68..72].try_into().unwrap();
                *self.block_time_field.lock().unwrap() = field.to_vec();
                let bucket = bitstream::odo_bucket(u32::from_le_bytes(field));
                if bucket != odo_bucket {
                    odo_bucket = bucket;
                    self.program_bitstream(None).await;
                }
            }

            if work_tx.send(work).await.is_err() {
                return;
            }
        }
    }

    /// Flash a bitstream; with no explicit path the name derives from the
    /// active algorithm (and for odocrypt, the blocktime bucket)
    pub async fn program_bitstream(&self, path: Option<&str>) {
        let algo = self.active_client().algo_name();
        let name = match path {
            Some(p) if !p.is_empty() => p.to_string(),
            _ if algo == Algorithm::Odocrypt => {
                let mut block_ts = None;
                for _ in 0..10 {
                    let field = self.block_time_field.lock().unwrap().clone();
                    if field.len() == 4 {
                        block_ts = Some(u32::from_le_bytes(field.try_into().unwrap()));
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                let ts = match block_ts {
                    Some(ts) => {
                        info!("timestamp source: blocktime, timestamp: {}", bitstream::odo_bucket(ts));
                        ts
                    }
                    None => {
                        let now = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_secs() as u32)
                            .unwrap_or(0);
                        warn!("timestamp source: miner's local time, timestamp: {}", bitstream::odo_bucket(now));
                        now
                    }
                };
                bitstream::bitstream_name(algo, Some(ts))
            }
            _ => bitstream::bitstream_name(algo, None),
        };

        self.state
            .store(HardwareState::Programming as u8, Ordering::Relaxed);
        if let Err(e) = bitstream::program_bit(&name).await {
            warn!("program bitstream {}: {}", name, e);
        }
        self.state
            .store(HardwareState::Running as u8, Ordering::Relaxed);
    }

    /// Frame nonces off the UART until the port dies
    async fn read_nonce(self: Arc<Self>, reader: PortReader, nonce_tx: mpsc::Sender<SingleNonce>) {
        debug!("start read nonce");
        let framing = self.active_funcs().nonce_framing();
        let mut framed = FramedRead::new(reader, NonceCodec::for_framing(framing));
        while let Some(item) = framed.next().await {
            match item {
                Ok(nonce) => {
                    let board = self.current_board.load(Ordering::Relaxed);
                    *self.nonce_stats.lock().unwrap().entry(board).or_insert(0) += 1;
                    debug!(
                        "Parsed Nonce BoardID={} JobID={} SingleNonce={}",
                        board,
                        nonce.job_id,
                        hex::encode_upper(nonce.nonce)
                    );
                    if nonce_tx.send(nonce).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!("UART read error: {}", e);
                    break;
                }
            }
        }
        debug!("Scanner exited.");
    }

    /// Match returned nonces with their cached work and hand them to the
    /// bounded submit pool. Unknown job ids are counted but go nowhere.
    async fn process_nonce(self: Arc<Self>, mut nonce_rx: mpsc::Receiver<SingleNonce>) {
        while let Some(nonce) = nonce_rx.recv().await {
            let cached = self.work_cache.lock().unwrap().get(&nonce.job_id).cloned();
            self.feed();
            self.golden_nonce_counter.fetch_add(1, Ordering::Relaxed);
            if let Some(work) = cached {
                if let Ok(permit) = Arc::clone(&self.submit_sem).acquire_owned().await {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.check_and_submit(nonce, work).await;
                        drop(permit);
                    });
                }
            }
        }
    }

    /// Rebuild the header, regenerate the hash, gate on the hardware zero
    /// threshold, then the pool difficulty, then submit
    async fn check_and_submit(self: Arc<Self>, nonce: SingleNonce, work: MiningWork) -> bool {
        let funcs = self.active_funcs();
        let client = self.active_client();

        let mut full_header = work.header.clone();
        full_header.extend_from_slice(&nonce.nonce);
        let hash = funcs.regen_hash(&full_header);
        debug!(
            "SubmitJob BlockHash={} Target={} Difficulty={}",
            hex::encode_upper(&hash),
            hex::encode_upper(work.target),
            work.difficulty
        );

        if hash.len() < 3 || hash[..3] != [0x00, 0x00, 0x00] {
            debug!(
                "SubmitJob WorkHeader={} BlockHash={}",
                hex::encode_upper(&full_header),
                hex::encode_upper(&hash)
            );
            info!("SubmitJob: Wrong Hash");
            self.wronghash_counter.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if funcs.diff_check(&hash, &work) {
            debug!("SubmitJob: Share found!");
            let payload: &[u8] = match funcs.submit_payload() {
                SubmitPayload::Nonce => &nonce.nonce,
                SubmitPayload::FullHeader => &full_header,
            };
            match client.submit(payload, &work.job).await {
                Ok(()) => {
                    info!("SubmitJob: Accepted! jobID={}", nonce.job_id);
                    self.share_counter.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    info!(
                        "SubmitJob: Error submitting solution jobID={}: {}",
                        nonce.job_id, e
                    );
                }
            }
        }
        self.wronghash_counter.store(0, Ordering::Relaxed);
        true
    }

    /// The scheduler: clean-job flushes preempt the round-robin; otherwise
    /// each board gets a polling tick, upgraded to a work refresh when its
    /// deadline lapses
    async fn mine_poll(
        self: Arc<Self>,
        work_rx: Arc<TokioMutex<mpsc::Receiver<MiningWork>>>,
        mut clean_rx: mpsc::Receiver<bool>,
    ) {
        let mut board_job_id: u8 = 0;
        let mut last_refresh: Vec<Instant> = (0..self.cfg.mux_nums)
            .map(|_| {
                Instant::now()
                    .checked_sub(self.cfg.nonce_timeout)
                    .unwrap_or_else(Instant::now)
            })
            .collect();

        loop {
            match clean_rx.try_recv() {
                Ok(_) => {
                    for board in 0..self.cfg.mux_nums {
                        self.single_miner_once(board, true, false, &mut board_job_id, &work_rx)
                            .await;
                        last_refresh[board] = Instant::now();
                    }
                }
                Err(TryRecvError::Empty) => {
                    for board in 0..self.cfg.mux_nums {
                        let timed_out =
                            last_refresh[board].elapsed() >= self.cfg.nonce_timeout;
                        self.single_miner_once(board, false, timed_out, &mut board_job_id, &work_rx)
                            .await;
                        if timed_out {
                            last_refresh[board] = Instant::now();
                        }
                    }
                }
                Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    /// One scheduler tick for one board. Consumes at least poll_delay so the
    /// UART never sees back-to-back mux flips.
    async fn single_miner_once(
        &self,
        board: usize,
        clean_job: bool,
        timed_out: bool,
        board_job_id: &mut u8,
        work_rx: &Arc<TokioMutex<mpsc::Receiver<MiningWork>>>,
    ) {
        let tick_start = Instant::now();
        self.current_board.store(board, Ordering::Relaxed);
        if self.cfg.mux_nums > 1 {
            if let Some(mux) = &self.mux {
                if let Err(e) = mux.select_console((board + 1) as u8) {
                    warn!("board mux: {}", e);
                }
                // let the levels settle before any byte hits the wire
                tokio::time::sleep(Duration::from_micros(1)).await;
            }
        }

        if !self.cfg.skip_slots.contains(&(board + 1)) {
            if !clean_job && !timed_out {
                // polling tick: strobe the nonce-read line only
                self.write_port(&read_nonce_packet()).await;
            } else {
                let work = match work_rx.try_lock() {
                    Ok(mut rx) => rx.try_recv().ok(),
                    Err(_) => None,
                };
                match work {
                    Some(work) => {
                        *board_job_id = next_board_job_id(*board_job_id);
                        {
                            // cache before the write so a fast echo finds it
                            let mut cache = self.work_cache.lock().unwrap();
                            if clean_job {
                                cache.clear();
                            }
                            cache.insert(*board_job_id, work.clone());
                        }
                        let funcs = self.active_funcs();
                        let header_packet =
                            funcs.construct_header_packets(&work.header, *board_job_id);
                        debug!(
                            "Write Packet BoardID={} jobID={} CleanJob={} Timeout={} Header={}",
                            board,
                            board_job_id,
                            clean_job,
                            timed_out,
                            hex::encode_upper(&work.header)
                        );
                        let mut frame = read_nonce_packet();
                        frame.extend_from_slice(&header_packet);
                        frame.extend_from_slice(&start_mine_packet());
                        self.write_port(&frame).await;
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        self.job_board_map
                            .lock()
                            .unwrap()
                            .insert(*board_job_id, board);
                    }
                    None => debug!("No work ready, continuing"),
                }
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < self.cfg.poll_delay {
            tokio::time::sleep(self.cfg.poll_delay - elapsed).await;
        }
    }

    async fn write_port(&self, bytes: &[u8]) {
        let mut guard = self.writer.lock().await;
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writer.write_all(bytes).await {
                warn!("port.Write: {}", e);
                return;
            }
            let _ = writer.flush().await;
        }
    }

    /// Once a second, weigh the fresh golden nonces by the algorithm's share
    /// difficulty and feed the hashrate ring
    async fn nonce_statistic(self: Arc<Self>) {
        let mut prev = 0u64;
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let client = self.active_client();
            let multiplier = client
                .algo_name()
                .nonce_weight(client.pool_stats().diff);
            let golden = self.golden_nonce_counter.load(Ordering::Relaxed);
            let weighted = golden.saturating_sub(prev) as f64 * multiplier;
            self.hr.lock().unwrap().add(weighted);
            prev = golden;
        }
    }

    async fn watch_dog(self: Arc<Self>, mut feed_rx: mpsc::Receiver<()>) {
        loop {
            match tokio::time::timeout(WATCHDOG_TIMEOUT, feed_rx.recv()).await {
                Ok(Some(())) => {
                    self.state
                        .store(HardwareState::Running as u8, Ordering::Relaxed);
                }
                Ok(None) => {
                    self.state
                        .store(HardwareState::Stopped as u8, Ordering::Relaxed);
                    return;
                }
                Err(_) => {
                    if self.hardware_state() != HardwareState::Programming {
                        self.state
                            .store(HardwareState::NoResponse as u8, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    fn feed(&self) {
        if let Some(tx) = self.feed_dog.lock().unwrap().clone() {
            let _ = tx.try_send(());
        }
    }

    /// Snapshot for the status surface
    pub async fn driver_stats(&self) -> DriverStats {
        let (one_min, five_min, one_hour) = {
            let hr = self.hr.lock().unwrap();
            (
                hr.recent_n_sum(60),
                hr.recent_n_sum(300),
                hr.recent_n_sum(3600),
            )
        };
        let status = self.hardware_state();
        let (temperature, voltage) = if status == HardwareState::Programming {
            ("-273.15".to_string(), "25K".to_string())
        } else {
            bitstream::read_sensors().await.unwrap_or_default()
        };
        DriverStats {
            name: "Thyroid",
            status,
            temperature,
            voltage,
            nonce_num: [one_min, five_min, one_hour],
            hashrate: [
                one_min * FOUR_GIGA / 60.0,
                five_min * FOUR_GIGA / 300.0,
                one_hour * FOUR_GIGA / 3600.0,
            ],
            nonce_stats: self.nonce_stats.lock().unwrap().clone(),
            algo: self.active_client().algo_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_job_id_wraps_and_skips_zero() {
        let mut id = 0u8;
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            id = next_board_job_id(id);
            assert_ne!(id, 0);
            seen.insert(id);
        }
        // the full 1..=255 space is used
        assert_eq!(seen.len(), 255);
        assert_eq!(next_board_job_id(255), 1);
        assert_eq!(next_board_job_id(254), 255);
    }

    #[test]
    fn test_config_floor_values() {
        let mut cfg = Config::default();
        cfg.polldelay = 0;
        cfg.noncetimeout = 0;
        cfg.muxnum = 0;
        let tc = ThyroidConfig::from_config(&cfg);
        assert_eq!(tc.mux_nums, 1);
        assert!(tc.poll_delay >= Duration::from_millis(1));
        assert!(tc.nonce_timeout >= Duration::from_millis(1));
    }
}

// Changelog:
// - v0.3.0: Per-board refresh deadlines, skipslots, bounded submit pool,
//   read-poll folded into the tick.
// - v0.2.0: Framing chosen by the adapter; work cache flushes on clean job.
// - v0.1.0: Initial port of the single-board loop.
