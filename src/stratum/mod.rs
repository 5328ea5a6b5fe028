// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/stratum/mod.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// The stratum transport: one TCP peer speaking line-delimited JSON-RPC with
// request/response correlation, server notifications, a liveness watchdog
// and pool-state classification. The go standard library equivalent was not
// enough for the original either; notifications are the whole point here.
//
// A transport is single-use: create, install handlers, dial, call, close.
// Reconnecting means building a fresh one, which keeps every per-connection
// resource owned by exactly one instance.
//
// Tree Location:
// - src/stratum/mod.rs (transport runtime)
// - Submodules: message
// - Depends on: tokio, serde_json, thiserror

pub mod message;

use crate::core::PoolState;
use message::{Inbound, MethodKey, Request};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DIAL_ATTEMPTS: usize = 6;
const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const CALL_TIMEOUT: Duration = Duration::from_secs(10);
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);
const WATCHDOG_TIMEOUT_LONG_POLL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum StratumError {
    #[error("TCP Dial Failed, pool has been dead")]
    ConnectFailed,
    #[error("Timeout")]
    Timeout,
    #[error("stratum server error: {0}")]
    Rpc(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Handles one server notification: positional params plus the raw result
/// field (the VEO dialect tucks object payloads in there)
pub type NotificationHandler = Arc<dyn Fn(Vec<Value>, Option<Value>) + Send + Sync>;

/// Invoked for errors that require dropping the client and building a new one
pub type ErrorCallback = Arc<dyn Fn(&StratumError) + Send + Sync>;

type PendingMap = Arc<StdMutex<HashMap<u64, oneshot::Sender<Result<Value, StratumError>>>>>;

pub struct StratumTransport {
    /// VEO-style long poll: fixed call id 2 and a lazy watchdog
    long_poll: bool,
    state: Arc<AtomicU8>,
    seq: AtomicU64,
    pending: PendingMap,
    handlers: StdMutex<Option<HashMap<MethodKey, NotificationHandler>>>,
    error_callback: StdMutex<Option<ErrorCallback>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    feed: StdMutex<Option<mpsc::Sender<()>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl StratumTransport {
    pub fn new(long_poll: bool) -> Self {
        StratumTransport {
            long_poll,
            state: Arc::new(AtomicU8::new(PoolState::NotReady as u8)),
            seq: AtomicU64::new(0),
            pending: Arc::new(StdMutex::new(HashMap::new())),
            handlers: StdMutex::new(Some(HashMap::new())),
            error_callback: StdMutex::new(None),
            writer: Mutex::new(None),
            feed: StdMutex::new(None),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    pub fn pool_state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, s: PoolState) {
        self.state.store(s as u8, Ordering::Relaxed);
    }

    /// Register a handler for a notification method. Install every handler
    /// before dial; the table freezes when the read loop starts.
    pub fn set_notification_handler<K: Into<MethodKey>>(
        &self,
        method: K,
        handler: NotificationHandler,
    ) {
        if let Some(map) = self.handlers.lock().unwrap().as_mut() {
            map.insert(method.into(), handler);
        }
    }

    pub fn set_error_callback(&self, cb: ErrorCallback) {
        *self.error_callback.lock().unwrap() = Some(cb);
    }

    fn dispatch_error(&self, err: &StratumError) {
        let cb = self.error_callback.lock().unwrap().clone();
        if let Some(cb) = cb {
            cb(err);
        }
    }

    /// Connect to a stratum+tcp host. Up to six attempts, five seconds each;
    /// success spawns the read loop and the watchdog. Failure is reported
    /// both ways: returned and via the error callback.
    pub async fn dial(self: &Arc<Self>, host: &str) -> Result<(), StratumError> {
        self.set_state(PoolState::NotReady);
        for attempt in 0..DIAL_ATTEMPTS {
            match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(host)).await {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    let (read_half, write_half) = stream.into_split();
                    *self.writer.lock().await = Some(write_half);

                    let (feed_tx, feed_rx) = mpsc::channel(1);
                    *self.feed.lock().unwrap() = Some(feed_tx);

                    let handlers = Arc::new(
                        self.handlers
                            .lock()
                            .unwrap()
                            .take()
                            .unwrap_or_default(),
                    );
                    self.set_state(PoolState::Alive);

                    let mut tasks = self.tasks.lock().unwrap();
                    tasks.push(tokio::spawn(watchdog(
                        Arc::clone(&self.state),
                        feed_rx,
                        self.long_poll,
                    )));
                    tasks.push(tokio::spawn(read_loop(
                        read_half,
                        Arc::clone(self),
                        handlers,
                    )));
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("TCP Dial err (attempt {}): {}", attempt + 1, e);
                }
                Err(_) => {
                    warn!("TCP Dial timeout (attempt {})", attempt + 1);
                }
            }
        }
        let err = StratumError::ConnectFailed;
        warn!("{}", err);
        self.set_state(PoolState::Dead);
        self.dispatch_error(&err);
        Err(err)
    }

    /// Release the connection. Idempotent; pending calls observe closure and
    /// surface as timeouts to their callers.
    pub async fn close(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.pending.lock().unwrap().clear();
        *self.feed.lock().unwrap() = None;
    }

    /// Invoke a remote method and wait for its reply. Ten seconds, then
    /// Timeout; a server error field comes back as Rpc with its message.
    pub async fn call<K: Into<MethodKey>>(
        &self,
        method: K,
        params: Value,
    ) -> Result<Value, StratumError> {
        let id = if self.long_poll {
            // the VEO dialect correlates everything on a fixed id
            2
        } else {
            self.seq.fetch_add(1, Ordering::Relaxed) + 1
        };
        let line = Request::new(&method.into(), params, id).to_line()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            let writer = match writer.as_mut() {
                Some(w) => w,
                None => {
                    self.pending.lock().unwrap().remove(&id);
                    return Err(StratumError::NotConnected);
                }
            };
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                self.set_state(PoolState::Sick);
                self.pending.lock().unwrap().remove(&id);
                warn!("Socket Write Error: {}", e);
                return Err(e.into());
            }
        }
        debug!("[Stratum --->] {}", line.trim_end());

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            // sender dropped: connection torn down under us
            Ok(Err(_)) => Err(StratumError::Timeout),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(StratumError::Timeout)
            }
        }
    }
}

async fn watchdog(state: Arc<AtomicU8>, mut feed_rx: mpsc::Receiver<()>, long_poll: bool) {
    let timeout = if long_poll {
        WATCHDOG_TIMEOUT_LONG_POLL
    } else {
        WATCHDOG_TIMEOUT
    };
    loop {
        match tokio::time::timeout(timeout, feed_rx.recv()).await {
            Ok(Some(())) => state.store(PoolState::Alive as u8, Ordering::Relaxed),
            Ok(None) => return,
            Err(_) => state.store(PoolState::Sick as u8, Ordering::Relaxed),
        }
    }
}

/// Reads lines until an io or deserialization error, feeding the watchdog and
/// dispatching every message as it lands
async fn read_loop(
    read_half: OwnedReadHalf,
    transport: Arc<StratumTransport>,
    handlers: Arc<HashMap<MethodKey, NotificationHandler>>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                transport.set_state(PoolState::Sick);
                transport.dispatch_error(&StratumError::Protocol("connection closed".into()));
                return;
            }
            Err(e) => {
                transport.set_state(PoolState::Sick);
                transport.dispatch_error(&StratumError::Io(e));
                return;
            }
        };
        if let Some(feed) = transport.feed.lock().unwrap().clone() {
            let _ = feed.try_send(());
        }
        debug!("[Stratum <---] {}", line);

        let inbound: Inbound = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(e) => {
                transport.set_state(PoolState::Sick);
                transport.dispatch_error(&StratumError::Json(e));
                return;
            }
        };
        transport.set_state(PoolState::Alive);

        let id = inbound.call_id();
        if id != 0 {
            let pending = transport.pending.lock().unwrap().remove(&id);
            if let Some(tx) = pending {
                let reply = match inbound.error_message() {
                    Some(msg) => Err(StratumError::Rpc(msg)),
                    None => Ok(inbound.result.clone().unwrap_or(Value::Null)),
                };
                let _ = tx.send(reply);
            }
            continue;
        }
        if let Some(key) = inbound.method_key() {
            if let Some(handler) = handlers.get(&key) {
                handler(inbound.params_list(), inbound.result.clone());
            }
        }
    }
}

// Changelog:
// - v0.3.0: Single-use transports; close() drains pending calls.
// - v0.2.0: Long-poll watchdog window, fixed-id dialect for VEO.
// - v0.1.0: Dial/call/notify with the 30 second watchdog.
