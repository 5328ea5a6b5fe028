// Thyrox Miner - Free and Open Source Software Statement
//
// This project, thyrox-miner, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/client/mod.rs
// Version: 0.3.0
// Developer: Thyrox Team <dev@thyrox-miner.org>
//
// The uniform pool-client interface the driver mines against, the shared
// job-deprecation registry, and the per-algorithm client factory. A client
// owns its transport and its current job; both are replaced atomically on
// reconnect or on a fresh notify.
//
// Tree Location:
// - src/client/mod.rs (client trait + shared state)
// - Submodules: general, ckb, trb, veo, verus, xdag
// - Depends on: async-trait, tokio, thiserror

pub mod ckb;
pub mod general;
pub mod trb;
pub mod veo;
pub mod verus;
pub mod xdag;

use crate::core::types::{PoolConfig, PoolStats};
use crate::core::{Algorithm, Job, MiningWork, PoolState};
use crate::stratum::StratumError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No job received from stratum server yet")]
    NoJobYet,
    #[error("bad notification: {0}")]
    BadNotification(String),
    #[error("wrong job type for this client")]
    WrongJob,
    #[error(transparent)]
    Stratum(#[from] StratumError),
    #[error("{0}")]
    Other(String),
}

/// One-shot broadcast that closes when a job goes stale. Every listener
/// observes the closure; nobody ever sends a value.
pub type DeprecationSignal = watch::Receiver<()>;

/// Fired once per deprecated job id
pub type DeprecatedJobCall = Arc<dyn Fn(&str) + Send + Sync>;

/// Fired when outstanding jobs were flushed and boards need fresh work now
pub type CleanJobEventCall = Arc<dyn Fn() + Send + Sync>;

/// Shared client state: the deprecation registry, the driver upcalls and the
/// share counters. Every client variant embeds one.
#[derive(Default)]
pub struct ClientCore {
    deprecations: StdMutex<HashMap<String, watch::Sender<()>>>,
    deprecated_job_call: StdMutex<Option<DeprecatedJobCall>>,
    clean_job_event_call: StdMutex<Option<CleanJobEventCall>>,
    pub accept: AtomicI32,
    pub reject: AtomicI32,
    pub discard: AtomicI32,
    pub last_accept: AtomicI64,
}

impl ClientCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every open deprecation signal and fire the per-job upcall for
    /// each. Closing too eagerly is fine; mining a stale job is the thing to
    /// avoid.
    pub fn deprecate_outstanding_jobs(&self) {
        let drained: Vec<(String, watch::Sender<()>)> = {
            let mut map = self.deprecations.lock().unwrap();
            map.drain().collect()
        };
        let call = self.deprecated_job_call.lock().unwrap().clone();
        for (job_id, sender) in drained {
            // dropping the sender closes the signal for all listeners
            drop(sender);
            if let Some(call) = &call {
                call(&job_id);
            }
        }
    }

    /// Fire the clean-job upcall. Only the notify path calls this, and only
    /// when the pool flags clean_jobs; difficulty pushes and reconnects
    /// deprecate work without demanding an immediate redispatch.
    pub fn fire_clean_job_event(&self) {
        let clean = self.clean_job_event_call.lock().unwrap().clone();
        if let Some(clean) = clean {
            clean();
        }
    }

    /// Register a job to be deprecated when its time comes
    pub fn add_job_to_deprecate(&self, job_id: &str) {
        let (tx, _rx) = watch::channel(());
        self.deprecations.lock().unwrap().insert(job_id.to_string(), tx);
    }

    /// The signal that closes when the given job is deprecated
    pub fn deprecation_signal(&self, job_id: &str) -> Option<DeprecationSignal> {
        self.deprecations
            .lock()
            .unwrap()
            .get(job_id)
            .map(|tx| tx.subscribe())
    }

    pub fn open_deprecations(&self) -> usize {
        self.deprecations.lock().unwrap().len()
    }

    pub fn set_deprecated_job_call(&self, call: DeprecatedJobCall) {
        *self.deprecated_job_call.lock().unwrap() = Some(call);
    }

    pub fn set_clean_job_event_call(&self, call: CleanJobEventCall) {
        *self.clean_job_event_call.lock().unwrap() = Some(call);
    }

    pub fn record_accept(&self) {
        self.accept.fetch_add(1, Ordering::Relaxed);
        self.last_accept.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            Ordering::Relaxed,
        );
    }

    pub fn record_reject(&self) {
        self.reject.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self) {
        self.discard.fetch_add(1, Ordering::Relaxed);
    }
}

/// The uniform interface between a pool and the driver
#[async_trait]
pub trait Client: Send + Sync {
    /// Connect and babysit the connection: every 5 seconds inspect the pool
    /// state; Dead sleeps 30 s then redials, Sick closes and redials.
    async fn start(self: Arc<Self>);

    /// Signal the supervisor loop to exit and drop the transport
    async fn stop(&self);

    fn algo_name(&self) -> Algorithm;

    fn pool_state(&self) -> PoolState;

    fn pool_stats(&self) -> PoolStats;

    /// Fresh work derived from the current job. NoJobYet until the first
    /// notification; each call ticks ExtraNonce2 so headers never repeat.
    async fn get_work(&self) -> Result<(MiningWork, Option<DeprecationSignal>), ClientError>;

    /// Report a solved nonce for the job that produced it
    async fn submit(&self, nonce: &[u8], job: &Job) -> Result<(), ClientError>;

    fn core(&self) -> &ClientCore;

    fn set_deprecated_job_call(&self, call: DeprecatedJobCall) {
        self.core().set_deprecated_job_call(call);
    }

    fn set_clean_job_event_call(&self, call: CleanJobEventCall) {
        self.core().set_clean_job_event_call(call);
    }
}

/// Build the right client for a configured pool
pub fn new_client(pool: &PoolConfig) -> Arc<dyn Client> {
    match pool.algo {
        Algorithm::Odocrypt | Algorithm::Skunk => Arc::new(general::GeneralClient::new(pool)),
        Algorithm::Ckb => Arc::new(ckb::CkbClient::new(pool)),
        Algorithm::Trb => Arc::new(trb::TrbClient::new(pool)),
        Algorithm::Veo => Arc::new(veo::VeoClient::new(pool)),
        Algorithm::Verus => Arc::new(verus::VerusClient::new(pool)),
        Algorithm::Xdag => Arc::new(xdag::XdagClient::new(pool)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_deprecation_closes_all_signals() {
        let core = ClientCore::new();
        core.add_job_to_deprecate("a");
        core.add_job_to_deprecate("b");
        let sig_a = core.deprecation_signal("a").unwrap();
        let sig_b = core.deprecation_signal("b").unwrap();
        assert!(!sig_a.has_changed().is_err());

        core.deprecate_outstanding_jobs();
        // closed signals report an error from has_changed
        assert!(sig_a.has_changed().is_err());
        assert!(sig_b.has_changed().is_err());
        assert_eq!(core.open_deprecations(), 0);
    }

    #[test]
    fn test_deprecation_fires_upcalls() {
        let core = ClientCore::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let cleaned = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            core.set_deprecated_job_call(Arc::new(move |_job| {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }
        {
            let cleaned = Arc::clone(&cleaned);
            core.set_clean_job_event_call(Arc::new(move || {
                cleaned.fetch_add(1, Ordering::SeqCst);
            }));
        }
        core.add_job_to_deprecate("x");
        core.add_job_to_deprecate("y");
        core.deprecate_outstanding_jobs();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        // flushing the registry alone never demands a redispatch
        assert_eq!(cleaned.load(Ordering::SeqCst), 0);
        core.fire_clean_job_event();
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_job_has_no_signal() {
        let core = ClientCore::new();
        assert!(core.deprecation_signal("nope").is_none());
    }
}

// Changelog:
// - v0.3.1: Clean-job upcall split off the registry flush; only a notify
//   with clean_jobs set fires it.
// - v0.3.0: Registry flush fires the per-job deprecation upcalls.
// - v0.2.0: watch-channel deprecation signals; factory covers all variants.
// - v0.1.0: Trait extraction from the first two clients.
