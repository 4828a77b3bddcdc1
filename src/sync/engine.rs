//! Generic polling reconciliation engine.
//!
//! Each engine owns one worker task running fetch → compare → upsert ticks
//! separated by a fixed sleep. The comparison is made against the replica
//! snapshot kept in memory from the previous exchange, so a converged system
//! costs one source fetch per tick and no replica traffic.
//!
//! There is no retry: any error escaping a tick halts the loop and flips the
//! signal to stopped until `start()` is called again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::SyncError;

/// Caller-supplied behaviour for one kind of exchange.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    /// Short name used in logs and route prefixes.
    fn name(&self) -> &'static str;

    async fn fetch_source(&self) -> Result<Vec<Self::Item>, SyncError>;

    async fn fetch_replica(&self) -> Result<Vec<Self::Item>, SyncError>;

    fn is_equal(&self, source: &[Self::Item], replica: &[Self::Item]) -> bool;

    /// Bring the replica in line with `source`. Returns the replica as it
    /// stands after the writes.
    async fn insert(
        &self,
        source: &[Self::Item],
        replica: &[Self::Item],
    ) -> Result<Vec<Self::Item>, SyncError>;

    /// Whether this tick should do anything at all.
    fn should_fetch(&self, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// `true` when `now` falls in the UTC hour window `[start, end)`, or when no
/// window is configured.
pub fn within_active_hours(window: Option<(u32, u32)>, now: DateTime<Utc>) -> bool {
    match window {
        Some((start, end)) => (start..end).contains(&now.hour()),
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Running,
    Stopped,
}

/// Public view of an engine. Snapshots and timestamps stay internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub signal: Signal,
    pub poll_time_ms: u64,
    /// Result of the last comparison; `None` before the first one.
    pub is_equal: Option<bool>,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// `should_fetch` said no.
    Skipped,
    /// Source matched the in-memory replica snapshot.
    Unchanged,
    /// Replica was fetched and upserted.
    Exchanged { source: usize, replica: usize },
}

/// Object-safe control handle, used by the HTTP surface.
pub trait EngineControl: Send + Sync {
    fn name(&self) -> &'static str;
    fn start(&self);
    fn stop(&self);
    fn set_poll_time(&self, ms: u64);
    fn status(&self) -> EngineStatus;
}

const EQUAL_UNKNOWN: u8 = 0;
const EQUAL_FALSE: u8 = 1;
const EQUAL_TRUE: u8 = 2;

struct Inner<R: Reconciler> {
    reconciler: R,
    running: AtomicBool,
    poll_time_ms: AtomicU64,
    last_equal: AtomicU8,
    /// Replica snapshot from the last exchange. Only the worker touches it.
    snapshot: Mutex<Vec<R::Item>>,
    last_exchange_at: std::sync::Mutex<Option<DateTime<Utc>>>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Polling reconciliation loop over a `Reconciler`. Cheap to clone.
pub struct ReconciliationEngine<R: Reconciler> {
    inner: Arc<Inner<R>>,
}

impl<R: Reconciler> Clone for ReconciliationEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Reconciler> ReconciliationEngine<R> {
    pub fn new(reconciler: R, poll_time_ms: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                reconciler,
                running: AtomicBool::new(false),
                poll_time_ms: AtomicU64::new(poll_time_ms),
                last_equal: AtomicU8::new(EQUAL_UNKNOWN),
                snapshot: Mutex::new(Vec::new()),
                last_exchange_at: std::sync::Mutex::new(None),
                worker: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn reconciler(&self) -> &R {
        &self.inner.reconciler
    }

    /// Set the signal to running and spawn the worker unless one is alive.
    pub fn start(&self) {
        let mut worker = self.lock_worker();
        self.inner.running.store(true, Ordering::SeqCst);
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!(engine = self.name(), "Worker already active");
            return;
        }

        info!(
            engine = self.name(),
            poll_time_ms = self.inner.poll_time_ms.load(Ordering::Relaxed),
            "Reconciliation engine started"
        );
        let engine = self.clone();
        *worker = Some(tokio::spawn(async move { engine.run().await }));
    }

    /// Cooperative: the current tick and its sleep complete first.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            info!(engine = self.name(), "Reconciliation engine stopping");
        }
    }

    /// Takes effect from the next sleep.
    pub fn set_poll_time(&self, ms: u64) {
        self.inner.poll_time_ms.store(ms, Ordering::Relaxed);
        debug!(engine = self.name(), poll_time_ms = ms, "Poll time updated");
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            signal: if self.inner.running.load(Ordering::SeqCst) {
                Signal::Running
            } else {
                Signal::Stopped
            },
            poll_time_ms: self.inner.poll_time_ms.load(Ordering::Relaxed),
            is_equal: match self.inner.last_equal.load(Ordering::Relaxed) {
                EQUAL_TRUE => Some(true),
                EQUAL_FALSE => Some(false),
                _ => None,
            },
        }
    }

    pub fn last_exchange_at(&self) -> Option<DateTime<Utc>> {
        match self.inner.last_exchange_at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Run one fetch → compare → upsert cycle.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickOutcome, SyncError> {
        let reconciler = &self.inner.reconciler;
        if !reconciler.should_fetch(now) {
            return Ok(TickOutcome::Skipped);
        }

        let source = reconciler.fetch_source().await?;
        let mut snapshot = self.inner.snapshot.lock().await;

        let equal = reconciler.is_equal(&source, &snapshot);
        self.inner
            .last_equal
            .store(if equal { EQUAL_TRUE } else { EQUAL_FALSE }, Ordering::Relaxed);
        if equal {
            return Ok(TickOutcome::Unchanged);
        }

        let replica = reconciler.fetch_replica().await?;
        *snapshot = reconciler.insert(&source, &replica).await?;

        if let Ok(mut at) = self.inner.last_exchange_at.lock() {
            *at = Some(now);
        }
        Ok(TickOutcome::Exchanged {
            source: source.len(),
            replica: snapshot.len(),
        })
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.inner.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Exit decisions are taken under the worker lock so a concurrent
    /// `start()` either sees this worker alive and leaves it running, or sees
    /// no worker and spawns a fresh one.
    async fn run(self) {
        loop {
            if !self.inner.running.load(Ordering::SeqCst) {
                let mut worker = self.lock_worker();
                if !self.inner.running.load(Ordering::SeqCst) {
                    *worker = None;
                    info!(engine = self.name(), "Reconciliation engine stopped");
                    return;
                }
            }

            match self.tick(Utc::now()).await {
                Ok(TickOutcome::Exchanged { source, replica }) => {
                    info!(engine = self.name(), source, replica, "Replica reconciled");
                }
                Ok(outcome) => debug!(engine = self.name(), ?outcome, "Tick complete"),
                Err(e) => {
                    error!(engine = self.name(), error = %e, "Reconciliation halted");
                    let mut worker = self.lock_worker();
                    self.inner.running.store(false, Ordering::SeqCst);
                    *worker = None;
                    return;
                }
            }

            let ms = self.inner.poll_time_ms.load(Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl<R: Reconciler> EngineControl for ReconciliationEngine<R> {
    fn name(&self) -> &'static str {
        self.inner.reconciler.name()
    }

    fn start(&self) {
        ReconciliationEngine::start(self)
    }

    fn stop(&self) {
        ReconciliationEngine::stop(self)
    }

    fn set_poll_time(&self, ms: u64) {
        ReconciliationEngine::set_poll_time(self, ms)
    }

    fn status(&self) -> EngineStatus {
        ReconciliationEngine::status(self)
    }
}
