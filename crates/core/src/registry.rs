//! Active-worker registry with in-flight request accounting
//!
//! The registry is the single source of truth for which worker serves
//! traffic. Exactly one worker is active at any time; rotation replaces it
//! atomically via [`Registry::swap`]. Request accounting rides on an RAII
//! guard so the counter is decremented exactly once on every exit path,
//! including panics.

use std::ops::Deref;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::process::Child;

/// One backend worker instance.
///
/// The name doubles as the Kubernetes Job/Service name and the
/// DNS-resolvable hostname the proxy forwards to.
pub struct Worker {
    /// Worker name, derived from the rotation index
    name: String,

    /// Number of proxied requests currently in flight against this worker
    in_flight: AtomicI64,

    /// Companion watchdog process, exclusively owned by this worker
    watchdog: Mutex<Option<Child>>,
}

impl Worker {
    /// Create a worker with no watchdog attached
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_flight: AtomicI64::new(0),
            watchdog: Mutex::new(None),
        }
    }

    /// Worker name (Job name, Service name, and proxy target hostname)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current number of in-flight requests
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Take ownership of the spawned watchdog child process
    pub fn attach_watchdog(&self, child: Child) {
        *self.watchdog.lock() = Some(child);
    }

    /// Kill the companion watchdog, if one was spawned.
    ///
    /// Called before deleting the worker's cluster resources so the
    /// watchdog does not race the controller on the same deletion.
    pub fn cancel_watchdog(&self) {
        if let Some(mut child) = self.watchdog.lock().take() {
            if let Err(e) = child.start_kill() {
                tracing::warn!(worker = %self.name, error = %e, "Failed to kill watchdog");
            }
        }
    }

    fn begin_request(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn end_request(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// RAII handle pairing a worker reference with one in-flight request.
///
/// Returned by [`Registry::active`]; the counter increment it carries is
/// released exactly once when the guard drops, whichever way the request
/// ends.
pub struct InFlightGuard {
    worker: Arc<Worker>,
}

impl InFlightGuard {
    /// The worker this request is accounted against
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }
}

impl Deref for InFlightGuard {
    type Target = Worker;

    fn deref(&self) -> &Worker {
        &self.worker
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.worker.end_request();
    }
}

/// Process-wide registry of the single active worker.
pub struct Registry {
    /// Current active worker; swapped atomically during rotation
    active: RwLock<Arc<Worker>>,

    /// Next rotation index
    next_index: AtomicU64,
}

impl Registry {
    /// Create a registry around the worker provisioned at startup.
    ///
    /// `next_index` starts one past the initial worker's index.
    pub fn new(initial: Arc<Worker>, next_index: u64) -> Self {
        Self {
            active: RwLock::new(initial),
            next_index: AtomicU64::new(next_index),
        }
    }

    /// Return the active worker with its in-flight counter incremented.
    ///
    /// The increment happens under the same lock that [`swap`](Self::swap)
    /// takes exclusively, so once a swap returns no further increments can
    /// land on the previous worker and its counter is monotonically
    /// non-increasing from that point.
    pub fn active(&self) -> InFlightGuard {
        let active = self.active.read();
        let worker = Arc::clone(&active);
        worker.begin_request();
        drop(active);
        InFlightGuard { worker }
    }

    /// Atomically install `new` as the active worker, returning the old one.
    pub fn swap(&self, new: Arc<Worker>) -> Arc<Worker> {
        let mut active = self.active.write();
        std::mem::replace(&mut *active, new)
    }

    /// Allocate the next rotation index
    pub fn next_index(&self) -> u64 {
        self.next_index.fetch_add(1, Ordering::SeqCst)
    }
}
