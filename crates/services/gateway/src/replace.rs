//! Zero-downtime worker replacement
//!
//! One rotation at a time: provision a new worker Job + Service, wait until
//! its `/health` reports ready, swap it into the registry, drain the old
//! worker's in-flight requests, then delete the old worker's resources.
//! Requests keep flowing against the pre-rotation worker the whole time;
//! the only serialization point is the registry swap itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use llmgate_core::config::ClusterConfig;
use llmgate_core::{ClusterClient, Error, ReadinessProbe, Registry, Result, Worker};

/// Result of a rotation trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// A full rotation ran; `worker` is now active
    Completed { worker: String },

    /// Another rotation already held the lock; this trigger was a no-op
    InProgress,
}

/// Provisions workers: cluster resources plus the companion watchdog.
pub struct WorkerSpawner {
    cluster: Arc<dyn ClusterClient>,

    /// Worker names are `<prefix>-<rotation index>`
    prefix: String,

    /// Command line passed to the worker Job
    launch_args: Vec<String>,

    /// Watchdog binary; no watchdog is spawned when unset
    watchdog_bin: Option<String>,
}

impl WorkerSpawner {
    /// Create a spawner
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        config: &ClusterConfig,
        launch_args: Vec<String>,
        watchdog_bin: Option<String>,
    ) -> Self {
        Self {
            cluster,
            prefix: config.worker_prefix.clone(),
            launch_args,
            watchdog_bin,
        }
    }

    /// Provision the worker for `index`: create its Job and Service, then
    /// spawn its watchdog bound to the worker name.
    pub async fn start(&self, index: u64) -> Result<Arc<Worker>> {
        let name = format!("{}-{}", self.prefix, index);
        self.cluster.create_worker(&name, &self.launch_args).await?;

        let worker = Arc::new(Worker::new(name));
        if let Some(bin) = &self.watchdog_bin {
            let child = match Command::new(bin).arg(worker.name()).spawn() {
                Ok(child) => child,
                Err(e) => {
                    // The Job and Service already exist; tear them back down
                    // rather than strand a worker nothing tracks.
                    self.teardown(&worker).await;
                    return Err(Error::Other(format!(
                        "failed to spawn watchdog {}: {}",
                        bin, e
                    )));
                }
            };
            worker.attach_watchdog(child);
        }

        tracing::info!(worker = %worker.name(), "Worker provisioned");
        Ok(worker)
    }

    /// Provision the worker for `index` and block until its `/health`
    /// reports ready. A worker that never becomes ready is torn back down
    /// before the error surfaces; its watchdog only reacts to the death of
    /// this process, which is the wrong trigger here.
    pub async fn start_ready(
        &self,
        index: u64,
        prober: &dyn ReadinessProbe,
        poll_interval: Duration,
        stall_timeout: Duration,
    ) -> Result<Arc<Worker>> {
        let worker = self.start(index).await?;

        if let Err(e) = prober
            .wait_until_ready(worker.name(), poll_interval, stall_timeout)
            .await
        {
            tracing::error!(worker = %worker.name(), error = %e, "Worker never became ready");
            self.teardown(&worker).await;
            return Err(e);
        }

        Ok(worker)
    }

    async fn teardown(&self, worker: &Worker) {
        worker.cancel_watchdog();
        if let Err(e) = self.cluster.delete_worker(worker.name()).await {
            tracing::warn!(worker = %worker.name(), error = %e, "Cleanup of unusable worker failed");
        }
    }
}

/// Orchestrates worker rotation, single-flight.
pub struct ReplacementController {
    registry: Arc<Registry>,
    cluster: Arc<dyn ClusterClient>,
    prober: Arc<dyn ReadinessProbe>,
    spawner: WorkerSpawner,

    /// Readiness poll interval
    poll_interval: Duration,

    /// Give up on a never-ready worker after this long
    stall_timeout: Duration,

    /// Drain poll interval on the retiring worker
    drain_poll_interval: Duration,

    /// Replacement lock; a trigger arriving while held is a no-op
    in_progress: AtomicBool,
}

impl ReplacementController {
    /// Create a controller
    pub fn new(
        registry: Arc<Registry>,
        cluster: Arc<dyn ClusterClient>,
        prober: Arc<dyn ReadinessProbe>,
        spawner: WorkerSpawner,
        poll_interval: Duration,
        stall_timeout: Duration,
        drain_poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            cluster,
            prober,
            spawner,
            poll_interval,
            stall_timeout,
            drain_poll_interval,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Run one rotation, unless one is already running.
    pub async fn replace(&self) -> Result<RotationOutcome> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("Rotation already in progress; ignoring trigger");
            return Ok(RotationOutcome::InProgress);
        }

        let result = self.rotate().await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn rotate(&self) -> Result<RotationOutcome> {
        let index = self.registry.next_index();
        let new_worker = self
            .spawner
            .start_ready(
                index,
                self.prober.as_ref(),
                self.poll_interval,
                self.stall_timeout,
            )
            .await?;

        let old_worker = self.registry.swap(Arc::clone(&new_worker));
        tracing::info!(
            old = %old_worker.name(),
            new = %new_worker.name(),
            "Swapped active worker"
        );

        // No lookup can reach the old worker after the swap, so this count
        // only falls.
        loop {
            let in_flight = old_worker.in_flight();
            if in_flight == 0 {
                break;
            }
            tracing::debug!(worker = %old_worker.name(), in_flight, "Draining retiring worker");
            tokio::time::sleep(self.drain_poll_interval).await;
        }

        old_worker.cancel_watchdog();
        self.cluster.delete_worker(old_worker.name()).await?;
        tracing::info!(worker = %old_worker.name(), "Retired worker");

        Ok(RotationOutcome::Completed {
            worker: new_worker.name().to_string(),
        })
    }
}
