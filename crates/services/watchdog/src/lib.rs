//! Per-worker watchdog
//!
//! One watchdog process runs per worker, spawned by the gateway and bound
//! to that worker's name. It polls whether its parent (the gateway) is
//! still alive; once the parent is gone it deletes the worker's Job and
//! Service and exits. This keeps a crashed gateway from leaving orphaned
//! cluster resources behind: each live worker carries its own reaper,
//! outside the process tree whose death it cleans up after.

use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use llmgate_core::ClusterClient;

/// Check whether `pid` is alive via a signal-0 probe.
///
/// EPERM means the process exists but belongs to another user, which still
/// counts as alive.
pub fn parent_alive(pid: Pid) -> bool {
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Parent-liveness monitor bound to one worker.
pub struct Watchdog {
    /// Worker whose cluster resources this watchdog owns cleanup for
    worker: String,

    /// The gateway process, captured at spawn time
    parent: Pid,

    cluster: Arc<dyn ClusterClient>,

    /// Delay between liveness checks
    poll_interval: Duration,
}

impl Watchdog {
    /// Create a watchdog for `worker`, monitoring `parent`
    pub fn new(
        worker: impl Into<String>,
        parent: Pid,
        cluster: Arc<dyn ClusterClient>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker: worker.into(),
            parent,
            cluster,
            poll_interval,
        }
    }

    /// Poll until the parent dies, then remove the worker's cluster
    /// footprint. Returns once cleanup has been attempted.
    pub async fn run(&self) {
        tracing::info!(
            worker = %self.worker,
            parent = self.parent.as_raw(),
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "Watchdog started"
        );

        while parent_alive(self.parent) {
            tokio::time::sleep(self.poll_interval).await;
        }

        tracing::warn!(
            worker = %self.worker,
            parent = self.parent.as_raw(),
            "Parent process died; removing worker resources"
        );
        self.cleanup().await;
    }

    /// Delete the worker's Job and Service, best-effort.
    pub async fn cleanup(&self) {
        if let Err(e) = self.cluster.delete_worker(&self.worker).await {
            tracing::error!(worker = %self.worker, error = %e, "Orphan cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llmgate_core::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCluster {
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl ClusterClient for CountingCluster {
        async fn create_worker(&self, _name: &str, _args: &[String]) -> Result<()> {
            Ok(())
        }

        async fn delete_worker(&self, name: &str) -> Result<()> {
            assert_eq!(name, "llm-runner-3");
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn own_pid() -> Pid {
        nix::unistd::getpid()
    }

    /// A pid above the kernel's default pid_max, guaranteed unoccupied.
    fn dead_pid() -> Pid {
        Pid::from_raw(i32::MAX)
    }

    #[test]
    fn test_own_process_is_alive() {
        assert!(parent_alive(own_pid()));
    }

    #[test]
    fn test_init_is_alive_despite_eperm() {
        // Signalling pid 1 as an unprivileged user yields EPERM, which must
        // still classify as alive.
        assert!(parent_alive(Pid::from_raw(1)));
    }

    #[test]
    fn test_nonexistent_pid_is_dead() {
        assert!(!parent_alive(dead_pid()));
    }

    #[test]
    fn test_reaped_child_is_dead() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let pid = Pid::from_raw(child.id() as i32);
        child.wait().expect("reap child");

        assert!(!parent_alive(pid));
    }

    #[tokio::test]
    async fn test_dead_parent_triggers_one_cleanup() {
        let cluster = Arc::new(CountingCluster::default());
        let watchdog = Watchdog::new(
            "llm-runner-3",
            dead_pid(),
            cluster.clone(),
            Duration::from_millis(10),
        );

        watchdog.run().await;
        assert_eq!(cluster.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_live_parent_triggers_no_cleanup() {
        let cluster = Arc::new(CountingCluster::default());
        let watchdog = Watchdog::new(
            "llm-runner-3",
            own_pid(),
            cluster.clone(),
            Duration::from_millis(10),
        );

        let result =
            tokio::time::timeout(Duration::from_millis(100), watchdog.run()).await;
        assert!(result.is_err(), "watchdog must keep polling a live parent");
        assert_eq!(cluster.deletes.load(Ordering::SeqCst), 0);
    }
}
