//! Shared test doubles and helpers for gateway integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use llmgate_core::{ClusterClient, Error, ReadinessProbe, Result, ServerStatus};

/// Recording cluster client; every create/delete lands in an ordered log.
#[derive(Default)]
pub struct MockCluster {
    events: Mutex<Vec<String>>,
    fail_create: AtomicBool,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn allow_creates(&self) {
        self.fail_create.store(false, Ordering::SeqCst);
    }

    /// Ordered log of lifecycle calls, e.g. `["create w-1", "delete w-0"]`
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn create_worker(&self, name: &str, _args: &[String]) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Cluster("creation refused by test".to_string()));
        }
        self.events.lock().unwrap().push(format!("create {}", name));
        Ok(())
    }

    async fn delete_worker(&self, name: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("delete {}", name));
        Ok(())
    }
}

/// Probe returning a fixed status, optionally after a delay.
pub struct StaticProbe {
    status: ServerStatus,
    delay: Duration,
}

impl StaticProbe {
    pub fn ready() -> Arc<Self> {
        Arc::new(Self {
            status: ServerStatus::Ready,
            delay: Duration::ZERO,
        })
    }

    pub fn ready_after(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status: ServerStatus::Ready,
            delay,
        })
    }

    pub fn never_ready() -> Arc<Self> {
        Arc::new(Self {
            status: ServerStatus::LoadingModel,
            delay: Duration::ZERO,
        })
    }
}

#[async_trait]
impl ReadinessProbe for StaticProbe {
    async fn probe(&self, _host: &str) -> ServerStatus {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.status
    }
}

/// Serve `router` on an ephemeral local port
pub async fn serve(router: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, handle)
}
