//! Worker health probing and readiness waiting
//!
//! A worker exposes `GET /health` returning a JSON object with at least a
//! `status` string. The prober classifies that response into a closed
//! [`ServerStatus`] enum; the replacement controller polls it until the
//! worker reports ready or the stall timeout fires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Health classification of a worker, as reported by its `/health` endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    /// Worker is serving
    Ready,
    /// Worker is up but all inference slots are busy
    NoSlotsAvailable,
    /// Worker is still loading the model
    LoadingModel,
    /// Worker did not answer the probe
    NotResponding,
    /// Any other status value, or a transport/decoding failure
    Error,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerStatus::Ready => "llm server ready",
            ServerStatus::NoSlotsAvailable => "llm busy - no slots available",
            ServerStatus::LoadingModel => "llm server loading model",
            ServerStatus::NotResponding => "llm server not responding",
            ServerStatus::Error => "llm server error",
        };
        f.write_str(s)
    }
}

/// Wire shape of the worker's `/health` response
#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,

    // Load/progress details, reported but not required for classification.
    #[serde(default)]
    slots_idle: i64,
    #[serde(default)]
    slots_processing: i64,
    #[serde(default)]
    error: String,
    #[serde(default)]
    progress: f32,
}

/// Readiness probing capability for a worker, keyed by its hostname.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Issue one health probe against `host` and classify the result.
    ///
    /// Transport failures classify as [`ServerStatus::Error`]; callers must
    /// treat them the same as an explicit error status ("not yet usable").
    async fn probe(&self, host: &str) -> ServerStatus;

    /// Poll [`probe`](Self::probe) every `poll_interval` until the worker
    /// reports ready, failing with [`Error::ReadinessTimeout`] once
    /// `stall_timeout` has elapsed since the call began.
    ///
    /// Non-ready statuses just cause another poll; the stall timeout is the
    /// only escape.
    async fn wait_until_ready(
        &self,
        host: &str,
        poll_interval: Duration,
        stall_timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        loop {
            if started.elapsed() >= stall_timeout {
                return Err(Error::ReadinessTimeout(host.to_string()));
            }
            match self.probe(host).await {
                ServerStatus::Ready => return Ok(()),
                status => {
                    tracing::debug!(worker = %host, %status, "Worker not ready yet");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}

/// HTTP health prober for workers
pub struct HealthProber {
    /// HTTP client
    client: reqwest::Client,

    /// Port the worker serves `/health` on
    port: u16,
}

impl HealthProber {
    /// Create a prober for workers serving on `port`
    pub fn new(port: u16) -> Result<Self> {
        Self::with_timeout(port, Duration::from_secs(10))
    }

    /// Create a prober with a custom per-probe request timeout
    pub fn with_timeout(port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, port })
    }

    async fn fetch_status(&self, host: &str) -> Result<HealthResponse> {
        let url = format!("http://{}:{}/health", host, self.port);
        let response = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        Ok(response.json::<HealthResponse>().await?)
    }
}

#[async_trait]
impl ReadinessProbe for HealthProber {
    async fn probe(&self, host: &str) -> ServerStatus {
        let health = match self.fetch_status(host).await {
            Ok(health) => health,
            Err(e) => {
                tracing::debug!(worker = %host, error = %e, "Health probe failed");
                return ServerStatus::Error;
            }
        };

        match health.status.as_str() {
            "ok" => ServerStatus::Ready,
            "no slot available" => ServerStatus::NoSlotsAvailable,
            "loading model" => ServerStatus::LoadingModel,
            other => {
                tracing::debug!(
                    worker = %host,
                    status = %other,
                    error = %health.error,
                    slots_idle = health.slots_idle,
                    slots_processing = health.slots_processing,
                    progress = health.progress,
                    "Worker reported unexpected health status"
                );
                ServerStatus::Error
            }
        }
    }
}
