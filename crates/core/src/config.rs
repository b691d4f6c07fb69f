//! Configuration for the llmgate gateway and watchdog
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for llmgate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Proxy listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Kubernetes worker lifecycle configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Worker readiness probing
    #[serde(default)]
    pub health: HealthConfig,

    /// Worker rotation behavior
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Per-worker watchdog behavior
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

/// Proxy listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the proxy listener to
    #[serde(default = "default_host")]
    pub host: String,

    /// Proxy listener port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Port the worker serves health and inference on
    #[serde(default = "default_worker_port")]
    pub worker_port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_worker_port() -> u16 {
    57156
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            listen_port: default_listen_port(),
            worker_port: default_worker_port(),
        }
    }
}

/// Kubernetes worker lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Namespace the worker Jobs and Services live in
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Container image for the worker Job
    #[serde(default = "default_image")]
    pub image: String,

    /// Entrypoint command inside the worker image
    #[serde(default = "default_command")]
    pub command: String,

    /// PersistentVolumeClaim holding the model files, mounted at /mnt/models
    #[serde(default = "default_models_claim")]
    pub models_claim: String,

    /// Prefix for worker names (the rotation index is appended)
    #[serde(default = "default_worker_prefix")]
    pub worker_prefix: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_image() -> String {
    "llmgate/llm-runner".to_string()
}

fn default_command() -> String {
    "./run-runner.sh".to_string()
}

fn default_models_claim() -> String {
    "models".to_string()
}

fn default_worker_prefix() -> String {
    "llm-runner".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            image: default_image(),
            command: default_command(),
            models_claim: default_models_claim(),
            worker_prefix: default_worker_prefix(),
        }
    }
}

/// Worker readiness probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Delay between readiness polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for readiness after this many seconds
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Per-request timeout for a single health probe in seconds
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_stall_timeout_secs() -> u64 {
    3600 // 60 minutes
}

fn default_probe_timeout_secs() -> u64 {
    10
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl HealthConfig {
    /// Readiness poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stall timeout as a [`Duration`]
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

/// Worker rotation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Delay between drain polls on the retiring worker in milliseconds
    #[serde(default = "default_drain_poll_interval_ms")]
    pub drain_poll_interval_ms: u64,

    /// Watchdog binary spawned alongside each worker. When unset, no
    /// watchdog process is spawned.
    #[serde(default = "default_watchdog_bin")]
    pub watchdog_bin: Option<String>,
}

fn default_drain_poll_interval_ms() -> u64 {
    1000
}

fn default_watchdog_bin() -> Option<String> {
    Some("llmgate-watchdog".to_string())
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            drain_poll_interval_ms: default_drain_poll_interval_ms(),
            watchdog_bin: default_watchdog_bin(),
        }
    }
}

impl RotationConfig {
    /// Drain poll interval as a [`Duration`]
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }
}

/// Per-worker watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Delay between parent-liveness checks in seconds
    #[serde(default = "default_watchdog_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_watchdog_poll_interval_secs() -> u64 {
    60
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_watchdog_poll_interval_secs(),
        }
    }
}

impl WatchdogConfig {
    /// Liveness poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cluster: ClusterConfig::default(),
            health: HealthConfig::default(),
            rotation: RotationConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        // Server
        if let Ok(port) = std::env::var("LLMGATE_LISTEN_PORT") {
            if let Ok(p) = port.parse() {
                config.server.listen_port = p;
            }
        }
        if let Ok(port) = std::env::var("LLMGATE_WORKER_PORT") {
            if let Ok(p) = port.parse() {
                config.server.worker_port = p;
            }
        }
        if let Ok(host) = std::env::var("LLMGATE_HOST") {
            config.server.host = host;
        }

        // Cluster
        if let Ok(ns) = std::env::var("LLMGATE_NAMESPACE") {
            config.cluster.namespace = ns;
        }
        if let Ok(image) = std::env::var("LLMGATE_IMAGE") {
            config.cluster.image = image;
        }
        if let Ok(claim) = std::env::var("LLMGATE_MODELS_CLAIM") {
            config.cluster.models_claim = claim;
        }

        // Health
        if let Ok(timeout) = std::env::var("LLMGATE_STALL_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                config.health.stall_timeout_secs = t;
            }
        }

        // Rotation
        if let Ok(bin) = std::env::var("LLMGATE_WATCHDOG_BIN") {
            config.rotation.watchdog_bin = if bin.is_empty() { None } else { Some(bin) };
        }

        // Watchdog
        if let Ok(interval) = std::env::var("LLMGATE_WATCHDOG_INTERVAL_SECS") {
            if let Ok(i) = interval.parse() {
                config.watchdog.poll_interval_secs = i;
            }
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
