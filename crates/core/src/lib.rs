//! Shared control-plane types for llmgate
//!
//! llmgate fronts a single stateful LLM inference worker (running inside a
//! Kubernetes Job) with a local reverse proxy, and can replace that worker
//! in place without dropping client requests. This crate holds the pieces
//! shared between the gateway and the per-worker watchdog:
//!
//! - [`registry`]: the active-worker registry with in-flight accounting
//! - [`health`]: worker readiness probing (`GET /health` classification)
//! - [`cluster`]: the Job/Service lifecycle client for the Kubernetes API
//! - [`config`]: TOML/env configuration
//! - [`error`]: common error type

pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod registry;

pub use cluster::{ClusterClient, KubeClient};
pub use config::Config;
pub use error::{Error, Result};
pub use health::{HealthProber, ReadinessProbe, ServerStatus};
pub use registry::{InFlightGuard, Registry, Worker};
