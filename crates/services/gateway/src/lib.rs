//! llmgate gateway
//!
//! Reverse proxy fronting a single LLM inference worker running inside a
//! Kubernetes Job, with zero-downtime worker replacement.
//!
//! # Architecture
//!
//! ```text
//! client ──▶ proxy (axum) ──reads──▶ Registry ──▶ active worker Job
//!                                       ▲
//! POST /replace ──▶ ReplacementController
//!                     │ provision new Job+Service (ClusterClient)
//!                     │ wait until /health reports ready
//!                     │ swap Registry, drain old worker
//!                     └ retire old Job+Service
//! ```
//!
//! Each worker gets a companion `llmgate-watchdog` process that removes the
//! worker's cluster resources if this process dies before retiring it.

pub mod api;
pub mod launch;
pub mod proxy;
pub mod replace;
