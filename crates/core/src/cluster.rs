//! Kubernetes lifecycle client for worker Jobs and Services
//!
//! A worker is one Job (running the inference image) plus one Service of
//! the same name exposing its port; the Service name is the DNS hostname
//! the proxy forwards to. The API surface used is small enough that this
//! client talks to the Kubernetes REST API directly over HTTPS with the
//! pod's service-account credentials.

use async_trait::async_trait;
use serde_json::json;

use crate::config::ClusterConfig;
use crate::error::{Error, Result};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Worker lifecycle capability against the cluster scheduler.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create the Job and Service backing worker `name`, running the worker
    /// image with `args`.
    async fn create_worker(&self, name: &str, args: &[String]) -> Result<()>;

    /// Delete worker `name`'s Job and Service.
    ///
    /// Both deletions are attempted independently; a missing resource is
    /// not an error.
    async fn delete_worker(&self, name: &str) -> Result<()>;
}

/// [`ClusterClient`] implementation over the Kubernetes REST API
pub struct KubeClient {
    /// HTTP client (carries the cluster CA root when running in-cluster)
    client: reqwest::Client,

    /// API server base URL, e.g. `https://10.96.0.1:443`
    base_url: String,

    /// Service-account bearer token, absent in tests
    token: Option<String>,

    /// Namespace the worker resources live in
    namespace: String,

    /// Worker image, entrypoint, and volume settings
    config: ClusterConfig,

    /// Port the worker container serves on
    worker_port: u16,
}

impl KubeClient {
    /// Build a client from the in-cluster environment.
    ///
    /// Reads the API server address from `KUBERNETES_SERVICE_HOST`/`_PORT`
    /// and the bearer token plus CA certificate from the service-account
    /// mount.
    pub fn from_cluster_env(config: ClusterConfig, worker_port: u16) -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| Error::Config("KUBERNETES_SERVICE_HOST not set; not running in-cluster".to_string()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT_HTTPS")
            .or_else(|_| std::env::var("KUBERNETES_SERVICE_PORT"))
            .unwrap_or_else(|_| "443".to_string());
        let base_url = format!("https://{}:{}", host, port);

        let token = std::fs::read_to_string(format!("{}/token", SERVICE_ACCOUNT_DIR))
            .map(|t| t.trim().to_string())
            .map_err(|e| Error::Config(format!("failed to read service account token: {}", e)))?;

        let mut builder = reqwest::Client::builder();
        match std::fs::read(format!("{}/ca.crt", SERVICE_ACCOUNT_DIR)) {
            Ok(pem) => {
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| Error::Config(format!("invalid cluster CA certificate: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cluster CA certificate unavailable");
            }
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url,
            token: Some(token),
            namespace: config.namespace.clone(),
            config,
            worker_port,
        })
    }

    /// Build a client against an explicit API server URL, without
    /// service-account credentials. Intended for tests.
    pub fn with_base_url(
        base_url: impl Into<String>,
        config: ClusterConfig,
        worker_port: u16,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: None,
            namespace: config.namespace.clone(),
            config,
            worker_port,
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn job_url(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => format!(
                "{}/apis/batch/v1/namespaces/{}/jobs/{}",
                self.base_url, self.namespace, name
            ),
            None => format!(
                "{}/apis/batch/v1/namespaces/{}/jobs",
                self.base_url, self.namespace
            ),
        }
    }

    fn service_url(&self, name: Option<&str>) -> String {
        match name {
            Some(name) => format!(
                "{}/api/v1/namespaces/{}/services/{}",
                self.base_url, self.namespace, name
            ),
            None => format!(
                "{}/api/v1/namespaces/{}/services",
                self.base_url, self.namespace
            ),
        }
    }

    fn job_body(&self, name: &str, args: &[String]) -> serde_json::Value {
        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "name": name },
            "spec": {
                "template": {
                    "metadata": {
                        "labels": { "app": name }
                    },
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            "name": name,
                            "image": self.config.image,
                            "command": [self.config.command],
                            "args": args,
                            "ports": [{ "containerPort": self.worker_port }],
                            "volumeMounts": [{
                                "name": "models",
                                "mountPath": "/mnt/models"
                            }]
                        }],
                        "volumes": [{
                            "name": "models",
                            "persistentVolumeClaim": {
                                "claimName": self.config.models_claim
                            }
                        }]
                    }
                }
            }
        })
    }

    fn service_body(&self, name: &str) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "name": name },
            "spec": {
                "selector": { "app": name },
                "ports": [{
                    "protocol": "TCP",
                    "port": self.worker_port,
                    "targetPort": self.worker_port
                }]
            }
        })
    }

    async fn create(&self, kind: &str, url: String, body: serde_json::Value) -> Result<()> {
        let response = self.request(reqwest::Method::POST, url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Cluster(format!(
                "creating {} failed: {} {}",
                kind, status, detail
            )));
        }
        Ok(())
    }

    /// Issue one DELETE; 404 counts as success.
    async fn delete(&self, kind: &str, url: String, body: Option<serde_json::Value>) -> Result<()> {
        let mut builder = self.request(reqwest::Method::DELETE, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Cluster(format!(
                "deleting {} failed: {} {}",
                kind, status, detail
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClient {
    async fn create_worker(&self, name: &str, args: &[String]) -> Result<()> {
        tracing::info!(worker = %name, image = %self.config.image, "Creating worker Job and Service");

        self.create("Job", self.job_url(None), self.job_body(name, args))
            .await?;
        self.create("Service", self.service_url(None), self.service_body(name))
            .await?;

        Ok(())
    }

    async fn delete_worker(&self, name: &str) -> Result<()> {
        tracing::info!(worker = %name, "Deleting worker Job and Service");

        // Attempt both resources even if the first deletion fails.
        let job_result = self
            .delete(
                "Job",
                self.job_url(Some(name)),
                Some(json!({
                    "apiVersion": "v1",
                    "kind": "DeleteOptions",
                    "propagationPolicy": "Background"
                })),
            )
            .await;
        if let Err(e) = &job_result {
            tracing::warn!(worker = %name, error = %e, "Job deletion failed");
        }

        let service_result = self
            .delete("Service", self.service_url(Some(name)), None)
            .await;
        if let Err(e) = &service_result {
            tracing::warn!(worker = %name, error = %e, "Service deletion failed");
        }

        job_result.and(service_result)
    }
}
