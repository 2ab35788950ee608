//! Health probing shared by the deployer, the monitor and the registry.
//!
//! A service is healthy when `GET <base>/health` answers `200 OK` within the
//! probe timeout. Anything else is a [`ProbeError`] that callers treat as
//! "not ready" or "unhealthy"; the probe itself never retries.

use armada_core::endpoints;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("health check timed out after {millis}ms")]
    Timeout { millis: u128 },

    #[error("connection failed: {reason}")]
    Connect { reason: String },

    #[error("health endpoint returned status {status}")]
    Status { status: u16 },

    #[error("health request failed: {reason}")]
    Request { reason: String },
}

/// Issues single `GET /health` requests with a per-call timeout.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl HealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes `base_url`'s health endpoint once.
    pub async fn check(&self, base_url: &str) -> Result<(), ProbeError> {
        let url = health_url(base_url);
        trace!(%url, "Probing health endpoint");

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(ProbeError::Status {
                status: status.as_u16(),
            })
        }
    }

    pub async fn status(&self, base_url: &str) -> HealthStatus {
        match self.check(base_url).await {
            Ok(()) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        }
    }

    fn classify(&self, error: reqwest::Error) -> ProbeError {
        if error.is_timeout() {
            ProbeError::Timeout {
                millis: self.timeout.as_millis(),
            }
        } else if error.is_connect() {
            ProbeError::Connect {
                reason: error.to_string(),
            }
        } else {
            ProbeError::Request {
                reason: error.to_string(),
            }
        }
    }
}

pub fn health_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), endpoints::HEALTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_health_url() {
        assert_eq!(health_url("http://localhost:9000"), "http://localhost:9000/health");
        assert_eq!(health_url("http://localhost:9000/"), "http://localhost:9000/health");
    }

    #[tokio::test]
    async fn test_ok_is_healthy() {
        let base = serve(Router::new().route("/health", get(|| async { "ok" }))).await;
        let probe = HealthProbe::default();

        assert_eq!(probe.check(&base).await, Ok(()));
        assert_eq!(probe.status(&base).await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_non_200_is_unhealthy() {
        let base = serve(Router::new().route(
            "/health",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        ))
        .await;

        assert_eq!(
            HealthProbe::default().check(&base).await,
            Err(ProbeError::Status { status: 503 })
        );
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = HealthProbe::default().check(&format!("http://{}", addr)).await;
        assert!(matches!(result, Err(ProbeError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let base = serve(Router::new().route(
            "/health",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;

        let probe = HealthProbe::new(Duration::from_millis(100));
        assert_eq!(
            probe.check(&base).await,
            Err(ProbeError::Timeout { millis: 100 })
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }
}
