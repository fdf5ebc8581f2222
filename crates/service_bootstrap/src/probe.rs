use std::time::Duration;

use async_trait::async_trait;
use chat_api::url::health_url;
use reqwest::Client;
use tracing::debug;

use crate::error::ProbeError;

/// Bound on a single health check.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A single bounded-time health check. Implementations never retry.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn probe(&self, base_url: &str) -> Result<(), ProbeError>;
}

/// `GET {base}/info`; any 2xx is healthy and the body is ignored.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self {
            http: Client::builder().build()?,
            timeout: PROBE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AvailabilityProbe for HttpProbe {
    async fn probe(&self, base_url: &str) -> Result<(), ProbeError> {
        let url = health_url(base_url);
        let response = self.http.get(&url).timeout(self.timeout).send().await?;
        let status = response.status();
        debug!(%url, %status, "health probe answered");
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }
}
