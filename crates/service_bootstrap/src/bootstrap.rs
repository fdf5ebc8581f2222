use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_api::url::{is_loopback_url, url_port};
use tracing::{debug, info, warn};

use crate::error::BootstrapError;
use crate::probe::AvailabilityProbe;
use crate::runtime::{ContainerRuntime, RunSpec};

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CONTAINER_NAME: &str = "chatctl-server";
pub const DEFAULT_IMAGE: &str = "ghcr.io/chatctl/inference-server:latest";
/// Port the server listens on inside its container.
pub const INTERNAL_PORT: u16 = 8000;
pub const WORKSPACE_MOUNT: &str = "/workspace";
pub const MODEL_RUNTIME_ENV: &str = "OLLAMA_HOST";
const HOST_GATEWAY_ENTRY: &str = "host.docker.internal:host-gateway";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unknown,
    Reachable,
    Bootstrapping,
    Ready,
    UnreachableRemote,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub container_name: String,
    pub image: String,
    pub internal_port: u16,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    /// Mounted at [`WORKSPACE_MOUNT`].
    pub working_directory: PathBuf,
    /// Local model-runtime endpoint handed to the container, if one was detected.
    pub model_runtime_endpoint: Option<String>,
}

impl BootstrapConfig {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            image: DEFAULT_IMAGE.to_string(),
            internal_port: INTERNAL_PORT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            working_directory: working_directory.into(),
            model_runtime_endpoint: None,
        }
    }

    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_model_runtime_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.model_runtime_endpoint = endpoint.filter(|value| !value.trim().is_empty());
        self
    }
}

/// One bootstrap attempt against one base URL.
///
/// Remote targets are only ever probed. Loopback targets that do not answer
/// are started through the container runtime and then polled at
/// `poll_interval` until they answer or `startup_timeout` elapses.
pub struct ServiceBootstrapper {
    config: BootstrapConfig,
    probe: Arc<dyn AvailabilityProbe>,
    runtime: Arc<dyn ContainerRuntime>,
    state: ServiceState,
}

impl ServiceBootstrapper {
    pub fn new(
        config: BootstrapConfig,
        probe: Arc<dyn AvailabilityProbe>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            config,
            probe,
            runtime,
            state: ServiceState::Unknown,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub async fn ensure_available(
        &mut self,
        base_url: &str,
    ) -> Result<ServiceState, BootstrapError> {
        self.transition(ServiceState::Unknown);

        let reason = match self.probe.probe(base_url).await {
            Ok(()) => {
                self.transition(ServiceState::Reachable);
                return Ok(self.state);
            }
            Err(err) => err.to_string(),
        };
        debug!(%base_url, %reason, "initial probe failed");

        if !is_loopback_url(base_url) {
            self.transition(ServiceState::UnreachableRemote);
            return Err(BootstrapError::RemoteUnreachable {
                base_url: base_url.to_string(),
                reason,
            });
        }

        self.transition(ServiceState::Bootstrapping);
        if !self.runtime.is_installed().await {
            return Err(BootstrapError::RuntimeMissing);
        }

        let name = self.config.container_name.clone();
        let running = self.runtime.list_containers(false).await.unwrap_or_else(|err| {
            warn!(error = %err, "listing running containers failed");
            Vec::new()
        });
        if running.iter().any(|candidate| candidate == &name) {
            info!(container = %name, "container already running");
            self.transition(ServiceState::Ready);
            return Ok(self.state);
        }

        self.start_container(base_url).await?;
        self.wait_until_ready(base_url).await
    }

    async fn start_container(&self, base_url: &str) -> Result<(), BootstrapError> {
        let name = &self.config.container_name;
        let known = self.runtime.list_containers(true).await.unwrap_or_else(|err| {
            warn!(error = %err, "listing containers failed");
            Vec::new()
        });
        if known.iter().any(|candidate| candidate == name) {
            match self.runtime.start_existing(name).await {
                Ok(()) => {
                    info!(container = %name, "started existing container");
                    return Ok(());
                }
                Err(err) => warn!(
                    container = %name,
                    error = %err,
                    "starting existing container failed"
                ),
            }
        }

        if let Err(err) = self.runtime.pull_image(&self.config.image).await {
            warn!(image = %self.config.image, error = %err, "image pull failed, trying local copy");
        }

        let spec = self.run_spec(base_url)?;
        self.runtime
            .run_new(&spec)
            .await
            .map_err(|source| BootstrapError::StartFailed {
                container: name.clone(),
                source,
            })?;
        info!(container = %name, image = %spec.image, "launched new container");
        Ok(())
    }

    fn run_spec(&self, base_url: &str) -> Result<RunSpec, BootstrapError> {
        let host_port =
            url_port(base_url).ok_or_else(|| BootstrapError::InvalidBaseUrl(base_url.to_string()))?;
        let mut spec = RunSpec::new(&self.config.container_name, &self.config.image);
        spec.ports.push((host_port, self.config.internal_port));
        spec.mounts.push((
            self.config.working_directory.clone(),
            WORKSPACE_MOUNT.to_string(),
        ));
        spec.extra_hosts.push(HOST_GATEWAY_ENTRY.to_string());
        if let Some(endpoint) = &self.config.model_runtime_endpoint {
            spec.env
                .push((MODEL_RUNTIME_ENV.to_string(), endpoint.clone()));
        }
        Ok(spec)
    }

    async fn wait_until_ready(&mut self, base_url: &str) -> Result<ServiceState, BootstrapError> {
        let timeout = self.config.startup_timeout;
        let started = Instant::now();
        loop {
            if self.probe.probe(base_url).await.is_ok() {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "server ready");
                self.transition(ServiceState::Ready);
                return Ok(self.state);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                self.transition(ServiceState::TimedOut);
                return Err(BootstrapError::TimedOut { timeout, elapsed });
            }
            tokio::time::sleep(self.config.poll_interval.min(timeout - elapsed)).await;
        }
    }

    fn transition(&mut self, next: ServiceState) {
        debug!(from = ?self.state, to = ?next, "bootstrap state");
        self.state = next;
    }
}
