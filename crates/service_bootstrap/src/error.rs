use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("health check failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("health check returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(
        "inference server at {base_url} is unreachable ({reason}); automatic start is only \
         attempted for localhost, 127.0.0.1 or ::1"
    )]
    RemoteUnreachable { base_url: String, reason: String },

    #[error("container runtime is not installed; install Docker or start the server manually")]
    RuntimeMissing,

    #[error("base URL {0} has no usable port to publish")]
    InvalidBaseUrl(String),

    #[error("failed to start container `{container}`: {source}")]
    StartFailed {
        container: String,
        #[source]
        source: RuntimeError,
    },

    #[error(
        "inference server did not become ready within {}s (waited {:.1}s)",
        .timeout.as_secs_f64(),
        .elapsed.as_secs_f64()
    )]
    TimedOut { timeout: Duration, elapsed: Duration },
}
