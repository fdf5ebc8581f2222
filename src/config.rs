//! Command-line flags and environment configuration.

use std::env;
use std::path::Path;
use std::time::Duration;

use chat_api::url::DEFAULT_BASE_URL;
use chat_api::{RouteStyle, SessionContext};
use clap::Parser;
use service_bootstrap::bootstrap::{DEFAULT_CONTAINER_NAME, DEFAULT_IMAGE};
use service_bootstrap::BootstrapConfig;

pub const LOG_ENV: &str = "CHATCTL_LOG";
pub const MODEL_RUNTIME_ENV: &str = "OLLAMA_HOST";

#[derive(Parser, Debug, Clone)]
#[command(name = "chatctl")]
#[command(about = "Chat with a local or remote inference server")]
pub struct Cli {
    #[arg(long, env = "CHATCTL_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
    #[arg(long, env = "CHATCTL_NAMESPACE", default_value = "default")]
    pub namespace: String,
    #[arg(long, env = "CHATCTL_PROJECT", default_value = "default")]
    pub project: String,
    /// Use `/v1/projects/{namespace}/{project}/chat/completions`.
    #[arg(long, default_value_t = false)]
    pub project_route: bool,
    /// Negative values leave the server default in place.
    #[arg(long, allow_negative_numbers = true, default_value_t = -1.0)]
    pub temperature: f64,
    /// Zero leaves the server default in place.
    #[arg(long, default_value_t = 0)]
    pub max_tokens: u32,
    #[arg(long, default_value_t = false)]
    pub no_stream: bool,
    /// Skip the availability check and never start a container.
    #[arg(long, default_value_t = false)]
    pub no_bootstrap: bool,
    /// Seconds to wait for a freshly started server.
    #[arg(long, default_value_t = 45)]
    pub startup_timeout: u64,
    #[arg(long, default_value = DEFAULT_IMAGE)]
    pub image: String,
    #[arg(long, default_value = DEFAULT_CONTAINER_NAME)]
    pub container_name: String,
    /// Continue an existing server-side session.
    #[arg(long)]
    pub session_id: Option<String>,
    /// Send one message, print the reply and exit.
    #[arg(short, long)]
    pub message: Option<String>,
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn session_context(&self) -> SessionContext {
        let route = if self.project_route {
            RouteStyle::ProjectScoped
        } else {
            RouteStyle::Inference
        };
        let mut context = SessionContext::new(&self.base_url, &self.namespace, &self.project)
            .with_route(route)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_streaming(!self.no_stream);
        if let Some(session_id) = &self.session_id {
            context = context.with_session_token(session_id);
        }
        context
    }

    pub fn bootstrap_config(&self, env: &EnvConfig, working_directory: &Path) -> BootstrapConfig {
        BootstrapConfig::new(working_directory)
            .with_container_name(&self.container_name)
            .with_image(&self.image)
            .with_startup_timeout(Duration::from_secs(self.startup_timeout))
            .with_model_runtime_endpoint(env.model_runtime_endpoint.clone())
    }
}

/// Ambient settings that do not warrant a flag.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub log_filter: Option<String>,
    pub model_runtime_endpoint: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_filter: env_string_opt(LOG_ENV),
            model_runtime_endpoint: env_string_opt(MODEL_RUNTIME_ENV),
        }
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
