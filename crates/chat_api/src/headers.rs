use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::ChatApiConfig;
use crate::session::SessionContext;

pub const HEADER_SESSION_ID: &str = "X-Session-ID";
pub const HEADER_WORKING_DIRECTORY: &str = "X-Working-Directory";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CACHE_CONTROL: &str = "cache-control";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "User-Agent";

pub const EVENT_STREAM: &str = "text/event-stream";
pub const APPLICATION_JSON: &str = "application/json";

/// Build a deterministic header map for one chat request.
///
/// The session header is attached only while a token is held. The working
/// directory header is attached only when the server is on a loopback host.
pub fn build_headers(
    config: &ChatApiConfig,
    context: &SessionContext,
    streaming: bool,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    headers.insert(HEADER_CONTENT_TYPE.to_owned(), APPLICATION_JSON.to_owned());
    if streaming {
        headers.insert(HEADER_ACCEPT.to_owned(), EVENT_STREAM.to_owned());
        headers.insert(HEADER_CACHE_CONTROL.to_owned(), "no-cache".to_owned());
    } else {
        headers.insert(HEADER_ACCEPT.to_owned(), APPLICATION_JSON.to_owned());
    }

    let ua = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    if let Some(session_id) = context.session_token.get() {
        headers.insert(HEADER_SESSION_ID.to_owned(), session_id);
    }

    if context.is_loopback() {
        if let Some(cwd) = working_directory(config) {
            headers.insert(
                HEADER_WORKING_DIRECTORY.to_owned(),
                cwd.to_string_lossy().into_owned(),
            );
        }
    }

    headers
}

fn working_directory(config: &ChatApiConfig) -> Option<PathBuf> {
    config
        .working_directory
        .clone()
        .or_else(|| std::env::current_dir().ok())
}

fn default_user_agent() -> String {
    format!(
        "chatctl/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        normalize_arch(std::env::consts::ARCH)
    )
}

fn normalize_arch(arch: &str) -> String {
    match arch.to_ascii_lowercase().as_str() {
        "x86_64" | "amd64" => "x64".to_owned(),
        "x86" | "i386" | "i686" => "ia32".to_owned(),
        "aarch64" => "arm64".to_owned(),
        normalized => normalized.to_owned(),
    }
}
