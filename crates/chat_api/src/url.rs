use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

/// Default base URL for a locally bootstrapped inference server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

pub const HEALTH_PATH: &str = "/info";
pub const INFERENCE_CHAT_PATH: &str = "/v1/inference/chat";
pub const SESSION_PATH_PREFIX: &str = "/v1/inference/chat/session";

/// Join a base URL and a path with exactly one separating slash.
///
/// Trailing slashes on `base` and leading slashes on `path` are collapsed, so
/// `join_url("http://h/", "/x")` and `join_url("http://h", "x")` agree.
pub fn join_url(base: &str, path: &str) -> String {
    let base = if base.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        base.trim()
    };

    let trimmed_base = base.trim_end_matches('/');
    let trimmed_path = path.trim().trim_start_matches('/');
    if trimmed_path.is_empty() {
        return trimmed_base.to_string();
    }
    format!("{trimmed_base}/{trimmed_path}")
}

pub fn health_url(base: &str) -> String {
    join_url(base, HEALTH_PATH)
}

/// Generic inference chat endpoint; routing travels in request metadata.
pub fn inference_chat_url(base: &str) -> String {
    join_url(base, INFERENCE_CHAT_PATH)
}

/// Project-scoped chat endpoint; routing is folded into the path.
pub fn project_chat_url(base: &str, namespace: &str, project_id: &str) -> String {
    join_url(
        base,
        &format!(
            "/v1/projects/{}/{}/chat/completions",
            namespace.trim().trim_matches('/'),
            project_id.trim().trim_matches('/')
        ),
    )
}

pub fn session_url(base: &str, session_id: &str) -> String {
    join_url(
        base,
        &format!("{SESSION_PATH_PREFIX}/{}", session_id.trim().trim_matches('/')),
    )
}

/// Whether a bare host name refers to the local machine.
///
/// Accepts `localhost` (any case), `127.0.0.1` and `::1`, with or without
/// IPv6 brackets.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim();
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|value| value.strip_suffix(']'))
        .unwrap_or(host);

    if unbracketed.eq_ignore_ascii_case("localhost") {
        return true;
    }
    if let Ok(ip) = unbracketed.parse::<Ipv4Addr>() {
        return ip == Ipv4Addr::LOCALHOST;
    }
    if let Ok(ip) = unbracketed.parse::<Ipv6Addr>() {
        return ip == Ipv6Addr::LOCALHOST;
    }
    false
}

/// Whether the host of a base URL is a loopback address.
///
/// Inputs without a scheme (`localhost:8000`, `::1`) are accepted; anything
/// that cannot be resolved to a host is treated as remote.
pub fn is_loopback_url(input: &str) -> bool {
    let input = input.trim();
    if input.is_empty() {
        return false;
    }

    let parsed = Url::parse(input)
        .ok()
        .filter(|url| url.has_host())
        .or_else(|| Url::parse(&format!("http://{input}")).ok());

    match parsed.as_ref().and_then(Url::host) {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
        None => is_loopback_host(input),
    }
}

/// Port of a base URL, falling back to the scheme default.
pub fn url_port(input: &str) -> Option<u16> {
    let input = input.trim();
    Url::parse(input)
        .ok()
        .filter(|url| url.has_host())
        .or_else(|| Url::parse(&format!("http://{input}")).ok())
        .and_then(|url| url.port_or_known_default())
}
