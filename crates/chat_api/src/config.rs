use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a session teardown request.
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport configuration shared by every request a [`crate::ChatClient`] sends.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Working directory advertised to loopback servers. `None` means the
    /// process's current directory at request time.
    pub working_directory: Option<PathBuf>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional whole-request timeout for chat requests. Streaming requests
    /// should leave this unset and rely on cancellation instead.
    pub timeout: Option<Duration>,
    /// Bound on the session teardown request.
    pub teardown_timeout: Duration,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            working_directory: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
        }
    }
}

impl ChatApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
