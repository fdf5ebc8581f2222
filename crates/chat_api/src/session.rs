use std::sync::{Arc, Mutex, MutexGuard};

use crate::url::{inference_chat_url, is_loopback_url, project_chat_url};

/// Which chat endpoint shape carries the routing information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RouteStyle {
    /// `POST /v1/inference/chat` with `namespace`/`project_id` in `metadata`.
    #[default]
    Inference,
    /// `POST /v1/projects/{ns}/{proj}/chat/completions`.
    ProjectScoped,
}

/// Server-assigned continuation token, shared with the shutdown path.
///
/// The token is only ever replaced as a whole, so a concurrent reader sees
/// either the previous or the next value.
#[derive(Debug, Clone, Default)]
pub struct SessionToken {
    inner: Arc<Mutex<Option<String>>>,
}

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        let token = Self::new();
        token.replace(value);
        token
    }

    pub fn get(&self) -> Option<String> {
        lock_unpoisoned(&self.inner).clone()
    }

    /// Replace the token with a server-supplied value. Blank values are ignored.
    pub fn replace(&self, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        *lock_unpoisoned(&self.inner) = Some(value.to_owned());
    }

    /// Forget the token. Only called on an explicit "new session" action.
    pub fn clear(&self) {
        *lock_unpoisoned(&self.inner) = None;
    }

    pub fn is_set(&self) -> bool {
        lock_unpoisoned(&self.inner).is_some()
    }
}

/// Per-session routing, generation parameters and continuation state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub base_url: String,
    pub namespace: String,
    pub project_id: String,
    pub route: RouteStyle,
    pub session_token: SessionToken,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub streaming: bool,
}

impl SessionContext {
    pub fn new(
        base_url: impl Into<String>,
        namespace: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: namespace.into(),
            project_id: project_id.into(),
            route: RouteStyle::default(),
            session_token: SessionToken::new(),
            temperature: None,
            max_tokens: None,
            streaming: true,
        }
    }

    pub fn with_route(mut self, route: RouteStyle) -> Self {
        self.route = route;
        self
    }

    /// Negative temperatures mean "not set".
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature).filter(|value| *value >= 0.0);
        self
    }

    /// Zero means "not set".
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens).filter(|value| *value > 0);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_session_token(self, token: impl Into<String>) -> Self {
        self.session_token.replace(token);
        self
    }

    pub fn chat_url(&self) -> String {
        match self.route {
            RouteStyle::Inference => inference_chat_url(&self.base_url),
            RouteStyle::ProjectScoped => {
                project_chat_url(&self.base_url, &self.namespace, &self.project_id)
            }
        }
    }

    pub fn is_loopback(&self) -> bool {
        is_loopback_url(&self.base_url)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
