use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::headers::{build_headers, HEADER_SESSION_ID};
use crate::payload::{ChatMessage, ChatRequest, ChatResponse};
use crate::session::SessionContext;
use crate::sse::{FrameOutcome, SseFrameReader, StreamAccumulator};
use crate::url::session_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let http = Client::builder().build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn build_headers(
        &self,
        context: &SessionContext,
        streaming: bool,
    ) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, context, streaming);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("key: {key}")))?,
                HeaderValue::from_str(&value)
                    .map_err(|_| ChatApiError::InvalidHeader(format!("value for {key}")))?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        history: &[ChatMessage],
        context: &SessionContext,
        streaming: bool,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let headers = self.build_headers(context, streaming)?;
        let payload = ChatRequest::from_context(history, context, streaming);
        let mut builder = self
            .http
            .post(context.chat_url())
            .headers(headers)
            .json(&payload);
        if !streaming {
            if let Some(timeout) = self.config.timeout {
                builder = builder.timeout(timeout);
            }
        }
        Ok(builder)
    }

    /// Send one non-streaming turn and return the assistant reply.
    pub async fn send(
        &self,
        history: &[ChatMessage],
        context: &SessionContext,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, ChatApiError> {
        let (response, session_id) = self
            .send_checked(history, context, false, cancellation)
            .await?;
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;
        let parsed = serde_json::from_str::<ChatResponse>(&body)?;

        let reply = parsed.reply_text().map(str::to_owned).ok_or_else(|| {
            ChatApiError::MalformedResponse("reply has no message content".to_owned())
        })?;
        adopt_session_token(context, session_id);
        Ok(reply)
    }

    /// Send one streaming turn, handing each content delta to `sink` as it
    /// arrives, and return the assembled reply.
    ///
    /// The stream ends at `data: [DONE]` or at end of body; both are success.
    /// The server's session token is only adopted once the stream completes.
    pub async fn send_streaming<F>(
        &self,
        history: &[ChatMessage],
        context: &SessionContext,
        cancellation: Option<&CancellationSignal>,
        mut sink: F,
    ) -> Result<String, ChatApiError>
    where
        F: FnMut(&str),
    {
        let (response, session_id) = self
            .send_checked(history, context, true, cancellation)
            .await?;
        let mut bytes = response.bytes_stream();
        let mut reader = SseFrameReader::default();
        let mut accumulator = StreamAccumulator::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            let chunk = chunk.map_err(ChatApiError::StreamRead)?;
            for frame in reader.feed(&chunk) {
                if accumulator.apply(frame, &mut sink) == FrameOutcome::Done {
                    debug!(
                        chunks = accumulator.chunk_count(),
                        "stream reached done sentinel"
                    );
                    adopt_session_token(context, session_id);
                    return Ok(accumulator.into_text());
                }
            }
        }

        if let Some(frame) = reader.finish() {
            accumulator.apply(frame, &mut sink);
        }
        debug!(
            chunks = accumulator.chunk_count(),
            "stream closed without done sentinel"
        );
        adopt_session_token(context, session_id);
        Ok(accumulator.into_text())
    }

    /// Ask the server to drop a session. Any status is accepted.
    pub async fn delete_session(
        &self,
        base_url: &str,
        session_id: &str,
    ) -> Result<StatusCode, ChatApiError> {
        let response = self
            .http
            .delete(session_url(base_url, session_id))
            .timeout(self.config.teardown_timeout)
            .send()
            .await?;
        Ok(response.status())
    }

    async fn send_checked(
        &self,
        history: &[ChatMessage],
        context: &SessionContext,
        streaming: bool,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<(Response, Option<String>), ChatApiError> {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        let request = self.build_request(history, context, streaming)?;
        debug!(
            url = %context.chat_url(),
            streaming,
            messages = history.len(),
            "sending chat request"
        );
        let response = await_or_cancel(request.send(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = await_or_cancel(response.text(), cancellation)
                .await?
                .unwrap_or_default();
            return Err(ChatApiError::Status {
                status,
                message: parse_error_message(status, &body),
            });
        }

        let session_id = session_header(&response);
        Ok((response, session_id))
    }
}

fn session_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get(HEADER_SESSION_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Called only after the exchange completed successfully.
fn adopt_session_token(context: &SessionContext, session_id: Option<String>) {
    let Some(value) = session_id else {
        return;
    };

    if context.session_token.get().as_deref() != Some(value.as_str()) {
        debug!(session_id = %value, "server assigned session token");
    }
    context.session_token.replace(value);
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
