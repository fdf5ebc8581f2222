//! Transport-only client primitives for the inference server chat API.
//!
//! This crate owns URL construction, header assembly, request/response DTOs,
//! error-envelope extraction and the incremental event-stream parser. It holds
//! no terminal or process state; callers pass a [`SessionContext`] and a
//! cancellation flag into every request.
//!
//! Streaming replies are consumed line by line through [`SseFrameReader`] and
//! assembled by [`StreamAccumulator`], which hands every content delta to the
//! caller's sink before the next frame is read.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod session;
pub mod sse;
pub mod url;

pub use client::{CancellationSignal, ChatClient};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::{ChatCompletionChunk, SseFrame};
pub use payload::{ChatMessage, ChatRequest, ChatResponse, RequestMetadata, Role};
pub use session::{RouteStyle, SessionContext, SessionToken};
pub use sse::{FrameOutcome, SseFrameReader, StreamAccumulator};
pub use url::{is_loopback_host, is_loopback_url, join_url};
