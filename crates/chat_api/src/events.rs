use serde::Deserialize;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

/// JSON payload of one streamed `data:` frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Classification of one line of an event-stream body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Blank line between frames.
    Separator,
    /// Not a `data:` line: comments, pings, `event:`/`id:` fields.
    Control,
    /// `data: [DONE]`.
    Done,
    /// A delta carrying content.
    Content(String),
    /// A `data:` line with nothing to display: malformed JSON, no choices,
    /// role-only or empty deltas.
    Skipped,
}

/// Classify a single line (without its line terminator).
pub fn classify_line(line: &str) -> SseFrame {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return SseFrame::Separator;
    }

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return SseFrame::Control;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return SseFrame::Done;
    }

    let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(payload) else {
        return SseFrame::Skipped;
    };

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
    {
        Some(content) if !content.is_empty() => SseFrame::Content(content),
        _ => SseFrame::Skipped,
    }
}
