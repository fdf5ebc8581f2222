use crate::events::{classify_line, SseFrame};

/// Incremental line reader for event-stream bodies.
///
/// Bytes are buffered until a `\n` arrives so that a frame split across
/// network chunks (or a UTF-8 sequence split across them) is decoded whole.
#[derive(Debug, Default)]
pub struct SseFrameReader {
    buffer: Vec<u8>,
}

impl SseFrameReader {
    /// Feed arbitrary bytes and drain every complete line as a frame.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            frames.push(classify_line(&String::from_utf8_lossy(&line)));
        }

        frames
    }

    /// Flush a trailing line that was not newline-terminated at end of stream.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Some(classify_line(&String::from_utf8_lossy(&line)))
    }

    /// Parse a complete body in one shot, including an unterminated last line.
    pub fn parse_frames(input: &str) -> Vec<SseFrame> {
        let mut reader = Self::default();
        let mut frames = reader.feed(input.as_bytes());
        frames.extend(reader.finish());
        frames
    }
}

/// Whether the stream should keep being read after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Done,
}

/// Assembles the full reply of one streamed turn.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    chunks: usize,
}

impl StreamAccumulator {
    /// Apply one frame. Content is handed to `sink` and appended in the same
    /// step, so nothing is held back from display.
    pub fn apply<F>(&mut self, frame: SseFrame, sink: &mut F) -> FrameOutcome
    where
        F: FnMut(&str),
    {
        match frame {
            SseFrame::Done => FrameOutcome::Done,
            SseFrame::Content(content) => {
                sink(&content);
                self.text.push_str(&content);
                self.chunks += 1;
                FrameOutcome::Continue
            }
            SseFrame::Separator | SseFrame::Control | SseFrame::Skipped => {
                FrameOutcome::Continue
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
