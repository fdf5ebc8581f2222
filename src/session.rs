//! The interactive conversation: history, slash commands and turn output.

use std::io::Write;

use chat_api::{CancellationSignal, ChatApiError, ChatClient, ChatMessage, SessionContext};
use tracing::{debug, warn};

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Owns the conversation history and is the only writer of the
/// [`SessionContext`]; the shutdown path only reads its token.
pub struct ChatSession {
    client: ChatClient,
    context: SessionContext,
    history: Vec<ChatMessage>,
    cancellation: CancellationSignal,
}

impl ChatSession {
    pub fn new(
        client: ChatClient,
        context: SessionContext,
        cancellation: CancellationSignal,
    ) -> Self {
        Self {
            client,
            context,
            history: Vec::new(),
            cancellation,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn session_id(&self) -> Option<String> {
        self.context.session_token.get()
    }

    /// Run one exchange, writing the reply to `out` as it arrives.
    ///
    /// History only grows when the exchange succeeds, so a failed or
    /// cancelled turn can simply be retried.
    pub async fn turn<W: Write>(
        &mut self,
        prompt: &str,
        out: &mut W,
    ) -> Result<String, ChatApiError> {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(prompt));

        let reply = if self.context.streaming {
            self.client
                .send_streaming(&messages, &self.context, Some(&self.cancellation), |chunk| {
                    emit(out, chunk)
                })
                .await?
        } else {
            let reply = self
                .client
                .send(&messages, &self.context, Some(&self.cancellation))
                .await?;
            emit(out, &reply);
            reply
        };
        emit(out, "\n");

        self.history.extend(messages.pop());
        self.history.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    /// Forget the conversation and the server session. The old session is
    /// deleted best-effort before the token is dropped.
    pub async fn reset(&mut self) {
        if let Some(session_id) = self.context.session_token.get() {
            match self
                .client
                .delete_session(&self.context.base_url, &session_id)
                .await
            {
                Ok(status) => debug!(%status, "previous session deleted"),
                Err(err) => warn!(error = %err, "deleting previous session failed"),
            }
        }
        self.context.session_token.clear();
        self.history.clear();
    }

    /// Dispatch one line of user input.
    pub async fn handle_input<W: Write>(
        &mut self,
        input: &str,
        out: &mut W,
    ) -> Result<Flow, ChatApiError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Flow::Continue);
        }

        let Some(command) = parse_slash_command(input) else {
            self.turn(input, out).await?;
            return Ok(Flow::Continue);
        };

        match command {
            SlashCommand::Help => say(out, HELP_TEXT),
            SlashCommand::New => {
                self.reset().await;
                say(out, "Started a new session.");
            }
            SlashCommand::Session => match self.session_id() {
                Some(session_id) => say(out, &format!("Session: {session_id}")),
                None => say(out, "No session yet."),
            },
            SlashCommand::Quit => return Ok(Flow::Quit),
            SlashCommand::Unknown(command) => {
                say(out, &format!("Unknown command: {command} (try /help)"));
            }
        }
        Ok(Flow::Continue)
    }
}

/// Write and flush so each chunk is visible before the next one is read.
fn emit<W: Write>(out: &mut W, text: &str) {
    if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        debug!(error = %err, "reply output failed");
    }
}

fn say<W: Write>(out: &mut W, line: &str) {
    emit(out, line);
    emit(out, "\n");
}
