//! Best-effort session teardown on exit or interruption.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_api::{CancellationSignal, ChatApiConfig, ChatClient, SessionContext, SessionToken};
use tracing::{debug, warn};

/// Printed when an interruption signal arrives.
pub const INTERRUPT_ACK: &str = "Interrupted, closing session...";

/// Deletes the server session at most once, from either the normal exit path
/// or the signal thread.
///
/// The coordinator holds a clone of the session token and only ever reads
/// it. It never fails: every teardown error is logged and swallowed, and the
/// delete request is bounded by the configured teardown timeout.
pub struct ShutdownCoordinator {
    config: ChatApiConfig,
    base_url: String,
    token: SessionToken,
    cancellation: CancellationSignal,
    torn_down: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(
        config: ChatApiConfig,
        context: &SessionContext,
        cancellation: CancellationSignal,
    ) -> Self {
        Self {
            config,
            base_url: context.base_url.clone(),
            token: context.session_token.clone(),
            cancellation,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// Returns whether a delete request was actually sent.
    pub async fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        let Some(session_id) = self.token.get() else {
            debug!("no session to tear down");
            return false;
        };

        let client = match ChatClient::new(self.config.clone()) {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "teardown client unavailable");
                return false;
            }
        };
        match client.delete_session(&self.base_url, &session_id).await {
            Ok(status) => debug!(%status, %session_id, "session deleted"),
            Err(err) => warn!(error = %err, %session_id, "session teardown failed"),
        }
        true
    }

    /// Blocking teardown on a private runtime, for threads outside tokio.
    pub fn teardown_blocking(&self) -> bool {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.teardown()),
            Err(err) => {
                warn!(error = %err, "teardown runtime unavailable");
                false
            }
        }
    }

    /// Interruption handling short of exiting: cancel the in-flight request,
    /// acknowledge on `out` and tear the session down. Runs off the tokio
    /// runtime.
    pub fn on_interrupt<W: Write>(&self, out: &mut W) -> bool {
        self.cancellation.store(true, Ordering::SeqCst);
        let _ = writeln!(out, "\n{INTERRUPT_ACK}").and_then(|()| out.flush());
        self.teardown_blocking()
    }

    /// On SIGINT/SIGTERM: [`Self::on_interrupt`], then exit successfully.
    #[cfg(unix)]
    pub fn install(self: &Arc<Self>) -> std::io::Result<crate::platform::SignalHookGuard> {
        let coordinator = Arc::clone(self);
        crate::platform::install_signal_handlers(move || {
            coordinator.on_interrupt(&mut std::io::stderr());
            std::process::exit(0);
        })
    }
}
