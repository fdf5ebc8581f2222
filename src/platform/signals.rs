use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::iterator::Signals;

/// Unregisters the handler thread on drop.
pub struct SignalHookGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalHookGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_cleanup_once<F>(cleanup: &Arc<F>, ran: &AtomicBool)
where
    F: Fn() + Send + Sync + 'static + ?Sized,
{
    if !ran.swap(true, Ordering::SeqCst) {
        cleanup();
    }
}

/// Run `cleanup` on a dedicated thread the first time SIGINT or SIGTERM
/// arrives. Further signals are absorbed.
pub fn install_signal_handlers<F>(cleanup: F) -> std::io::Result<SignalHookGuard>
where
    F: Fn() + Send + Sync + 'static,
{
    let cleanup = Arc::new(cleanup);
    let ran = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([libc::SIGINT, libc::SIGTERM])?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("chatctl-signals".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                run_cleanup_once(&cleanup, &ran);
            }
        })?;

    Ok(SignalHookGuard {
        handle,
        thread: Some(thread),
    })
}
