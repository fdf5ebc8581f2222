//! Process-level integrations.

#[cfg(unix)]
pub mod signals;

#[cfg(unix)]
pub use signals::{install_signal_handlers, SignalHookGuard};
