//! Interactive chat client for a local or remote inference server.
//!
//! Startup makes sure the server answers (starting a local container when the
//! target is a loopback address), then each line of input becomes one chat
//! turn whose reply is streamed to stdout. An interruption cancels the
//! in-flight request and deletes the server session before exiting.

pub mod commands;
pub mod config;
pub mod logging;
pub mod platform;
pub mod session;
pub mod shutdown;

pub use commands::{parse_slash_command, SlashCommand};
pub use config::{Cli, EnvConfig};
pub use session::{ChatSession, Flow};
pub use shutdown::ShutdownCoordinator;
