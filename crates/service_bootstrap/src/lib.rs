//! Makes sure an inference server answers before the first chat request.
//!
//! [`ServiceBootstrapper`] probes the configured base URL and, only for
//! loopback targets, brings a local server up through a [`ContainerRuntime`],
//! then polls the [`AvailabilityProbe`] at a fixed interval until the server
//! answers or the startup deadline passes.

pub mod bootstrap;
pub mod error;
pub mod probe;
pub mod runtime;

pub use bootstrap::{BootstrapConfig, ServiceBootstrapper, ServiceState};
pub use error::{BootstrapError, ProbeError, RuntimeError};
pub use probe::{AvailabilityProbe, HttpProbe};
pub use runtime::{ContainerRuntime, DockerCli, RunSpec};
