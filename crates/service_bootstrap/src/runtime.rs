use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::RuntimeError;

/// Container operations the bootstrapper needs, nothing more.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn is_installed(&self) -> bool;
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;
    /// Container names; stopped containers are included when `all` is set.
    async fn list_containers(&self, all: bool) -> Result<Vec<String>, RuntimeError>;
    async fn start_existing(&self, name: &str) -> Result<(), RuntimeError>;
    async fn run_new(&self, spec: &RunSpec) -> Result<(), RuntimeError>;
}

/// Parameters of a detached `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    /// `(host, container)` port pairs.
    pub ports: Vec<(u16, u16)>,
    /// `(host path, container path)` bind mounts.
    pub mounts: Vec<(PathBuf, String)>,
    pub env: Vec<(String, String)>,
    /// `--add-host` entries, `name:address`.
    pub extra_hosts: Vec<String>,
}

impl RunSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            mounts: Vec::new(),
            env: Vec::new(),
            extra_hosts: Vec::new(),
        }
    }

    /// Arguments after the runtime program, starting with `run`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];
        for (host, container) in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{host}:{container}"));
        }
        for (host, container) in &self.mounts {
            args.push("-v".to_string());
            args.push(format!("{}:{container}", host.display()));
        }
        for entry in &self.extra_hosts {
            args.push("--add-host".to_string());
            args.push(entry.clone());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args
    }
}

/// Drives the `docker` command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("docker"),
        }
    }
}

impl DockerCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn preview(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    async fn run(&self, args: &[String]) -> Result<String, RuntimeError> {
        let command = self.preview(args);
        debug!(%command, "container runtime");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(RuntimeError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn is_installed(&self) -> bool {
        self.run(&["--version".to_string()]).await.is_ok()
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.run(&["pull".to_string(), image.to_string()])
            .await
            .map(|_| ())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<String>, RuntimeError> {
        let mut args = vec!["ps".to_string()];
        if all {
            args.push("-a".to_string());
        }
        args.push("--format".to_string());
        args.push("{{.Names}}".to_string());
        let stdout = self.run(&args).await?;
        Ok(parse_names(&stdout))
    }

    async fn start_existing(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&["start".to_string(), name.to_string()])
            .await
            .map(|_| ())
    }

    async fn run_new(&self, spec: &RunSpec) -> Result<(), RuntimeError> {
        self.run(&spec.to_args()).await.map(|_| ())
    }
}

fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
