//! [`ContainerEngine`] backed by the `docker` CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::checkout::{git_checkout, SourceDir};
use crate::container::{Container, FileSource};
use crate::engine::{ContainerEngine, ServiceHandle};
use crate::error::{CiError, Result};
use crate::runner::{CommandRunner, ExecOutput};

/// How a recipe is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    /// Run in the foreground and remove the container afterwards.
    Foreground,
    /// Run detached with exposed ports published.
    Detached,
}

/// Runs recipes as `docker run` invocations.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    binary: String,
    timeout: Option<Duration>,
    http: reqwest::Client,
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
            http: reqwest::Client::new(),
        }
    }

    /// Fail any single step that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Download every URL-backed file of `container` into a staging directory.
    ///
    /// Returns the staging directory (if anything was fetched) and the host
    /// path for each mounted file, in recipe order.
    async fn stage_files(&self, container: &Container) -> Result<(Option<TempDir>, Vec<PathBuf>)> {
        let mut staging: Option<TempDir> = None;
        let mut paths = Vec::with_capacity(container.files.len());

        for (idx, file) in container.files.iter().enumerate() {
            match &file.source {
                FileSource::Host(path) => paths.push(path.clone()),
                FileSource::Url(url) => {
                    let dir = match staging.take() {
                        Some(dir) => dir,
                        None => tempfile::Builder::new().prefix("brno-ci-files-").tempdir()?,
                    };
                    let target = dir.path().join(format!("file-{idx}"));
                    staging = Some(dir);
                    let bytes = self.fetch(url).await?;
                    tokio::fs::write(&target, &bytes).await?;
                    paths.push(target);
                }
            }
        }

        Ok((staging, paths))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_err = |reason: String| CiError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
            .error_for_status()
            .map_err(|e| fetch_err(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Force-remove a container left behind by a killed `docker run` client.
    async fn remove_container(&self, step: &str, name: &str) {
        let args = vec!["rm".to_string(), "-f".to_string(), name.to_string()];
        let cancel = CancellationToken::new();

        match CommandRunner::execute(step, &self.command(args), None, None, &cancel).await {
            Ok(output) if output.passed() => info!(step, container = name, "container removed"),
            Ok(output) => warn!(
                step,
                container = name,
                exit_code = output.exit_code,
                stderr = %output.stderr.trim(),
                "failed to remove container"
            ),
            Err(e) => warn!(step, container = name, error = %e, "failed to remove container"),
        }
    }

    fn command(&self, args: Vec<String>) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.binary.clone());
        argv.extend(args);
        argv
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn checkout(&self, url: &str, git_ref: &str) -> Result<SourceDir> {
        git_checkout(url, git_ref).await
    }

    async fn sync(&self, container: &Container, cancel: &CancellationToken) -> Result<ExecOutput> {
        let (_staging, files) = self.stage_files(container).await?;
        let name = container_name(&container.name);
        let args = run_args(container, &files, &name, RunMode::Foreground)?;

        info!(
            step = %container.name,
            container = %name,
            image = container.image.as_deref().unwrap_or_default(),
            execs = container.execs.len(),
            "running step"
        );

        let result =
            CommandRunner::execute(&container.name, &self.command(args), None, self.timeout, cancel)
                .await;

        // Killing the client leaves the container running.
        let output = match result {
            Err(e @ (CiError::Cancelled { .. } | CiError::Timeout { .. })) => {
                self.remove_container(&container.name, &name).await;
                return Err(e);
            }
            other => other?,
        };

        if output.passed() {
            info!(step = %container.name, duration_ms = output.duration_ms, "step passed");
        } else {
            warn!(step = %container.name, exit_code = output.exit_code, "step failed");
        }

        output.into_result()
    }

    async fn start_service(&self, container: &Container) -> Result<ServiceHandle> {
        let (staging, files) = self.stage_files(container).await?;
        let args = run_args(container, &files, &container_name(&container.name), RunMode::Detached)?;
        let cancel = CancellationToken::new();

        let output = CommandRunner::execute(&container.name, &self.command(args), None, None, &cancel)
            .await?
            .into_result()?;

        let id = output.stdout.trim().to_string();
        if id.is_empty() {
            return Err(CiError::Engine(format!(
                "docker returned no container id for {}",
                container.name
            )));
        }

        info!(step = %container.name, id = %id, ports = ?container.exposed_ports, "service started");

        let mut handle = ServiceHandle::new(id, &container.name, container.exposed_ports.clone());
        handle._staged = staging.map(Arc::new);
        Ok(handle)
    }

    async fn stop_service(&self, service: &ServiceHandle) -> Result<()> {
        let cancel = CancellationToken::new();
        let args = vec!["rm".to_string(), "-f".to_string(), service.id.clone()];

        CommandRunner::execute(&service.name, &self.command(args), None, None, &cancel)
            .await?
            .into_result()?;

        info!(step = %service.name, id = %service.id, "service stopped");
        Ok(())
    }
}

/// Unique container name for one run of `step`.
fn container_name(step: &str) -> String {
    format!("brno-ci-{step}-{}", Uuid::new_v4().simple())
}

/// Translate a recipe into `docker run` arguments.
///
/// `files` holds the host path for each entry of `container.files`.
fn run_args(
    container: &Container,
    files: &[PathBuf],
    name: &str,
    mode: RunMode,
) -> Result<Vec<String>> {
    let image = container
        .image
        .as_ref()
        .ok_or_else(|| CiError::Engine(format!("step {} has no base image", container.name)))?;

    let mut args = vec!["run".to_string(), "--rm".to_string()];
    if mode == RunMode::Detached {
        args.push("-d".to_string());
    }
    args.push("--name".to_string());
    args.push(name.to_string());

    for cache in &container.caches {
        args.push("--mount".to_string());
        args.push(mount_spec("volume", &cache.volume, &cache.path));
    }
    for dir in &container.directories {
        args.push("--mount".to_string());
        args.push(mount_spec("bind", &dir.host_dir.to_string_lossy(), &dir.path));
    }
    for (file, host) in container.files.iter().zip(files) {
        args.push("--mount".to_string());
        args.push(mount_spec("bind", &host.to_string_lossy(), &file.path));
    }
    if let Some(workdir) = &container.workdir {
        args.push("-w".to_string());
        args.push(workdir.clone());
    }
    for (key, value) in &container.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    if mode == RunMode::Detached {
        for port in &container.exposed_ports {
            args.push("-p".to_string());
            args.push(format!("{port}:{port}"));
        }
    }

    args.push(image.clone());

    if !container.execs.is_empty() {
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(exec_script(&container.execs));
    }

    Ok(args)
}

/// `--mount` value; docker parses it as one CSV record.
fn mount_spec(kind: &str, src: &str, dst: &str) -> String {
    format!(
        "type={kind},{},{}",
        csv_field(&format!("src={src}")),
        csv_field(&format!("dst={dst}"))
    )
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Chain execs so that the first failure stops the step.
fn exec_script(execs: &[Vec<String>]) -> String {
    let mut lines = vec!["set -e".to_string()];
    let last = execs.len().saturating_sub(1);
    for (idx, argv) in execs.iter().enumerate() {
        let quoted: Vec<String> = argv.iter().map(|arg| shell_quote(arg)).collect();
        let line = quoted.join(" ");
        // Last exec replaces the shell.
        if idx == last {
            lines.push(format!("exec {line}"));
        } else {
            lines.push(line);
        }
    }
    lines.join("\n")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
