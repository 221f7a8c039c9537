//! The container engine the pipeline is executed by.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::checkout::SourceDir;
use crate::container::Container;
use crate::error::{CiError, Result};
use crate::runner::ExecOutput;

/// A running service started from a [`Container`] recipe.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    /// Engine-specific identifier (the container id for Docker).
    pub id: String,

    /// Step name of the recipe the service was started from.
    pub name: String,

    /// Ports published on the host.
    pub ports: Vec<u16>,

    /// Files fetched for the service; kept alive until the handle is dropped.
    pub(crate) _staged: Option<Arc<TempDir>>,
}

impl ServiceHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ports,
            _staged: None,
        }
    }

    /// HTTP endpoint of the first published port.
    pub fn endpoint(&self) -> Option<String> {
        self.ports
            .first()
            .map(|port| format!("http://localhost:{port}"))
    }
}

/// Builds containers from recipes and runs commands inside them.
///
/// Implement this trait to plug in a real engine or a test double.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check out `git_ref` of the repository at `url`.
    async fn checkout(&self, url: &str, git_ref: &str) -> Result<SourceDir>;

    /// Run every exec of `container` to completion.
    ///
    /// Fails with the first exec that exits non-zero.
    async fn sync(&self, container: &Container, cancel: &CancellationToken) -> Result<ExecOutput>;

    /// Start `container` in the background with its exposed ports published.
    async fn start_service(&self, container: &Container) -> Result<ServiceHandle>;

    /// Stop a service started by [`ContainerEngine::start_service`].
    async fn stop_service(&self, service: &ServiceHandle) -> Result<()>;
}

/// Resolve a local source directory, falling back to a checkout.
///
/// Local directories are made absolute; engines bind-mount them as given.
pub(crate) async fn resolve_source(
    engine: &dyn ContainerEngine,
    source: Option<&Path>,
    url: &str,
    git_ref: &str,
) -> Result<SourceDir> {
    let Some(dir) = source else {
        return engine.checkout(url, git_ref).await;
    };

    let path = tokio::fs::canonicalize(dir)
        .await
        .map_err(|source| CiError::SourceDir {
            path: dir.to_path_buf(),
            source,
        })?;
    if !path.is_dir() {
        return Err(CiError::SourceDir {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        });
    }
    Ok(SourceDir::local(path))
}
