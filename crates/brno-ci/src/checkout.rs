//! Source directories and remote checkouts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{CiError, Result};
use crate::runner::CommandRunner;

/// Source tree the pipeline mounts into every step.
///
/// A checkout owns its temporary directory; it is removed once the last
/// clone of the `SourceDir` is dropped.
#[derive(Debug, Clone)]
pub struct SourceDir {
    path: PathBuf,
    owned: Option<Arc<TempDir>>,
}

impl SourceDir {
    /// Use an existing directory on the host.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: None,
        }
    }

    /// Take ownership of a temporary checkout directory.
    pub fn checkout(dir: TempDir) -> Self {
        Self {
            path: dir.path().to_path_buf(),
            owned: Some(Arc::new(dir)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this directory was checked out by the pipeline.
    pub fn is_checkout(&self) -> bool {
        self.owned.is_some()
    }
}

/// Clone `url` and check out `git_ref`, keeping the `.git` directory.
pub async fn git_checkout(url: &str, git_ref: &str) -> Result<SourceDir> {
    let dir = tempfile::Builder::new().prefix("brno-ci-src-").tempdir()?;
    let target = dir.path().to_string_lossy().to_string();
    let cancel = CancellationToken::new();

    info!(url, git_ref, "checking out source");

    let clone = vec![
        "git".to_string(),
        "clone".to_string(),
        "--quiet".to_string(),
        url.to_string(),
        target,
    ];
    let checkout = vec![
        "git".to_string(),
        "checkout".to_string(),
        "--quiet".to_string(),
        git_ref.to_string(),
    ];

    for (argv, cwd) in [(clone, None), (checkout, Some(dir.path()))] {
        let output = CommandRunner::execute("checkout", &argv, cwd, None, &cancel).await?;
        if !output.passed() {
            return Err(CiError::Checkout {
                url: url.to_string(),
                git_ref: git_ref.to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
    }

    Ok(SourceDir::checkout(dir))
}
