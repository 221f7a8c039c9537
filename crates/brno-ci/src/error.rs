//! Error types for the CI pipeline.

use std::path::PathBuf;

use crate::gomod::GoModError;

/// Errors produced while initializing or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("either source or ref must be provided")]
    MissingSource,

    #[error("failed to parse go version: {0}")]
    GoVersion(#[source] GoModError),

    #[error("source directory {} is not accessible: {source}", path.display())]
    SourceDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkout of {url} at '{git_ref}' failed: {reason}")]
    Checkout {
        url: String,
        git_ref: String,
        reason: String,
    },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("step '{step}' exited with code {exit_code}: {output}")]
    ExecFailed {
        step: String,
        exit_code: i32,
        /// Tail of the step's stdout and stderr.
        output: String,
    },

    #[error("step '{step}' timed out after {timeout_secs}s")]
    Timeout { step: String, timeout_secs: u64 },

    #[error("step '{step}' was cancelled")]
    Cancelled { step: String },

    #[error("container engine error: {0}")]
    Engine(String),

    #[error("pipeline task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CiError {
    /// Name of the pipeline step this error belongs to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            CiError::ExecFailed { step, .. }
            | CiError::Timeout { step, .. }
            | CiError::Cancelled { step } => Some(step),
            _ => None,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, CiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_message() {
        assert_eq!(
            CiError::MissingSource.to_string(),
            "either source or ref must be provided"
        );
    }

    #[test]
    fn test_go_version_error_wraps_cause() {
        let err = CiError::GoVersion(GoModError::MissingGoDirective);
        let msg = err.to_string();
        assert!(msg.starts_with("failed to parse go version"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_source_dir_message_names_path() {
        let err = CiError::SourceDir {
            path: PathBuf::from("app"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("source directory app is not accessible"));
    }

    #[test]
    fn test_step_accessor() {
        let err = CiError::ExecFailed {
            step: "lint".to_string(),
            exit_code: 1,
            output: "issues found".to_string(),
        };
        assert_eq!(err.step(), Some("lint"));
        assert_eq!(CiError::MissingSource.step(), None);
    }
}
