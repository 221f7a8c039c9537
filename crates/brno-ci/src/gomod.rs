//! Minimal `go.mod` reader.
//!
//! Only the parts the pipeline needs are interpreted: the `module` path and
//! the `go` directive. Every other directive is skipped, including block
//! forms such as `require ( ... )`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// File name of the Go module manifest.
pub const GO_MOD: &str = "go.mod";

/// Errors produced while reading or parsing `go.mod`.
#[derive(Debug, thiserror::Error)]
pub enum GoModError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("go.mod:{line}: usage: go 1.23")]
    GoUsage { line: usize },

    #[error("go.mod:{line}: invalid go version '{version}': must match format 1.23.0")]
    InvalidVersion { line: usize, version: String },

    #[error("go.mod:{line}: repeated go statement")]
    RepeatedGo { line: usize },

    #[error("go.mod:{line}: unterminated block")]
    UnterminatedBlock { line: usize },

    #[error("go.mod: missing go directive")]
    MissingGoDirective,
}

/// The interesting subset of a parsed `go.mod`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoModule {
    /// Module path from the `module` directive.
    pub module_path: Option<String>,

    /// Language version from the `go` directive, verbatim.
    pub go_version: Option<String>,
}

fn go_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[1-9][0-9]*\.(0|[1-9][0-9]*)(\.(0|[1-9][0-9]*))?([a-z]+[0-9]+)?$")
            .expect("go version pattern is valid")
    })
}

/// Parse the contents of a `go.mod` file.
pub fn parse(contents: &str) -> Result<GoModule, GoModError> {
    let mut module = GoModule::default();
    let mut block_start: Option<usize> = None;

    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if block_start.is_some() {
            if line == ")" {
                block_start = None;
            }
            continue;
        }

        // `(` is a token of its own: `require (` and `require(` both open a block.
        if line.ends_with('(') {
            block_start = Some(line_no);
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens[0] {
            "module" if tokens.len() == 2 => {
                module.module_path = Some(unquote(tokens[1]).to_string());
            }
            "go" => {
                if module.go_version.is_some() {
                    return Err(GoModError::RepeatedGo { line: line_no });
                }
                if tokens.len() != 2 {
                    return Err(GoModError::GoUsage { line: line_no });
                }
                let version = tokens[1];
                if !go_version_re().is_match(version) {
                    return Err(GoModError::InvalidVersion {
                        line: line_no,
                        version: version.to_string(),
                    });
                }
                module.go_version = Some(version.to_string());
            }
            _ => {}
        }
    }

    if let Some(line) = block_start {
        return Err(GoModError::UnterminatedBlock { line });
    }

    Ok(module)
}

/// Read `go.mod` from `source_dir` and return its `go` directive.
pub async fn read_go_version(source_dir: &Path) -> Result<String, GoModError> {
    let path = source_dir.join(GO_MOD);
    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| GoModError::Read {
            path: path.clone(),
            source,
        })?;

    parse(&contents)?
        .go_version
        .ok_or(GoModError::MissingGoDirective)
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO_GO_MOD: &str = r#"module github.com/aweris/demo-devconf-cz-2024

go 1.22

require (
	golang.org/x/mod v0.17.0 // indirect
	golang.org/x/net v0.25.0
)
"#;

    #[test]
    fn test_parse_demo_module() {
        let module = parse(DEMO_GO_MOD).unwrap();
        assert_eq!(module.go_version.as_deref(), Some("1.22"));
        assert_eq!(
            module.module_path.as_deref(),
            Some("github.com/aweris/demo-devconf-cz-2024")
        );
    }

    #[test]
    fn test_parse_patch_and_prerelease_versions() {
        for version in ["1.21.0", "1.21rc1", "1.22beta2", "1.9", "1.23alpha1", "1.21.0rc2"] {
            let module = parse(&format!("module m\ngo {version}\n")).unwrap();
            assert_eq!(module.go_version.as_deref(), Some(version));
        }
    }

    #[test]
    fn test_parse_rejects_invalid_version() {
        let err = parse("module m\n\ngo 1.x\n").unwrap_err();
        match err {
            GoModError::InvalidVersion { line, version } => {
                assert_eq!(line, 3);
                assert_eq!(version, "1.x");
            }
            other => panic!("expected InvalidVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_suffixes() {
        for version in ["1.22RC1", "1.22rc", "1.22-rc1", "01.22", "1.022"] {
            let err = parse(&format!("go {version}\n")).unwrap_err();
            assert!(
                matches!(err, GoModError::InvalidVersion { .. }),
                "{version} accepted"
            );
        }
    }

    #[test]
    fn test_block_opened_without_space() {
        let module = parse("module m\nrequire(\n\tgo.example/x v1.0.0\n)\ngo 1.22\n").unwrap();
        assert_eq!(module.go_version.as_deref(), Some("1.22"));

        let err = parse("module m\nreplace(\n").unwrap_err();
        assert!(matches!(err, GoModError::UnterminatedBlock { line: 2 }));
    }

    #[test]
    fn test_parse_rejects_repeated_go() {
        let err = parse("go 1.21\ngo 1.22\n").unwrap_err();
        assert!(matches!(err, GoModError::RepeatedGo { line: 2 }));
    }

    #[test]
    fn test_parse_rejects_go_without_version() {
        let err = parse("module m\ngo\n").unwrap_err();
        assert!(matches!(err, GoModError::GoUsage { line: 2 }));
    }

    #[test]
    fn test_parse_unterminated_block() {
        let err = parse("module m\nrequire (\n\tfoo v1.0.0\n").unwrap_err();
        assert!(matches!(err, GoModError::UnterminatedBlock { line: 2 }));
    }

    #[test]
    fn test_go_inside_block_is_ignored() {
        let module = parse("go 1.22\ntool (\n\tgo 1.0\n)\n").unwrap();
        assert_eq!(module.go_version.as_deref(), Some("1.22"));
    }

    #[test]
    fn test_trailing_comment_on_go_line() {
        let module = parse("go 1.22 // toolchain pin\n").unwrap();
        assert_eq!(module.go_version.as_deref(), Some("1.22"));
    }

    #[test]
    fn test_missing_directive_is_none() {
        let module = parse("module m\n").unwrap();
        assert!(module.go_version.is_none());
    }

    #[tokio::test]
    async fn test_read_go_version_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GO_MOD), DEMO_GO_MOD).unwrap();

        let version = read_go_version(dir.path()).await.unwrap();
        assert_eq!(version, "1.22");
    }

    #[tokio::test]
    async fn test_read_go_version_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_go_version(dir.path()).await.unwrap_err();
        assert!(matches!(err, GoModError::Read { .. }));
    }

    #[tokio::test]
    async fn test_read_go_version_without_directive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(GO_MOD), "module m\n").unwrap();

        let err = read_go_version(dir.path()).await.unwrap_err();
        assert!(matches!(err, GoModError::MissingGoDirective));
    }
}
