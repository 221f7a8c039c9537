//! Integration tests for the CI pipeline with RecordingEngine.

use brno_ci::fakes::RecordingEngine;
use brno_ci::{Ci, CiError, Step, DEFAULT_REF};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const GO_MOD: &str = r#"module github.com/aweris/demo-devconf-cz-2024

go 1.22

require github.com/sourcegraph/conc v0.3.0
"#;

fn write_go_source(dir: &Path) {
    std::fs::write(dir.join("go.mod"), GO_MOD).unwrap();
    std::fs::write(
        dir.join("main.go"),
        "package main\n\nfunc main() {}\n",
    )
    .unwrap();
}

/// Test: a go.mod pinned to 1.22 yields golang:1.22 for every step
#[tokio::test]
async fn test_go_version_drives_image() {
    let dir = tempfile::tempdir().unwrap();
    write_go_source(dir.path());
    let engine = Arc::new(RecordingEngine::new());

    let ci = Ci::new(engine.clone(), Some(dir.path().to_path_buf()), DEFAULT_REF)
        .await
        .expect("init failed");
    assert_eq!(ci.go_version(), "1.22");

    ci.ci(CancellationToken::new()).await.expect("pipeline failed");

    let synced = engine.synced();
    assert_eq!(synced.len(), 3, "build, test and lint should all run");
    for ctr in &synced {
        assert_eq!(ctr.image.as_deref(), Some("golang:1.22"));
    }
}

/// Test: the pipeline runs exactly the build, test and lint steps
#[tokio::test]
async fn test_pipeline_runs_every_step() {
    let dir = tempfile::tempdir().unwrap();
    write_go_source(dir.path());
    let engine = Arc::new(RecordingEngine::new());
    let ci = Ci::new(engine.clone(), Some(dir.path().to_path_buf()), DEFAULT_REF)
        .await
        .unwrap();

    ci.ci(CancellationToken::new()).await.unwrap();

    let mut names: Vec<String> = engine.synced().into_iter().map(|c| c.name).collect();
    names.sort();
    let mut expected: Vec<String> = Step::PIPELINE.iter().map(|s| s.name().to_string()).collect();
    expected.sort();
    assert_eq!(names, expected);
}

/// Test: exactly one failing step becomes the pipeline error
#[tokio::test]
async fn test_one_failing_step_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_go_source(dir.path());
    let engine = Arc::new(RecordingEngine::new().fail_step("lint", 1, "main.go:3: unused"));
    let ci = Ci::new(engine.clone(), Some(dir.path().to_path_buf()), DEFAULT_REF)
        .await
        .unwrap();

    let err = ci.ci(CancellationToken::new()).await.unwrap_err();

    match err {
        CiError::ExecFailed { step, output, .. } => {
            assert_eq!(step, "lint");
            assert_eq!(output, "main.go:3: unused");
        }
        other => panic!("expected ExecFailed, got {other:?}"),
    }
    assert_eq!(engine.synced().len(), 3, "siblings still run to completion");
}

/// Test: a cancelled caller stops in-flight steps
#[tokio::test]
async fn test_cancelled_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_go_source(dir.path());
    let engine = Arc::new(
        RecordingEngine::new()
            .delay_step("build", Duration::from_secs(60))
            .delay_step("test", Duration::from_secs(60))
            .delay_step("lint", Duration::from_secs(60)),
    );
    let ci = Ci::new(engine, Some(dir.path().to_path_buf()), DEFAULT_REF)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ci.ci(cancel).await.unwrap_err();
    assert!(matches!(err, CiError::Cancelled { .. }));
}

/// Test: neither source nor ref is a fatal initialization error
#[tokio::test]
async fn test_missing_source_and_ref() {
    let engine = Arc::new(RecordingEngine::new());
    let result = Ci::new(engine.clone(), None, "").await;

    assert!(matches!(result, Err(CiError::MissingSource)));
    assert!(engine.checkouts().is_empty(), "no checkout should be attempted");
}

/// Test: a source without go.mod fails initialization with context
#[tokio::test]
async fn test_missing_go_mod() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());

    let err = Ci::new(engine, Some(dir.path().to_path_buf()), DEFAULT_REF)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to parse go version"));
}
