//! The hello-brno CI definition.
//!
//! [`Ci`] turns a source tree into container recipes for each pipeline
//! step and hands them to a [`ContainerEngine`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, SecondsFormat};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkout::SourceDir;
use crate::container::{Container, FileSource};
use crate::engine::{resolve_source, ContainerEngine, ServiceHandle};
use crate::error::{CiError, Result};
use crate::gomod;
use crate::pipeline::CiPipeline;
use crate::platform::Platform;
use crate::runner::ExecOutput;
use crate::stage::Step;

/// Repository checked out when no local source is given.
pub const DEMO_REPOSITORY: &str = "https://github.com/aweris/demo-devconf-cz-2024.git";

pub const DEFAULT_REF: &str = "main";
pub const DEFAULT_VERSION: &str = "dev";
pub const DEFAULT_LINTER_VERSION: &str = "v1.59.0";

/// Port the demo application listens on.
pub const SERVICE_PORT: u16 = 8080;

const GOLANGCI_INSTALL_SCRIPT: &str =
    "https://raw.githubusercontent.com/golangci/golangci-lint/master/install.sh";
const GOLANGCI_INSTALL_PATH: &str = "/tmp/golangci-lint/install.sh";

const SOURCE_MOUNT: &str = "/src";

/// CI pipeline bound to one source tree and Go toolchain.
pub struct Ci {
    source: SourceDir,
    go_version: String,
    engine: Arc<dyn ContainerEngine>,
}

impl std::fmt::Debug for Ci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ci")
            .field("source", &self.source)
            .field("go_version", &self.go_version)
            .finish_non_exhaustive()
    }
}

impl Ci {
    /// Prepare the pipeline.
    ///
    /// `source` takes precedence over `git_ref`; without a source the demo
    /// repository is checked out at `git_ref`. The Go version is read once
    /// from the source's `go.mod`.
    pub async fn new(
        engine: Arc<dyn ContainerEngine>,
        source: Option<PathBuf>,
        git_ref: &str,
    ) -> Result<Self> {
        if source.is_none() && git_ref.is_empty() {
            return Err(CiError::MissingSource);
        }

        let source =
            resolve_source(engine.as_ref(), source.as_deref(), DEMO_REPOSITORY, git_ref).await?;

        let go_version = gomod::read_go_version(source.path())
            .await
            .map_err(CiError::GoVersion)?;

        info!(
            source = %source.path().display(),
            go_version = %go_version,
            "ci initialized"
        );

        Ok(Self {
            source,
            go_version,
            engine,
        })
    }

    /// Go toolchain version parsed from `go.mod`.
    pub fn go_version(&self) -> &str {
        &self.go_version
    }

    pub fn source_dir(&self) -> &Path {
        self.source.path()
    }

    /// Recipe that builds the application to `build/app`.
    ///
    /// `platform` of `None` builds for the engine's host platform. An empty
    /// `version` falls back to [`DEFAULT_VERSION`].
    pub fn build(&self, platform: Option<&Platform>, version: &str) -> Container {
        let version = if version.is_empty() {
            DEFAULT_VERSION
        } else {
            version
        };
        let date = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let ldflags = format!("-s -w -X main.version={version} -X main.date={date}");

        self.container(Step::Build)
            .with(|ctr| match platform {
                Some(platform) => platform
                    .go_env()
                    .into_iter()
                    .fold(ctr, |ctr, (key, value)| ctr.with_env_variable(key, value)),
                None => ctr,
            })
            .with_exec(["mkdir", "-p", "build"])
            .with_exec([
                "go",
                "build",
                "-trimpath",
                "-ldflags",
                ldflags.as_str(),
                "-o",
                "build/app",
                ".",
            ])
    }

    /// Recipe that runs the application on [`SERVICE_PORT`].
    pub fn service(&self) -> Container {
        let mut ctr = self.build(None, DEFAULT_VERSION);
        ctr.name = Step::Service.name().to_string();
        ctr.with_exec(["./build/app"])
            .with_exposed_port(SERVICE_PORT)
    }

    /// Build the application and start it as a service.
    pub async fn as_service(&self) -> Result<ServiceHandle> {
        self.engine.start_service(&self.service()).await
    }

    /// Stop a service returned by [`Ci::as_service`].
    pub async fn stop_service(&self, service: &ServiceHandle) -> Result<()> {
        self.engine.stop_service(service).await
    }

    /// Recipe that runs the test suite.
    pub fn test(&self) -> Container {
        self.container(Step::Test)
            .with_exec(["go", "test", "-v", "./..."])
    }

    /// Recipe that lints with golangci-lint.
    ///
    /// An empty `linter_version` pins [`DEFAULT_LINTER_VERSION`] rather than
    /// letting the install script pick the latest release, so `ci` runs the
    /// same linter from one day to the next.
    pub fn lint(&self, linter_version: &str) -> Container {
        let linter_version = if linter_version.is_empty() {
            DEFAULT_LINTER_VERSION
        } else {
            linter_version
        };

        self.container(Step::Lint)
            .with_mounted_file(
                GOLANGCI_INSTALL_PATH,
                FileSource::Url(GOLANGCI_INSTALL_SCRIPT.to_string()),
            )
            .with_exec(["chmod", "+x", GOLANGCI_INSTALL_PATH])
            .with_exec([GOLANGCI_INSTALL_PATH, "-b", "/usr/local/bin", linter_version])
            .with_exec(["golangci-lint", "run"])
    }

    /// Recipe for `step` with default settings.
    pub fn recipe(&self, step: Step) -> Container {
        match step {
            Step::Build => self.build(None, DEFAULT_VERSION),
            Step::Test => self.test(),
            Step::Lint => self.lint(DEFAULT_LINTER_VERSION),
            Step::Service => self.service(),
        }
    }

    /// Run a single recipe to completion.
    pub async fn sync(&self, container: &Container, cancel: &CancellationToken) -> Result<ExecOutput> {
        self.engine.sync(container, cancel).await
    }

    /// Run build, test and lint concurrently.
    ///
    /// Returns the first error encountered; the outcome of the other steps
    /// is discarded.
    pub async fn ci(&self, cancel: CancellationToken) -> Result<()> {
        let steps = Step::PIPELINE.iter().map(|step| self.recipe(*step)).collect();
        CiPipeline::run(Arc::clone(&self.engine), steps, cancel).await
    }

    /// Base container shared by every step.
    fn container(&self, step: Step) -> Container {
        Container::new(step.name())
            .from(format!("golang:{}", self.go_version))
            .with_mounted_cache("/go/pkg/mod", "go-mod-cache")
            .with_mounted_cache("/root/.cache/go-build", "go-build-cache")
            .with_workdir(SOURCE_MOUNT)
            .with_mounted_directory(SOURCE_MOUNT, self.source.path())
    }
}
