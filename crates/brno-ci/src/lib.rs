//! brno-ci - containerized CI for the hello-brno Go application
//!
//! Provides a pipeline definition that:
//! - Reads the Go toolchain version from `go.mod`
//! - Describes build, test and lint steps as container recipes
//! - Runs the three steps concurrently and reports the first failure

pub mod checkout;
pub mod ci;
pub mod container;
pub mod docker;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod gomod;
pub mod pipeline;
pub mod platform;
pub mod pool;
pub mod runner;
pub mod stage;
pub mod telemetry;

// Re-export key types
pub use checkout::SourceDir;
pub use ci::{Ci, DEFAULT_LINTER_VERSION, DEFAULT_REF, DEFAULT_VERSION, DEMO_REPOSITORY, SERVICE_PORT};
pub use container::{Container, FileSource};
pub use docker::DockerEngine;
pub use engine::{ContainerEngine, ServiceHandle};
pub use error::{CiError, Result};
pub use pipeline::CiPipeline;
pub use platform::{Platform, PlatformError};
pub use pool::ErrorPool;
pub use runner::{CommandRunner, ExecOutput};
pub use stage::Step;
pub use telemetry::init_tracing;
