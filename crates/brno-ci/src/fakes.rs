//! In-memory container engine (testing only)
//!
//! [`RecordingEngine`] records every recipe it is asked to run and fails
//! steps on request, without touching Docker or the network.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::checkout::SourceDir;
use crate::container::Container;
use crate::engine::{ContainerEngine, ServiceHandle};
use crate::error::{CiError, Result};
use crate::runner::ExecOutput;

#[derive(Debug, Clone)]
struct ScriptedFailure {
    exit_code: i32,
    stderr: String,
}

/// Container engine double that records recipes instead of running them.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    failures: HashMap<String, ScriptedFailure>,
    delays: HashMap<String, Duration>,
    checkout_dir: Option<PathBuf>,

    synced: Mutex<Vec<Container>>,
    checkouts: Mutex<Vec<(String, String)>>,
    services: Mutex<Vec<Container>>,
    stopped: Mutex<Vec<String>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the step named `step` exit with `exit_code`.
    pub fn fail_step(mut self, step: &str, exit_code: i32, stderr: &str) -> Self {
        self.failures.insert(
            step.to_string(),
            ScriptedFailure {
                exit_code,
                stderr: stderr.to_string(),
            },
        );
        self
    }

    /// Make the step named `step` take `delay` before finishing.
    pub fn delay_step(mut self, step: &str, delay: Duration) -> Self {
        self.delays.insert(step.to_string(), delay);
        self
    }

    /// Serve checkouts from an existing directory.
    pub fn with_checkout_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkout_dir = Some(dir.into());
        self
    }

    /// Recipes passed to `sync`, in call order.
    pub fn synced(&self) -> Vec<Container> {
        self.synced.lock().unwrap().clone()
    }

    /// `(url, ref)` pairs passed to `checkout`.
    pub fn checkouts(&self) -> Vec<(String, String)> {
        self.checkouts.lock().unwrap().clone()
    }

    /// Recipes passed to `start_service`.
    pub fn services(&self) -> Vec<Container> {
        self.services.lock().unwrap().clone()
    }

    /// Ids passed to `stop_service`.
    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerEngine for RecordingEngine {
    async fn checkout(&self, url: &str, git_ref: &str) -> Result<SourceDir> {
        self.checkouts
            .lock()
            .unwrap()
            .push((url.to_string(), git_ref.to_string()));

        match &self.checkout_dir {
            Some(dir) => Ok(SourceDir::local(dir.clone())),
            None => Err(CiError::Checkout {
                url: url.to_string(),
                git_ref: git_ref.to_string(),
                reason: "no checkout directory configured".to_string(),
            }),
        }
    }

    async fn sync(&self, container: &Container, cancel: &CancellationToken) -> Result<ExecOutput> {
        self.synced.lock().unwrap().push(container.clone());

        if let Some(delay) = self.delays.get(&container.name) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CiError::Cancelled { step: container.name.clone() });
                }
                _ = tokio::time::sleep(*delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(CiError::Cancelled {
                step: container.name.clone(),
            });
        }

        let (exit_code, stderr) = match self.failures.get(&container.name) {
            Some(failure) => (failure.exit_code, failure.stderr.clone()),
            None => (0, String::new()),
        };

        ExecOutput {
            step: container.name.clone(),
            exit_code,
            stdout: String::new(),
            stderr,
            duration_ms: 0,
        }
        .into_result()
    }

    async fn start_service(&self, container: &Container) -> Result<ServiceHandle> {
        let mut services = self.services.lock().unwrap();
        services.push(container.clone());
        Ok(ServiceHandle::new(
            format!("fake-{}", services.len()),
            &container.name,
            container.exposed_ports.clone(),
        ))
    }

    async fn stop_service(&self, service: &ServiceHandle) -> Result<()> {
        self.stopped.lock().unwrap().push(service.id.clone());
        Ok(())
    }
}
