//! Concurrent pipeline execution.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::container::Container;
use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::pool::ErrorPool;

/// Runs a set of recipes concurrently against one engine.
pub struct CiPipeline;

impl CiPipeline {
    /// Sync every recipe concurrently and wait for all of them.
    ///
    /// Returns the first error in completion order. Steps are not retried
    /// and a failing step does not stop its siblings; `cancel` is passed
    /// through to each of them.
    pub async fn run(
        engine: Arc<dyn ContainerEngine>,
        steps: Vec<Container>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let names: Vec<String> = steps.iter().map(|s| s.name.clone()).collect();

        info!(run_id = %run_id, steps = ?names, "starting ci pipeline");

        let mut pool = ErrorPool::new(cancel);
        for step in steps {
            let engine = Arc::clone(&engine);
            pool.go(step.name.clone(), move |cancel| async move {
                engine.sync(&step, &cancel).await.map(|_| ())
            });
        }

        let result = pool.wait().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => info!(run_id = %run_id, duration_ms, "ci pipeline completed successfully"),
            Err(e) => error!(run_id = %run_id, duration_ms, error = %e, "ci pipeline failed"),
        }

        result
    }
}
