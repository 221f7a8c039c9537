//! Error-collecting task pool.
//!
//! [`ErrorPool`] runs tasks concurrently on the Tokio runtime, waits for all
//! of them and reports the first error in completion order. A failing task
//! does not cancel its siblings; only the caller's token does.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;

use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A pool of fallible tasks sharing one cancellation signal.
pub struct ErrorPool<E> {
    tasks: JoinSet<Result<(), E>>,
    names: HashMap<Id, String>,
    cancel: CancellationToken,
}

impl<E> ErrorPool<E>
where
    E: From<JoinError> + Display + Send + 'static,
{
    /// Create a pool whose tasks observe `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            names: HashMap::new(),
            cancel,
        }
    }

    /// Spawn a named task. `f` receives a child of the pool's token.
    pub fn go<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let name = name.into();
        let task = f(self.cancel.child_token());
        debug!(task = %name, "spawning pool task");
        let handle = self.tasks.spawn(task);
        self.names.insert(handle.id(), name);
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task and return the first error, if any.
    ///
    /// Errors from later tasks are logged and discarded. A panicking task
    /// is reported as an error converted from its [`JoinError`].
    pub async fn wait(mut self) -> Result<(), E> {
        let mut first: Option<E> = None;

        while let Some(joined) = self.tasks.join_next_with_id().await {
            let err = match joined {
                Ok((id, Ok(()))) => {
                    debug!(task = %self.take_name(id), "pool task finished");
                    continue;
                }
                Ok((id, Err(err))) => {
                    warn!(task = %self.take_name(id), error = %err, "pool task failed");
                    err
                }
                Err(join_err) => {
                    let name = self.take_name(join_err.id());
                    warn!(task = %name, error = %join_err, "pool task did not complete");
                    E::from(join_err)
                }
            };

            if first.is_none() {
                first = Some(err);
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn take_name(&mut self, id: Id) -> String {
        self.names
            .remove(&id)
            .unwrap_or_else(|| format!("task-{id}"))
    }
}
