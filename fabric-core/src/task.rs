pub mod waiter;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use fabric_logging::LOG_TASK;
use tokio::sync::{oneshot, watch};
use tracing::trace;

use crate::runtime;

/// Tasks racing for one result, stopped together once it is in
///
/// Each task gets a [`TaskHandle`] to watch for [`TaskGroup::shutdown`].
/// Stopping is cooperative: a task that never looks at its handle runs to
/// completion on its own and its result is dropped.
#[derive(Clone, Debug)]
pub struct TaskGroup {
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self {
            shutdown_tx: Arc::new(watch::Sender::new(false)),
        }
    }
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every task of the group to stop; idempotent
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Spawn `f` on the runtime; its output arrives on the returned receiver
    /// unless the receiver was dropped first
    pub fn spawn<Fut, R>(
        &self,
        name: impl Into<String>,
        f: impl FnOnce(TaskHandle) -> Fut + Send + 'static,
    ) -> oneshot::Receiver<R>
    where
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let name = name.into();
        let handle = TaskHandle {
            shutdown_rx: self.shutdown_tx.subscribe(),
        };
        let (tx, rx) = oneshot::channel();
        runtime::spawn(&name, async move {
            let _ = tx.send(f(handle).await);
        });
        trace!(target: LOG_TASK, task = %name, "Spawned task");
        rx
    }
}

/// A task's view of its [`TaskGroup`]
#[derive(Clone, Debug)]
pub struct TaskHandle {
    shutdown_rx: watch::Receiver<bool>,
}

impl TaskHandle {
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Future resolving once the group shuts down, for use in `select!`
    pub fn make_shutdown_rx(&self) -> TaskShutdownToken {
        let mut rx = self.shutdown_rx.clone();
        TaskShutdownToken(Box::pin(async move {
            // a dropped group counts as shut down
            let _ = rx.wait_for(|stop| *stop).await;
        }))
    }
}

pub struct TaskShutdownToken(Pin<Box<dyn Future<Output = ()> + Send>>);

impl Future for TaskShutdownToken {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests;
