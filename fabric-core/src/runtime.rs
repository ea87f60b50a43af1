//! Thin layer over the tokio executor, so the rest of the code base never
//! spawns or sleeps through tokio directly.

use std::future::Future;
use std::time::Duration;

pub use tokio::task::JoinHandle;
use tracing::Instrument as _;

/// Spawn a named task on the current runtime
///
/// The name is attached as a tracing span, so every log line emitted by the
/// task can be traced back to it.
pub fn spawn<F, T>(name: &str, future: F) -> JoinHandle<T>
where
    F: Future<Output = T> + 'static + Send,
    T: Send + 'static,
{
    let span = tracing::debug_span!("task", name);
    tokio::spawn(future.instrument(span))
}

pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}
