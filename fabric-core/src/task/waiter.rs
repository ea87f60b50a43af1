//! One-shot completion latch shared between tasks.

use tokio::sync::Semaphore;

/// Lets any number of tasks wait until some other task calls
/// [`Self::done`]
///
/// Unlike a `oneshot` channel it can be completed from any of several
/// racing tasks, and only the first call has an effect.
#[derive(Debug)]
pub struct Waiter {
    done_semaphore: Semaphore,
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            // never has permits, closing it is the signal
            done_semaphore: Semaphore::new(0),
        }
    }

    /// Mark as done, waking every waiter. Later calls are no-ops.
    pub fn done(&self) {
        self.done_semaphore.close();
    }

    /// Resolves once [`Self::done`] was called, immediately if it already was
    pub async fn wait(&self) {
        // acquiring only ever fails, and only once the semaphore is closed
        let _ = self.done_semaphore.acquire().await;
    }

    pub fn is_done(&self) -> bool {
        self.done_semaphore.is_closed()
    }
}
