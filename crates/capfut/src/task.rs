//! Detached and scoped local tasks.

use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;

/// Detaches a future, running it to completion on the current `LocalSet`.
///
/// A daemon has no handle and cannot be cancelled; a failure is logged and
/// otherwise swallowed. Used for work that must finish regardless of whether
/// anyone is still watching, such as driving a call that the caller has lost
/// interest in.
pub fn spawn_daemon<E>(future: impl Future<Output = Result<(), E>> + 'static)
where
    E: Display + 'static,
{
    tokio::task::spawn_local(async move {
        if let Err(error) = future.await {
            tracing::trace!(%error, "daemon task failed");
        }
    });
}

/// A local task that is aborted when the guard is dropped.
///
/// Ties a background operation to the lifetime of the object that spawned
/// it, so dropping the owner also drops whatever the task was holding.
pub struct ScopedTask {
    handle: JoinHandle<()>,
}

impl ScopedTask {
    pub fn spawn(future: impl Future<Output = ()> + 'static) -> Self {
        Self {
            handle: tokio::task::spawn_local(future),
        }
    }
}

impl Drop for ScopedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
