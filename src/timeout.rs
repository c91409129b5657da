//! Deadline racing for operations that may never return
//!
//! A raced operation is either completed or timed out, never both. The loser
//! is abandoned rather than killed: on timeout the spawned task or thread
//! keeps running until it finishes on its own, and its result is dropped.
//!
//! - [`race`] for async work
//! - [`race_blocking`] and [`watchdog`] for blocking calls that can stall
//!   indefinitely (dead network shares)
//! - [`offload`] for blocking calls raced by an outer [`race`]
//!
//! Blocking work runs on detached OS threads, never on tokio's blocking pool.
//! Runtime shutdown waits for pool tasks but not for detached threads, which
//! end with the process.

use crate::error::{Error, Result};
use log::{trace, warn};
use std::future::Future;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Race `fut` against a `timeout_ms` deadline
///
/// `timeout_ms == 0` disables the deadline and awaits `fut` directly. Nested
/// races resolve to the smaller deadline, and the error names that level's
/// `operation`.
pub async fn race<T, F>(operation: &str, timeout_ms: u64, fut: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    if timeout_ms == 0 {
        return fut.await;
    }

    // Spawned so that the work survives the race being dropped.
    let handle = tokio::spawn(fut);
    settle(operation, timeout_ms, handle).await
}

/// Race a blocking closure run on a detached thread
pub async fn race_blocking<T, F>(operation: &str, timeout_ms: u64, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    watchdog(operation, timeout_ms, f).await
}

/// Run a blocking closure on a detached thread with no deadline of its own
///
/// Backends use this for OS calls; the deadline comes from the [`race`]
/// wrapping the backend call.
pub async fn offload<T, F>(operation: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    watchdog(operation, 0, f).await
}

async fn settle<T>(
    operation: &str,
    timeout_ms: u64,
    handle: tokio::task::JoinHandle<Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
        Ok(joined) => {
            trace!("[timeout] {} completed", operation);
            joined?
        }
        Err(_) => {
            // Dropping the JoinHandle detaches the task; it is not aborted.
            trace!("[timeout] {} timed out after {}ms", operation, timeout_ms);
            Err(Error::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            })
        }
    }
}

/// Run `f` on its own OS thread and wait at most `timeout_ms` for it
///
/// On timeout the caller gets [`Error::Timeout`] immediately and the thread is
/// left to finish, or to be torn down at process exit.
pub async fn watchdog<T, F>(operation: &str, timeout_ms: u64, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let name = operation.to_string();

    thread::Builder::new()
        .name("volmeta-watchdog".to_string())
        .spawn(move || {
            let result = f();
            if tx.send(result).is_err() {
                warn!("[timeout] {} finished after its caller gave up", name);
            }
        })
        .map_err(|e| Error::native("spawn watchdog thread", e))?;

    let completion = async move {
        rx.await
            .map_err(|_| Error::Task("watchdog thread exited without a result".to_string()))?
    };

    if timeout_ms == 0 {
        return completion.await;
    }

    match tokio::time::timeout(Duration::from_millis(timeout_ms), completion).await {
        Ok(result) => result,
        Err(_) => {
            trace!("[timeout] {} watchdog expired after {}ms", operation, timeout_ms);
            Err(Error::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            })
        }
    }
}
