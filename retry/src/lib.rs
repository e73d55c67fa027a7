//! Retry-with-backoff for operations that can hit transient OS resource limits
//!
//! Copying a tree with one task per filesystem entry has no upper bound on concurrency, so a
//! wide directory can run the process out of file descriptors or the runtime out of room for
//! new tasks. Instead of capping concurrency with a pool or a semaphore, the operations that
//! consume those resources are wrapped here: when they fail because the process is out of file
//! descriptors (`EMFILE`, see [`is_fd_exhausted`]) they sleep for a fixed interval and try
//! again, forever. Every other failure is returned to the caller immediately.
//!
//! Tasks are the other resource a wide tree eats. Those are absorbed by tokio itself, see
//! [`spawn`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! # async fn example() -> std::io::Result<()> {
//! let backoff = Duration::from_secs(1);
//! let mut options = tokio::fs::OpenOptions::new();
//! options.read(true);
//! let file = retry::open_file(std::path::Path::new("/etc/hosts"), &options, backoff).await?;
//!
//! let mut join_set = tokio::task::JoinSet::new();
//! retry::spawn(&mut join_set, "worker", async { 42 });
//! # drop(file);
//! # Ok(())
//! # }
//! ```

mod classify;

pub use classify::is_fd_exhausted;

/// Interval slept between attempts unless configured otherwise.
pub const DEFAULT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

/// Runs `op` until it succeeds or fails with an error `is_exhausted` does not accept.
pub async fn retry_on<T, F, Fut>(
    backoff: std::time::Duration,
    is_exhausted: fn(&std::io::Error) -> bool,
    mut op: F,
) -> std::io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::io::Result<T>>,
{
    let mut attempt: u64 = 0;
    loop {
        match op().await {
            Err(error) if is_exhausted(&error) => {
                attempt += 1;
                tracing::debug!(
                    "resource exhausted: {}, retrying in {:?} (attempt {})",
                    &error,
                    backoff,
                    attempt
                );
                tokio::time::sleep(backoff).await;
            }
            result => return result,
        }
    }
}

/// Opens `path` with `options`, waiting out `EMFILE`.
pub async fn open_file(
    path: &std::path::Path,
    options: &tokio::fs::OpenOptions,
    backoff: std::time::Duration,
) -> std::io::Result<tokio::fs::File> {
    retry_on(backoff, is_fd_exhausted, move || options.open(path)).await
}

/// Opens `path` for enumeration, waiting out `EMFILE`.
///
/// Every caller gets its own handle, they are never shared.
pub async fn open_dir(
    path: &std::path::Path,
    backoff: std::time::Duration,
) -> std::io::Result<tokio::fs::ReadDir> {
    retry_on(backoff, is_fd_exhausted, move || tokio::fs::read_dir(path)).await
}

/// Spawns `task` onto `join_set`.
///
/// Unlike descriptors, tasks do not run out: tokio queues a new task instead of refusing it, and
/// when the OS will not start another blocking-pool thread (`EAGAIN`) the pool hands the blocking
/// call to a thread it already has. So this cannot fail and never waits.
pub fn spawn<T, Fut>(
    join_set: &mut tokio::task::JoinSet<T>,
    name: &str,
    task: Fut,
) -> tokio::task::AbortHandle
where
    T: Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
{
    tracing::trace!("spawning {name}");
    join_set.spawn(task)
}
