//! Concurrent directory tree copy
//!
//! The engine walks the source tree with one tokio task per entry. Every directory task owns a
//! [`tokio::task::JoinSet`] holding the tasks it spawned for its own entries and waits for all of
//! them before it returns, so the root task finishing means the whole tree has been copied.
//!
//! - [`copy_tree`] validates the two roots and runs the root directory task
//! - [`copy::copy_dir`] / [`copy::copy_file`] are the per-entry tasks
//! - [`path::join`] builds child paths, refusing ones longer than the OS allows
//!
//! Failures inside the tree are logged and abandon only the entry they happened on. Running out
//! of file descriptors is retried with a fixed backoff by the `retry` crate.

pub mod config;
pub mod copy;
pub mod driver;
pub mod error;
pub mod path;
pub mod task;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig};
pub use copy::{Settings as CopySettings, Summary};
pub use driver::{DriverError, copy_tree};
pub use error::{Error, ErrorKind};
pub use task::{CopyTask, EntryKind};

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_runtime(runtime: &RuntimeConfig) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("dcp-worker");
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    builder.build()
}

/// Sets up logging and the runtime, then drives `func` to completion.
///
/// Returns `None` when `func` (or the runtime setup) failed; the error has been printed to
/// stderr already, regardless of `quiet`.
pub fn run<Fut>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_tracing(&output);
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start the runtime: {error}");
            return None;
        }
    };
    match runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            eprintln!("{error:#}");
            None
        }
    }
}
