use anyhow::Result;
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dcp",
    version,
    about = "Copy a directory tree using one concurrent task per entry",
    long_about = "`dcp` copies a directory tree, preserving its structure and permission bits.

Every file and directory found is copied by its own task, with no limit on how many run at
once. When the process runs out of file descriptors, the affected open sleeps
and retries.

Only regular files and directories are copied; symlinks, devices, sockets and FIFOs are
skipped. Errors on individual entries are logged and do not change the exit code.

EXAMPLE:
    # Copy /data/src into /backup/src (created if missing)
    dcp /data/src /backup/src --summary"
)]
struct Args {
    // Copy options
    /// How long to wait before retrying when out of file descriptors
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "1s" etc.
    #[arg(
        long,
        default_value = "1s",
        value_name = "DELAY",
        value_parser = common::config::parse_retry_backoff,
        help_heading = "Copy options"
    )]
    retry_backoff: std::time::Duration,

    // Progress & output
    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors on individual entries
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Directory to copy
    #[arg()]
    source: std::path::PathBuf,

    /// Where to copy it, must not be inside the source
    #[arg()]
    destination: std::path::PathBuf,
}

#[instrument]
async fn async_main(args: Args) -> Result<common::Summary> {
    let settings = common::CopySettings {
        retry_backoff: args.retry_backoff,
    };
    let summary = common::copy_tree(&args.source, &args.destination, settings).await?;
    Ok(summary)
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // usage errors exit with 1, --help and --version with 0
            let code = i32::from(error.use_stderr());
            let _ = error.print();
            std::process::exit(code);
        }
    };
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    if common::run(output, runtime, func).is_none() {
        std::process::exit(1);
    }
    Ok(())
}
