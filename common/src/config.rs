//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress per-entry error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Default log directive for this configuration, `RUST_LOG` takes precedence over it.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Parses the interval slept between retries, e.g. "1s", "250ms".
pub fn parse_retry_backoff(value: &str) -> Result<std::time::Duration, String> {
    let backoff = humantime::parse_duration(value).map_err(|err| err.to_string())?;
    if backoff.is_zero() {
        return Err("retry backoff must be greater than zero".to_string());
    }
    Ok(backoff)
}
