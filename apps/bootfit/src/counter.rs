//! # Sector Counters
//!
//! Real implementations of [`SectorCounter`].
//!
//! - [`CommandCounter`] runs the project's external counting script with the
//!   kernel path in an environment variable, bounded by a timeout.
//! - [`FileSizeCounter`] derives the count from the binary's size on disk.

use bootfit_core::{sectors_for_bytes, SectorCounter};
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

// =============================================================================
// DEFAULTS
// =============================================================================

/// Script that prints the kernel's sector count.
pub const DEFAULT_COUNTER_PROGRAM: &str = "./scripts/num_sectors.sh";

/// Arguments passed to the counter script.
pub const DEFAULT_COUNTER_ARGS: &[&str] = &["--no-verbose"];

/// Environment variable carrying the kernel path to the script.
pub const DEFAULT_KERNEL_ENV: &str = "KERNEL_BIN_PATH";

/// Upper bound on a single counter run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawn attempts before giving up (first try plus one retry).
const SPAWN_ATTEMPTS: u32 = 2;

/// Pause before retrying a failed spawn.
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// COMMAND COUNTER
// =============================================================================

/// Runs an external program that prints the kernel's sector count.
///
/// Any text on stderr is a failure and is forwarded verbatim. A non-zero
/// exit status without stderr output is a failure too. Only spawning is
/// retried; a program that ran and failed, or timed out, is not.
#[derive(Debug, Clone)]
pub struct CommandCounter {
    program: PathBuf,
    args: Vec<String>,
    kernel_env: String,
    timeout: Duration,
}

impl Default for CommandCounter {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_COUNTER_PROGRAM),
            args: DEFAULT_COUNTER_ARGS.iter().map(|a| a.to_string()).collect(),
            kernel_env: DEFAULT_KERNEL_ENV.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CommandCounter {
    /// Counter running `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_kernel_env(mut self, name: impl Into<String>) -> Self {
        self.kernel_env = name.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self, kernel_binary: &Path) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .env(&self.kernel_env, kernel_binary)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }

    async fn spawn_with_retry(&self, kernel_binary: &Path) -> Result<Child, String> {
        let mut attempt = 1;
        loop {
            match self.spawn(kernel_binary) {
                Ok(child) => return Ok(child),
                Err(e) if attempt < SPAWN_ATTEMPTS => {
                    warn!(
                        program = %self.program.display(),
                        error = %e,
                        "failed to start sector counter, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(SPAWN_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(format!(
                        "failed to start {}: {e}",
                        self.program.display()
                    ));
                }
            }
        }
    }

    async fn run(&self, kernel_binary: &Path) -> Result<String, String> {
        debug!(
            program = %self.program.display(),
            args = ?self.args,
            env = %self.kernel_env,
            kernel = %kernel_binary.display(),
            "running sector counter"
        );

        let child = self.spawn_with_retry(kernel_binary).await?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(format!(
                    "failed to wait for {}: {e}",
                    self.program.display()
                ));
            }
            Err(_) => {
                return Err(format!(
                    "{} timed out after {} ms",
                    self.program.display(),
                    self.timeout.as_millis()
                ));
            }
        };

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = stderr.trim_end();
            return Err(if diagnostic.is_empty() {
                format!("{} wrote to stderr", self.program.display())
            } else {
                diagnostic.to_string()
            });
        }
        if !output.status.success() {
            return Err(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            ));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| format!("{} printed non-UTF-8 output", self.program.display()))?;
        debug!(output = %stdout.trim(), "sector counter finished");
        Ok(stdout)
    }
}

impl SectorCounter for CommandCounter {
    fn count_sectors(&self, kernel_binary: &Path) -> Result<String, String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("cannot start async runtime: {e}"))?;
        runtime.block_on(self.run(kernel_binary))
    }
}

// =============================================================================
// FILE SIZE COUNTER
// =============================================================================

/// Counts sectors from the kernel binary's size on disk.
#[derive(Debug, Clone, Copy)]
pub struct FileSizeCounter {
    sector_size: NonZeroU64,
}

impl FileSizeCounter {
    pub fn new(sector_size: NonZeroU64) -> Self {
        Self { sector_size }
    }
}

impl SectorCounter for FileSizeCounter {
    fn count_sectors(&self, kernel_binary: &Path) -> Result<String, String> {
        let metadata = std::fs::metadata(kernel_binary)
            .map_err(|e| format!("cannot read {}: {e}", kernel_binary.display()))?;
        if !metadata.is_file() {
            return Err(format!("{} is not a regular file", kernel_binary.display()));
        }
        let sectors = sectors_for_bytes(metadata.len(), self.sector_size);
        debug!(
            kernel = %kernel_binary.display(),
            bytes = metadata.len(),
            sector_size = self.sector_size.get(),
            sectors,
            "counted kernel sectors from file size"
        );
        Ok(sectors.to_string())
    }
}
