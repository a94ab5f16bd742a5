//! # CLI Module
//!
//! Argument surface and the `check` flow of the `bootfit` binary.
//!
//! Every constant the old build script hard-coded (marker, terminator, region
//! index, script path, environment variable) is an option here, defaulting
//! to the old value.

use crate::counter::{
    CommandCounter, FileSizeCounter, DEFAULT_COUNTER_PROGRAM, DEFAULT_KERNEL_ENV,
};
use crate::error::{AppError, EXIT_FAIL, EXIT_PASS};
use bootfit_core::{
    validate, DeclarationForm, ExtractionMode, Extractor, SectorCount, SectorCounter,
    ValidationOutcome, DEFAULT_MARKER, DEFAULT_OCCURRENCE_INDEX, DEFAULT_SECTOR_SIZE,
    DEFAULT_TERMINATOR,
};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Bootloader source read when `--bootloader` is not given.
pub const DEFAULT_BOOTLOADER: &str = "bootloader/bios/bootloader.asm";

// =============================================================================
// ARGUMENTS
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "bootfit")]
#[command(version)]
#[command(about = "Check that a kernel binary fits into the sectors the bootloader loads")]
pub struct Cli {
    /// Path to the compiled kernel binary
    pub kernel: PathBuf,

    /// Bootloader source declaring the sector capacity
    #[arg(long, env = "BOOTFIT_BOOTLOADER", default_value = DEFAULT_BOOTLOADER)]
    pub bootloader: PathBuf,

    /// Name of the capacity constant
    #[arg(long, default_value = DEFAULT_MARKER)]
    pub marker: String,

    /// Token closing the capacity region (positional extraction)
    #[arg(long, default_value = DEFAULT_TERMINATOR, allow_hyphen_values = true)]
    pub terminator: String,

    /// Zero-based region index (positional extraction)
    #[arg(long, default_value_t = DEFAULT_OCCURRENCE_INDEX)]
    pub occurrence_index: usize,

    /// How to find the capacity declaration
    #[arg(long, value_enum, default_value_t = Extraction::Auto)]
    pub extraction: Extraction,

    /// Program printing the kernel's sector count
    #[arg(long, env = "BOOTFIT_COUNTER", default_value = DEFAULT_COUNTER_PROGRAM)]
    pub counter: PathBuf,

    /// Argument for the counter program (repeatable)
    #[arg(
        long = "counter-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        default_values = ["--no-verbose"]
    )]
    pub counter_args: Vec<String>,

    /// Environment variable carrying the kernel path to the counter
    #[arg(long, default_value = DEFAULT_KERNEL_ENV)]
    pub kernel_env: String,

    /// Counter timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 30_000)]
    pub timeout: u64,

    /// Count sectors from the kernel's file size instead of running the counter
    #[arg(long)]
    pub native: bool,

    /// Sector size in bytes for --native
    #[arg(long, default_value_t = default_sector_size())]
    pub sector_size: NonZeroU64,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// `--extraction` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Extraction {
    /// Named declaration, positional region as fallback
    Auto,
    /// Named declaration only
    Named,
    /// Positional region only
    Positional,
}

fn default_sector_size() -> NonZeroU64 {
    NonZeroU64::new(DEFAULT_SECTOR_SIZE).unwrap_or(NonZeroU64::MIN)
}

impl From<Extraction> for ExtractionMode {
    fn from(value: Extraction) -> Self {
        match value {
            Extraction::Auto => ExtractionMode::Auto,
            Extraction::Named => ExtractionMode::Named,
            Extraction::Positional => ExtractionMode::Positional,
        }
    }
}

impl Cli {
    /// Extractor configured from the command line.
    pub fn extractor(&self) -> Extractor {
        Extractor::new()
            .with_marker(self.marker.clone())
            .with_terminator(self.terminator.clone())
            .with_occurrence_index(self.occurrence_index)
            .with_mode(self.extraction.into())
    }

    /// Sector counter configured from the command line.
    pub fn sector_counter(&self) -> Box<dyn SectorCounter> {
        if self.native {
            Box::new(FileSizeCounter::new(self.sector_size))
        } else {
            Box::new(
                CommandCounter::new(&self.counter)
                    .with_args(self.counter_args.iter().cloned())
                    .with_kernel_env(self.kernel_env.clone())
                    .with_timeout(Duration::from_millis(self.timeout)),
            )
        }
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// Everything known about one check, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub bootloader: PathBuf,
    pub kernel: PathBuf,
    /// Capacity expression as written in the source, trimmed.
    pub expression: String,
    /// 1-based line of the declaration.
    pub line: usize,
    pub form: DeclarationForm,
    #[serde(flatten)]
    pub outcome: ValidationOutcome,
}

impl CheckReport {
    pub fn available(&self) -> SectorCount {
        self.outcome.available()
    }

    pub fn required(&self) -> SectorCount {
        self.outcome.required()
    }
}

/// Render a report as text or JSON.
pub fn render_report(report: &CheckReport, json: bool) -> Result<String, AppError> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }
    Ok(match report.outcome.diagnostic() {
        Some(diagnostic) => format!(
            "{diagnostic} ({} line {})",
            report.bootloader.display(),
            report.line
        ),
        None => report.outcome.to_string(),
    })
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Read the bootloader source.
pub fn read_bootloader(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Run one capacity check.
///
/// Extraction runs first; the counter is only invoked once the source has
/// yielded a capacity.
pub fn cmd_check<C>(
    kernel: &Path,
    bootloader: &Path,
    extractor: &Extractor,
    counter: &C,
) -> Result<CheckReport, AppError>
where
    C: SectorCounter + ?Sized,
{
    let source = read_bootloader(bootloader)?;
    let capacity = extractor
        .capacity(&source)
        .map_err(|err| AppError::Source {
            path: bootloader.to_path_buf(),
            source: err,
        })?;
    debug!(
        bootloader = %bootloader.display(),
        line = capacity.declaration.line,
        form = ?capacity.declaration.form,
        expression = %capacity.declaration.expression.trim(),
        available = capacity.sectors,
        "extracted sector capacity"
    );

    let outcome = validate(capacity.sectors, kernel, counter)?;
    info!(
        available = outcome.available(),
        required = outcome.required(),
        pass = outcome.is_pass(),
        "capacity check finished"
    );

    Ok(CheckReport {
        bootloader: bootloader.to_path_buf(),
        kernel: kernel.to_path_buf(),
        expression: capacity.declaration.expression.trim().to_string(),
        line: capacity.declaration.line,
        form: capacity.declaration.form,
        outcome,
    })
}

/// Run the check described by `cli`, print the result and return the exit status.
///
/// Passing checks print nothing in text mode unless logging is raised.
/// Failures and errors print one line on stderr.
pub fn run(cli: &Cli) -> u8 {
    let counter = cli.sector_counter();
    let result = cmd_check(&cli.kernel, &cli.bootloader, &cli.extractor(), counter.as_ref())
        .and_then(|report| render_report(&report, cli.json).map(|text| (report, text)));

    match result {
        Ok((report, text)) => {
            if cli.json {
                println!("{text}");
            } else if report.outcome.is_pass() {
                info!("{text}");
            } else {
                eprintln!("error: {text}");
            }
            if report.outcome.is_pass() {
                EXIT_PASS
            } else {
                EXIT_FAIL
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            EXIT_FAIL
        }
    }
}
