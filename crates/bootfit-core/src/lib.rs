//! # Bootfit Core
//!
//! Build-time check that a kernel binary fits into the sectors a bootloader
//! has been configured to load.
//!
//! ## Pipeline
//!
//! ```text
//! bootloader.asm ──► Extractor ──► available ─┐
//!                                             ├──► compare ──► ValidationOutcome
//! kernel.bin ──► SectorCounter ──► required ──┘
//! ```
//!
//! - [`extract`] finds the capacity declaration (named or positional).
//! - [`expr`] evaluates it with a restricted integer grammar.
//! - [`gate`] runs the injected counter and decides pass/fail.
//!
//! This crate performs no I/O. Reading files and spawning the external
//! counter belong to the `bootfit` binary.

pub mod error;
pub mod expr;
pub mod extract;
pub mod gate;
pub mod sectors;

/// A number of disk sectors.
pub type SectorCount = u64;

pub use error::{CapacityError, ExprError, SourceError};
pub use expr::{evaluate_integer_expression, evaluate_sector_count, evaluate_with_symbols, Symbols};
pub use extract::{
    collect_symbols, extract_capacity, find_named_declaration, CapacityDeclaration,
    DeclarationForm, ExtractedCapacity, ExtractionMode, Extractor, DEFAULT_MARKER,
    DEFAULT_OCCURRENCE_INDEX, DEFAULT_TERMINATOR,
};
pub use gate::{compare, validate, SectorCounter, ValidationOutcome};
pub use sectors::{sectors_for_bytes, DEFAULT_SECTOR_SIZE};
