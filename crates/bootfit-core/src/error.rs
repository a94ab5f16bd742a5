//! # Error Module
//!
//! Typed failures for a single validation run.
//!
//! Every failure is terminal: nothing here is retried by the core.
//! Rendering to a one-line message happens at the binary boundary.

use crate::SectorCount;
use thiserror::Error;

// =============================================================================
// TOP-LEVEL ERROR
// =============================================================================

/// Errors produced while checking sector capacity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// The bootloader source lacks the expected declaration structure.
    #[error("malformed bootloader source: {0}")]
    MalformedSource(#[from] SourceError),

    /// Extracted or externally produced text is not a valid expression.
    #[error("cannot evaluate `{expression}`: {source}")]
    Expression {
        /// The offending text, verbatim.
        expression: String,
        /// What went wrong.
        #[source]
        source: ExprError,
    },

    /// The external sector counter reported a failure.
    #[error("{}", external_message(.diagnostic))]
    ExternalTool {
        /// Diagnostic text forwarded verbatim from the counter.
        diagnostic: String,
    },

    /// The kernel needs more sectors than the bootloader loads.
    #[error("need {required} sectors; bootloader provides only {available}")]
    CapacityExceeded {
        /// Sectors declared by the bootloader.
        available: SectorCount,
        /// Sectors occupied by the kernel binary.
        required: SectorCount,
    },
}

fn external_message(diagnostic: &str) -> String {
    if diagnostic.trim().is_empty() {
        "external sector counter failed without a diagnostic".to_string()
    } else {
        diagnostic.to_string()
    }
}

impl CapacityError {
    /// Wrap an evaluator failure together with the text that caused it.
    pub fn expression(expression: impl Into<String>, source: ExprError) -> Self {
        Self::Expression {
            expression: expression.into(),
            source,
        }
    }

    /// Build an external tool failure from a diagnostic.
    pub fn external(diagnostic: impl Into<String>) -> Self {
        Self::ExternalTool {
            diagnostic: diagnostic.into(),
        }
    }
}

// =============================================================================
// SOURCE STRUCTURE ERRORS
// =============================================================================

/// Structural problems in the bootloader source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Fewer marker occurrences than the selected region needs.
    #[error("expected at least {needed} occurrences of `{marker}`, found {found}")]
    InsufficientMarkers {
        marker: String,
        found: usize,
        needed: usize,
    },

    /// The selected region has no terminator.
    #[error("no `{terminator}` after occurrence {occurrence} of `{marker}` (line {line})")]
    MissingTerminator {
        marker: String,
        terminator: String,
        occurrence: usize,
        line: usize,
    },

    /// Named extraction found no declaration.
    #[error("no declaration of `{marker}` found")]
    MissingDeclaration { marker: String },

    /// Named extraction found more than one declaration.
    #[error("`{marker}` is declared more than once (lines {lines:?})")]
    AmbiguousDeclaration { marker: String, lines: Vec<usize> },

    /// A declaration with nothing after the name.
    #[error("declaration of `{marker}` on line {line} has no value")]
    EmptyDeclaration { marker: String, line: usize },

    /// The marker token itself is empty.
    #[error("marker token must not be empty")]
    EmptyMarker,
}

// =============================================================================
// EXPRESSION ERRORS
// =============================================================================

/// Failures of the restricted integer evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character `{ch}` at byte {position}")]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("invalid integer literal `{literal}`")]
    InvalidLiteral { literal: String },

    #[error("unexpected `{token}` at byte {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("parentheses nested deeper than {0}")]
    NestingTooDeep(usize),

    #[error("sector count must not be negative, got {0}")]
    Negative(i64),
}

// =============================================================================
// TESTS
// =============================================================================
