//! # Extract Module
//!
//! Locates the sector-capacity constant in bootloader source text.
//!
//! Two strategies exist:
//! - **Positional**: split the text at every marker token, pick one region by
//!   index and cut it at the terminator. This is how existing build scripts
//!   have always read `bootloader.asm`, so it stays available unchanged.
//! - **Named**: scan line by line for a NASM declaration whose name is the
//!   marker (`%define`, `%xdefine`, `%assign`, `equ`, `=`).
//!
//! [`ExtractionMode::Auto`] prefers the named declaration and falls back to
//! the positional region when the source has none.

use crate::error::{CapacityError, SourceError};
use crate::expr::{evaluate_raw, evaluate_sector_count, is_ident_start, is_word_char, Symbols};
use crate::SectorCount;
use serde::Serialize;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Symbol the bootloader uses for its sector capacity.
pub const DEFAULT_MARKER: &str = "NUM_SECTORS";

/// Token closing the capacity region in positional mode.
pub const DEFAULT_TERMINATOR: &str = "%endif";

/// Zero-based region index used by positional mode.
pub const DEFAULT_OCCURRENCE_INDEX: usize = 3;

// =============================================================================
// TYPES
// =============================================================================

/// How the extractor finds the declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Named declaration first, positional region as fallback.
    #[default]
    Auto,
    /// Named declaration only.
    Named,
    /// Positional region only.
    Positional,
}

/// The syntactic form a declaration was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationForm {
    /// `%define NAME expr` or `%xdefine NAME expr`.
    Define,
    /// `%assign NAME expr`.
    Assign,
    /// `NAME equ expr`.
    Equ,
    /// `NAME = expr`.
    Assignment,
    /// Region between the marker at a fixed index and the terminator.
    Positional,
}

/// A capacity declaration found in the source.
///
/// Borrows the expression text straight from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityDeclaration<'a> {
    /// Expression text, whitespace preserved.
    pub expression: &'a str,
    /// 1-based line where the expression starts.
    pub line: usize,
    /// How the declaration was written.
    pub form: DeclarationForm,
}

/// A declaration together with its evaluated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedCapacity<'a> {
    pub declaration: CapacityDeclaration<'a>,
    pub sectors: SectorCount,
}

// =============================================================================
// POSITIONAL EXTRACTION
// =============================================================================

/// Extract the expression text of the capacity region by position.
///
/// Splits `source` at every `marker`, selects the region at
/// `occurrence_index` and returns the text before the first `terminator`
/// inside it. Region `k` is the text following the `k`-th marker, so the
/// source must hold at least `occurrence_index` markers (and at least one).
///
/// ```
/// use bootfit_core::extract_capacity;
///
/// let src = "; NUM_SECTORS\n%ifndef NUM_SECTORS\n%define NUM_SECTORS 64\n%endif\nmov al, NUM_SECTORS\n";
/// assert_eq!(extract_capacity(src, "NUM_SECTORS", "%endif", 3).ok(), Some(" 64\n"));
/// ```
pub fn extract_capacity<'a>(
    source: &'a str,
    marker: &str,
    terminator: &str,
    occurrence_index: usize,
) -> Result<&'a str, SourceError> {
    positional_declaration(source, marker, terminator, occurrence_index).map(|d| d.expression)
}

fn positional_declaration<'a>(
    source: &'a str,
    marker: &str,
    terminator: &str,
    occurrence_index: usize,
) -> Result<CapacityDeclaration<'a>, SourceError> {
    if marker.is_empty() {
        return Err(SourceError::EmptyMarker);
    }

    let found = source.matches(marker).count();
    let needed = occurrence_index.max(1);
    if found < needed {
        return Err(SourceError::InsufficientMarkers {
            marker: marker.to_string(),
            found,
            needed,
        });
    }

    // Region k starts after the k-th marker and runs to the next one.
    let start = if occurrence_index == 0 {
        0
    } else {
        source
            .match_indices(marker)
            .nth(occurrence_index - 1)
            .map(|(i, m)| i + m.len())
            .unwrap_or(source.len())
    };
    let end = source[start..]
        .find(marker)
        .map(|i| start + i)
        .unwrap_or(source.len());
    let region = &source[start..end];
    let line = line_of(source, start);

    let Some(cut) = region.find(terminator) else {
        return Err(SourceError::MissingTerminator {
            marker: marker.to_string(),
            terminator: terminator.to_string(),
            occurrence: occurrence_index,
            line,
        });
    };

    Ok(CapacityDeclaration {
        expression: &region[..cut],
        line,
        form: DeclarationForm::Positional,
    })
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

// =============================================================================
// NAMED EXTRACTION
// =============================================================================

/// A constant definition recognised on a single source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Definition<'a> {
    name: &'a str,
    expression: &'a str,
    line: usize,
    form: DeclarationForm,
}

fn definitions<'a>(source: &'a str, terminator: &str) -> impl Iterator<Item = Definition<'a>> {
    source.lines().enumerate().filter_map(move |(idx, line)| {
        parse_definition(line, terminator).map(|(name, expression, form)| Definition {
            name,
            expression,
            line: idx + 1,
            form,
        })
    })
}

fn split_word(text: &str) -> (&str, &str) {
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    text.split_at(end)
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_ident_start(first) => chars.all(is_word_char),
        _ => false,
    }
}

fn cut_at<'a>(value: &'a str, terminator: &str) -> &'a str {
    if terminator.is_empty() {
        return value;
    }
    match value.find(terminator) {
        Some(i) => &value[..i],
        None => value,
    }
}

fn parse_definition<'a>(
    line: &'a str,
    terminator: &str,
) -> Option<(&'a str, &'a str, DeclarationForm)> {
    let code = match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    };
    let code = code.trim_start();

    if let Some(directive) = code.strip_prefix('%') {
        let (keyword, rest) = split_word(directive);
        let form = match keyword.to_ascii_lowercase().as_str() {
            "define" | "xdefine" => DeclarationForm::Define,
            "assign" => DeclarationForm::Assign,
            _ => return None,
        };
        let (name, value) = split_word(rest.trim_start());
        if !is_valid_name(name) {
            return None;
        }
        return Some((name, cut_at(value, terminator), form));
    }

    let name_end = code.find(|c: char| !is_word_char(c)).unwrap_or(code.len());
    let (name, rest) = code.split_at(name_end);
    if !is_valid_name(name) {
        return None;
    }
    let rest = rest.strip_prefix(':').unwrap_or(rest).trim_start();

    if let Some(value) = rest.strip_prefix('=') {
        if value.starts_with('=') {
            return None;
        }
        return Some((name, cut_at(value, terminator), DeclarationForm::Assignment));
    }

    let (keyword, value) = split_word(rest);
    if keyword.eq_ignore_ascii_case("equ") {
        return Some((name, cut_at(value, terminator), DeclarationForm::Equ));
    }
    None
}

/// Find the single declaration of `marker` by name.
///
/// Returns `Ok(None)` when the source declares no such constant. Text after
/// `terminator` on the declaring line is ignored.
pub fn find_named_declaration<'a>(
    source: &'a str,
    marker: &str,
    terminator: &str,
) -> Result<Option<CapacityDeclaration<'a>>, SourceError> {
    if marker.is_empty() {
        return Err(SourceError::EmptyMarker);
    }

    let matches: Vec<Definition<'a>> = definitions(source, terminator)
        .filter(|d| d.name == marker)
        .collect();

    match matches.as_slice() {
        [] => Ok(None),
        [only] => {
            if only.expression.trim().is_empty() {
                return Err(SourceError::EmptyDeclaration {
                    marker: marker.to_string(),
                    line: only.line,
                });
            }
            Ok(Some(CapacityDeclaration {
                expression: only.expression,
                line: only.line,
                form: only.form,
            }))
        }
        many => Err(SourceError::AmbiguousDeclaration {
            marker: marker.to_string(),
            lines: many.iter().map(|d| d.line).collect(),
        }),
    }
}

/// Collect every other constant the source defines.
///
/// Definitions are evaluated in source order, so later ones may reference
/// earlier ones. Definitions that do not evaluate are skipped, as are
/// definitions of `marker` itself.
pub fn collect_symbols(source: &str, marker: &str, terminator: &str) -> Symbols {
    let mut symbols = Symbols::new();
    for def in definitions(source, terminator) {
        if def.name == marker {
            continue;
        }
        if let Ok(value) = evaluate_raw(def.expression, &symbols) {
            symbols.define(def.name, value);
        }
    }
    symbols
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Configured capacity extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extractor {
    marker: String,
    terminator: String,
    occurrence_index: usize,
    mode: ExtractionMode,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            terminator: DEFAULT_TERMINATOR.to_string(),
            occurrence_index: DEFAULT_OCCURRENCE_INDEX,
            mode: ExtractionMode::Auto,
        }
    }
}

impl Extractor {
    /// Create an extractor with the default tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    #[must_use]
    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    #[must_use]
    pub fn with_occurrence_index(mut self, index: usize) -> Self {
        self.occurrence_index = index;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    pub fn occurrence_index(&self) -> usize {
        self.occurrence_index
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Locate the capacity declaration according to the configured mode.
    pub fn declaration<'a>(&self, source: &'a str) -> Result<CapacityDeclaration<'a>, SourceError> {
        let positional = || {
            positional_declaration(source, &self.marker, &self.terminator, self.occurrence_index)
        };
        match self.mode {
            ExtractionMode::Positional => positional(),
            ExtractionMode::Named => find_named_declaration(source, &self.marker, &self.terminator)?
                .ok_or_else(|| SourceError::MissingDeclaration {
                    marker: self.marker.clone(),
                }),
            ExtractionMode::Auto => {
                match find_named_declaration(source, &self.marker, &self.terminator)? {
                    Some(decl) => Ok(decl),
                    None => positional(),
                }
            }
        }
    }

    /// Locate and evaluate the capacity declaration.
    ///
    /// Other constants defined in the source are available to the expression.
    pub fn capacity<'a>(&self, source: &'a str) -> Result<ExtractedCapacity<'a>, CapacityError> {
        let declaration = self.declaration(source)?;
        let symbols = collect_symbols(source, &self.marker, &self.terminator);
        let sectors = evaluate_sector_count(declaration.expression, &symbols)?;
        Ok(ExtractedCapacity {
            declaration,
            sectors,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
