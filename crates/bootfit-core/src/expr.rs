//! # Expression Module
//!
//! Restricted integer arithmetic for sector counts.
//!
//! Both the bootloader's capacity constant and the external counter's output
//! arrive as text. They are evaluated here with a small recursive-descent
//! parser, never by a general-purpose evaluator.
//!
//! ## Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := integer | identifier | '(' expr ')'
//! ```
//!
//! Integers take NASM's radix forms: a `0x`/`0h`, `0o`/`0q`, `0b`/`0y` or
//! `0d`/`0t` prefix, or an `h`, `q`/`o`, `b`/`y` or `d`/`t` suffix (`40h`,
//! `17q`, `1010b`). Plain digits are decimal and `_` separators are allowed. Arithmetic is checked `i64`; `/` and `%` truncate toward
//! zero like NASM does. Identifiers resolve through [`Symbols`] only.

use crate::error::{CapacityError, ExprError};
use crate::SectorCount;
use std::collections::BTreeMap;

/// Maximum parenthesis nesting accepted by the parser.
pub const MAX_NESTING: usize = 64;

// =============================================================================
// SYMBOL TABLE
// =============================================================================

/// Named integer constants an expression may reference.
///
/// BTreeMap keeps iteration (and therefore debug output) deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Symbols {
    values: BTreeMap<String, i64>,
}

impl Symbols {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or redefine a symbol. Later definitions win, as in NASM.
    pub fn define(&mut self, name: impl Into<String>, value: i64) {
        self.values.insert(name.into(), value);
    }

    /// Look up a symbol.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.get(name).copied()
    }
}

// =============================================================================
// PUBLIC ENTRY POINTS
// =============================================================================

/// Evaluate an expression with no symbols defined.
///
/// ```
/// use bootfit_core::evaluate_integer_expression;
///
/// assert_eq!(evaluate_integer_expression("512").ok(), Some(512));
/// assert_eq!(evaluate_integer_expression("2+2").ok(), Some(4));
/// assert!(evaluate_integer_expression("abc").is_err());
/// ```
pub fn evaluate_integer_expression(text: &str) -> Result<i64, CapacityError> {
    evaluate_with_symbols(text, &Symbols::new())
}

/// Evaluate an expression, resolving identifiers through `symbols`.
pub fn evaluate_with_symbols(text: &str, symbols: &Symbols) -> Result<i64, CapacityError> {
    evaluate_raw(text, symbols).map_err(|e| CapacityError::expression(text, e))
}

/// Evaluate an expression that must yield a sector count (non-negative).
pub fn evaluate_sector_count(text: &str, symbols: &Symbols) -> Result<SectorCount, CapacityError> {
    let value = evaluate_with_symbols(text, symbols)?;
    SectorCount::try_from(value)
        .map_err(|_| CapacityError::expression(text, ExprError::Negative(value)))
}

/// Evaluate without wrapping the error in the offending text.
pub(crate) fn evaluate_raw(text: &str, symbols: &Symbols) -> Result<i64, ExprError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
        symbols,
    };
    let value = parser.expr()?;
    match parser.peek() {
        None => Ok(value),
        Some(tok) => Err(ExprError::UnexpectedToken {
            token: tok.kind.to_string(),
            position: tok.position,
        }),
    }
}

// =============================================================================
// TOKENIZER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Int(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Int(v) => write!(f, "{v}"),
            TokenKind::Ident(name) => f.write_str(name),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

/// Characters that may continue an identifier or literal word.
pub(crate) fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
}

/// Characters that may start an identifier.
pub(crate) fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '.'
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(position, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let single = match ch {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            _ => None,
        };
        if let Some(kind) = single {
            chars.next();
            tokens.push(Token { kind, position });
            continue;
        }

        if !is_word_char(ch) {
            return Err(ExprError::UnexpectedCharacter { ch, position });
        }

        // Consume a whole word, then classify it.
        let mut end = position;
        while let Some(&(i, c)) = chars.peek() {
            if !is_word_char(c) {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }
        let word = &text[position..end];

        let kind = if ch.is_ascii_digit() {
            TokenKind::Int(parse_literal(word)?)
        } else {
            TokenKind::Ident(word.to_string())
        };
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

fn parse_literal(word: &str) -> Result<i64, ExprError> {
    let lower = word.to_ascii_lowercase();
    radix_candidates(&lower)
        .into_iter()
        .find_map(|(digits, radix)| {
            let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
            let valid = !cleaned.is_empty() && cleaned.chars().all(|c| c.is_digit(radix));
            valid.then(|| i64::from_str_radix(&cleaned, radix).map_err(|_| ExprError::Overflow))
        })
        .unwrap_or_else(|| {
            Err(ExprError::InvalidLiteral {
                literal: word.to_string(),
            })
        })
}

/// Ways to read a lowercased literal, most specific first.
fn radix_candidates(lower: &str) -> Vec<(&str, u32)> {
    const PREFIXES: [(&str, u32); 8] = [
        ("0x", 16),
        ("0h", 16),
        ("0o", 8),
        ("0q", 8),
        ("0b", 2),
        ("0y", 2),
        ("0d", 10),
        ("0t", 10),
    ];
    const SUFFIXES: [(char, u32); 7] = [
        ('h', 16),
        ('q', 8),
        ('o', 8),
        ('b', 2),
        ('y', 2),
        ('d', 10),
        ('t', 10),
    ];

    let mut candidates = Vec::with_capacity(3);
    if let Some(&(prefix, radix)) = PREFIXES.iter().find(|(p, _)| lower.starts_with(p)) {
        candidates.push((&lower[prefix.len()..], radix));
    }
    if let Some(&(suffix, radix)) = SUFFIXES.iter().find(|(c, _)| lower.ends_with(*c)) {
        candidates.push((&lower[..lower.len() - suffix.len_utf8()], radix));
    }
    candidates.push((lower, 10));
    candidates
}

// =============================================================================
// PARSER / EVALUATOR
// =============================================================================

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    symbols: &'t Symbols,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<i64, ExprError> {
        let mut value = self.term()?;
        loop {
            if self.eat(&TokenKind::Plus) {
                let rhs = self.term()?;
                value = value.checked_add(rhs).ok_or(ExprError::Overflow)?;
            } else if self.eat(&TokenKind::Minus) {
                let rhs = self.term()?;
                value = value.checked_sub(rhs).ok_or(ExprError::Overflow)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<i64, ExprError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&TokenKind::Star) {
                let rhs = self.unary()?;
                value = value.checked_mul(rhs).ok_or(ExprError::Overflow)?;
            } else if self.eat(&TokenKind::Slash) {
                let rhs = self.unary()?;
                if rhs == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                value = value.checked_div(rhs).ok_or(ExprError::Overflow)?;
            } else if self.eat(&TokenKind::Percent) {
                let rhs = self.unary()?;
                if rhs == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                value = value.checked_rem(rhs).ok_or(ExprError::Overflow)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<i64, ExprError> {
        if self.eat(&TokenKind::Plus) {
            return self.nested(Self::unary);
        }
        if self.eat(&TokenKind::Minus) {
            let value = self.nested(Self::unary)?;
            return value.checked_neg().ok_or(ExprError::Overflow);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<i64, ExprError> {
        let Some(tok) = self.advance().cloned() else {
            return Err(ExprError::UnexpectedEnd);
        };
        match tok.kind {
            TokenKind::Int(v) => Ok(v),
            TokenKind::Ident(name) => self
                .symbols
                .get(&name)
                .ok_or(ExprError::UnknownSymbol(name)),
            TokenKind::LParen => {
                let value = self.nested(Self::expr)?;
                if self.eat(&TokenKind::RParen) {
                    Ok(value)
                } else {
                    match self.peek() {
                        Some(tok) => Err(ExprError::UnexpectedToken {
                            token: tok.kind.to_string(),
                            position: tok.position,
                        }),
                        None => Err(ExprError::UnexpectedEnd),
                    }
                }
            }
            other => Err(ExprError::UnexpectedToken {
                token: other.to_string(),
                position: tok.position,
            }),
        }
    }

    /// Run `f` one nesting level deeper, bounding recursion.
    fn nested(&mut self, f: fn(&mut Self) -> Result<i64, ExprError>) -> Result<i64, ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::NestingTooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Result<i64, ExprError> {
        evaluate_raw(text, &Symbols::new())
    }

    #[test]
    fn literal() {
        assert_eq!(evaluate_integer_expression("512"), Ok(512));
    }

    #[test]
    fn addition() {
        assert_eq!(evaluate_integer_expression("2+2"), Ok(4));
    }

    #[test]
    fn bare_word_is_rejected() {
        let err = evaluate_integer_expression("abc");
        assert!(matches!(err, Err(CapacityError::Expression { .. })));
    }

    #[test]
    fn whitespace_is_ignored() {
        assert_eq!(eval(" 64 "), Ok(64));
        assert_eq!(eval("\n\t64\n"), Ok(64));
        assert_eq!(eval("12\n"), Ok(12));
    }

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(eval("2 + 3 * 4"), Ok(14));
        assert_eq!(eval("(2 + 3) * 4"), Ok(20));
        assert_eq!(eval("10 - 4 - 3"), Ok(3));
        assert_eq!(eval("-(3 - 5)"), Ok(2));
        assert_eq!(eval("--4"), Ok(4));
    }

    #[test]
    fn division_truncates() {
        assert_eq!(eval("1023 / 512"), Ok(1));
        assert_eq!(eval("-7 / 2"), Ok(-3));
        assert_eq!(eval("1023 % 512"), Ok(511));
    }

    #[test]
    fn radix_literals() {
        assert_eq!(eval("0x40"), Ok(64));
        assert_eq!(eval("0X1F"), Ok(31));
        assert_eq!(eval("0o17"), Ok(15));
        assert_eq!(eval("0b1010"), Ok(10));
        assert_eq!(eval("1_024"), Ok(1024));
    }

    #[test]
    fn nasm_suffix_literals() {
        assert_eq!(eval("40h"), Ok(64));
        assert_eq!(eval("0FFh"), Ok(255));
        assert_eq!(eval("17q"), Ok(15));
        assert_eq!(eval("17o"), Ok(15));
        assert_eq!(eval("1010b"), Ok(10));
        assert_eq!(eval("1010y"), Ok(10));
        assert_eq!(eval("64d"), Ok(64));
        assert_eq!(eval("20h / 2"), Ok(16));
        assert!(matches!(eval("12b"), Err(ExprError::InvalidLiteral { .. })));
        assert!(matches!(eval("19q"), Err(ExprError::InvalidLiteral { .. })));
    }

    #[test]
    fn invalid_literals() {
        assert!(matches!(eval("12abc"), Err(ExprError::InvalidLiteral { .. })));
        assert!(matches!(eval("0x"), Err(ExprError::InvalidLiteral { .. })));
        assert!(matches!(eval("0b102"), Err(ExprError::InvalidLiteral { .. })));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval("1 / 0"), Err(ExprError::DivisionByZero));
        assert_eq!(eval("1 % (2 - 2)"), Err(ExprError::DivisionByZero));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(eval("9223372036854775807 + 1"), Err(ExprError::Overflow));
        assert_eq!(eval("99999999999999999999"), Err(ExprError::Overflow));
    }

    #[test]
    fn foreign_syntax_is_rejected() {
        assert!(matches!(
            eval("__import__('os')"),
            Err(ExprError::UnexpectedCharacter { ch: '\'', .. })
        ));
        assert!(matches!(
            eval("1 << 4"),
            Err(ExprError::UnexpectedCharacter { ch: '<', .. })
        ));
        assert!(matches!(eval("2 ** 3"), Err(ExprError::UnexpectedToken { .. })));
        assert!(matches!(eval("1.5"), Err(ExprError::InvalidLiteral { .. })));
    }

    #[test]
    fn structural_errors() {
        assert_eq!(eval(""), Err(ExprError::Empty));
        assert_eq!(eval("   "), Err(ExprError::Empty));
        assert_eq!(eval("1 +"), Err(ExprError::UnexpectedEnd));
        assert_eq!(eval("(1 + 2"), Err(ExprError::UnexpectedEnd));
        assert!(matches!(eval("1 2"), Err(ExprError::UnexpectedToken { .. })));
        assert!(matches!(eval(")"), Err(ExprError::UnexpectedToken { .. })));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert_eq!(eval(&deep), Err(ExprError::NestingTooDeep(MAX_NESTING)));

        let ok = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(eval(&ok), Ok(1));
    }

    #[test]
    fn symbols_resolve() {
        let mut symbols = Symbols::new();
        symbols.define("KERNEL_SIZE", 32 * 1024);
        symbols.define("SECTOR_SIZE", 512);

        let value = evaluate_with_symbols("KERNEL_SIZE / SECTOR_SIZE + 1", &symbols);
        assert_eq!(value, Ok(65));

        let err = evaluate_raw("MISSING + 1", &symbols);
        assert_eq!(err, Err(ExprError::UnknownSymbol("MISSING".into())));
    }

    #[test]
    fn sector_count_rejects_negative() {
        let err = evaluate_sector_count("3 - 5", &Symbols::new());
        assert!(matches!(
            err,
            Err(CapacityError::Expression {
                source: ExprError::Negative(-2),
                ..
            })
        ));
        assert_eq!(evaluate_sector_count("0", &Symbols::new()), Ok(0));
    }
}
