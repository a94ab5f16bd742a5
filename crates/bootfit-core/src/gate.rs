//! # Gate Module
//!
//! The pass/fail decision for a single validation run.
//!
//! The gate takes the capacity declared by the bootloader, asks an injected
//! [`SectorCounter`] how many sectors the kernel binary occupies, and compares
//! the two. The counter is the only effectful step; everything else is pure.

use crate::error::CapacityError;
use crate::expr::{evaluate_sector_count, Symbols};
use crate::SectorCount;
use serde::Serialize;
use std::fmt;
use std::path::Path;

// =============================================================================
// SECTOR COUNTER CAPABILITY
// =============================================================================

/// Computes how many sectors a kernel binary occupies.
///
/// `Ok` carries the counter's primary output (an integer expression as text).
/// `Err` carries its diagnostic text.
pub trait SectorCounter {
    fn count_sectors(&self, kernel_binary: &Path) -> Result<String, String>;
}

impl<F> SectorCounter for F
where
    F: Fn(&Path) -> Result<String, String>,
{
    fn count_sectors(&self, kernel_binary: &Path) -> Result<String, String> {
        self(kernel_binary)
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Result of comparing declared capacity against the kernel's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ValidationOutcome {
    /// The kernel fits.
    Pass {
        available: SectorCount,
        required: SectorCount,
    },
    /// The kernel needs more sectors than the bootloader loads.
    Fail {
        available: SectorCount,
        required: SectorCount,
    },
}

impl ValidationOutcome {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    /// Sectors declared by the bootloader.
    #[must_use]
    pub fn available(&self) -> SectorCount {
        match *self {
            Self::Pass { available, .. } | Self::Fail { available, .. } => available,
        }
    }

    /// Sectors occupied by the kernel.
    #[must_use]
    pub fn required(&self) -> SectorCount {
        match *self {
            Self::Pass { required, .. } | Self::Fail { required, .. } => required,
        }
    }

    /// Unused sectors on a pass, `None` on a fail.
    #[must_use]
    pub fn spare_sectors(&self) -> Option<SectorCount> {
        match *self {
            Self::Pass {
                available,
                required,
            } => Some(available.saturating_sub(required)),
            Self::Fail { .. } => None,
        }
    }

    /// Human-readable reason for a fail.
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        match *self {
            Self::Pass { .. } => None,
            Self::Fail {
                available,
                required,
            } => Some(format!(
                "need {required} sectors; bootloader provides only {available}"
            )),
        }
    }

    /// Turn a fail into [`CapacityError::CapacityExceeded`].
    pub fn into_result(self) -> Result<Self, CapacityError> {
        match self {
            Self::Pass { .. } => Ok(self),
            Self::Fail {
                available,
                required,
            } => Err(CapacityError::CapacityExceeded {
                available,
                required,
            }),
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass {
                available,
                required,
            } => write!(
                f,
                "kernel fits: {required} of {available} sectors used ({} spare)",
                available.saturating_sub(*required)
            ),
            Self::Fail {
                available,
                required,
            } => write!(
                f,
                "need {required} sectors; bootloader provides only {available}"
            ),
        }
    }
}

// =============================================================================
// DECISION
// =============================================================================

/// Compare capacity against requirement.
///
/// Equal counts pass: a kernel that exactly fills the loaded sectors boots.
#[must_use]
pub fn compare(available: SectorCount, required: SectorCount) -> ValidationOutcome {
    if available < required {
        ValidationOutcome::Fail {
            available,
            required,
        }
    } else {
        ValidationOutcome::Pass {
            available,
            required,
        }
    }
}

/// Run the counter on `kernel_binary` and compare against `available`.
///
/// A counter error fails fast as [`CapacityError::ExternalTool`] without
/// looking at any output. The counter's output is evaluated with the
/// restricted grammar and must be a non-negative integer.
pub fn validate<C>(
    available: SectorCount,
    kernel_binary: &Path,
    counter: &C,
) -> Result<ValidationOutcome, CapacityError>
where
    C: SectorCounter + ?Sized,
{
    let output = counter
        .count_sectors(kernel_binary)
        .map_err(CapacityError::external)?;
    let required = evaluate_sector_count(&output, &Symbols::new())?;
    Ok(compare(available, required))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExprError;

    fn reports(text: &'static str) -> impl Fn(&Path) -> Result<String, String> {
        move |_| Ok(text.to_string())
    }

    #[test]
    fn equal_counts_pass() {
        let outcome = validate(100, Path::new("kernel.bin"), &reports("100"));
        assert_eq!(
            outcome,
            Ok(ValidationOutcome::Pass {
                available: 100,
                required: 100,
            })
        );
    }

    #[test]
    fn one_short_fails() {
        let outcome = validate(99, Path::new("kernel.bin"), &reports("100"));
        assert_eq!(
            outcome,
            Ok(ValidationOutcome::Fail {
                available: 99,
                required: 100,
            })
        );
    }

    #[test]
    fn one_spare_passes() {
        let outcome = validate(101, Path::new("kernel.bin"), &reports("100")).ok();
        assert_eq!(outcome.map(|o| o.is_pass()), Some(true));
        assert_eq!(outcome.and_then(|o| o.spare_sectors()), Some(1));
    }

    #[test]
    fn counter_output_may_have_newline() {
        let outcome = validate(64, Path::new("kernel.bin"), &reports("50\n")).ok();
        assert_eq!(outcome.map(|o| o.required()), Some(50));
    }

    #[test]
    fn counter_error_is_forwarded_verbatim() {
        let counter = |_: &Path| -> Result<String, String> {
            Err("num_sectors.sh: kernel.bin not found".to_string())
        };
        let err = validate(64, Path::new("kernel.bin"), &counter);
        assert_eq!(
            err,
            Err(CapacityError::ExternalTool {
                diagnostic: "num_sectors.sh: kernel.bin not found".into(),
            })
        );
    }

    #[test]
    fn counter_receives_kernel_path() {
        let counter = |path: &Path| -> Result<String, String> {
            if path == Path::new("build/kernel.bin") {
                Ok("3".into())
            } else {
                Err(format!("wrong path {}", path.display()))
            }
        };
        let outcome = validate(4, Path::new("build/kernel.bin"), &counter).ok();
        assert_eq!(outcome.map(|o| o.required()), Some(3));
    }

    #[test]
    fn garbage_output_is_an_expression_error() {
        let err = validate(64, Path::new("kernel.bin"), &reports("sectors: 12"));
        assert!(matches!(err, Err(CapacityError::Expression { .. })));
    }

    #[test]
    fn negative_output_is_rejected() {
        let err = validate(64, Path::new("kernel.bin"), &reports("-1"));
        assert!(matches!(
            err,
            Err(CapacityError::Expression {
                source: ExprError::Negative(-1),
                ..
            })
        ));
    }

    #[test]
    fn fail_diagnostic_and_result() {
        let outcome = compare(64, 70);
        assert_eq!(
            outcome.diagnostic().as_deref(),
            Some("need 70 sectors; bootloader provides only 64")
        );
        assert_eq!(outcome.spare_sectors(), None);
        assert_eq!(
            outcome.into_result(),
            Err(CapacityError::CapacityExceeded {
                available: 64,
                required: 70,
            })
        );
    }

    #[test]
    fn pass_has_no_diagnostic() {
        let outcome = compare(64, 50);
        assert_eq!(outcome.diagnostic(), None);
        assert_eq!(outcome.into_result(), Ok(outcome));
        assert_eq!(outcome.to_string(), "kernel fits: 50 of 64 sectors used (14 spare)");
    }

    #[test]
    fn hand_built_pass_never_underflows() {
        let outcome = ValidationOutcome::Pass {
            available: 1,
            required: 5,
        };
        assert_eq!(outcome.spare_sectors(), Some(0));
        assert_eq!(outcome.to_string(), "kernel fits: 5 of 1 sectors used (0 spare)");
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_string(&compare(64, 70)).ok();
        assert_eq!(
            json.as_deref(),
            Some(r#"{"outcome":"fail","available":64,"required":70}"#)
        );
    }
}
