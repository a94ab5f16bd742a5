//! Property tests for the capacity check.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use bootfit_core::{
    compare, evaluate_integer_expression, extract_capacity, sectors_for_bytes, validate,
    CapacityError, Extractor, SourceError, ValidationOutcome,
};
use proptest::prelude::*;
use std::num::NonZeroU64;
use std::path::Path;

proptest! {
    #[test]
    fn decimal_literals_evaluate_to_themselves(n in 0i64..=i64::MAX) {
        prop_assert_eq!(evaluate_integer_expression(&n.to_string()).unwrap(), n);
    }

    #[test]
    fn sums_match_native_arithmetic(a in 0i64..1_000_000, b in 0i64..1_000_000, c in 1i64..1000) {
        let text = format!("({a} + {b}) * 2 / {c} - {a} % {c}");
        let expected = (a + b) * 2 / c - a % c;
        prop_assert_eq!(evaluate_integer_expression(&text).unwrap(), expected);
    }

    #[test]
    fn gate_passes_exactly_when_capacity_suffices(available in 0u64..10_000, required in 0u64..10_000) {
        let counter = move |_: &Path| -> Result<String, String> { Ok(required.to_string()) };
        let outcome = validate(available, Path::new("kernel.bin"), &counter).unwrap();
        prop_assert_eq!(outcome.is_pass(), available >= required);
        prop_assert_eq!(outcome, compare(available, required));
    }

    #[test]
    fn counter_errors_win_over_output(diagnostic in "[a-z][a-z ]{0,40}") {
        let expected = diagnostic.clone();
        let counter = move |_: &Path| -> Result<String, String> { Err(diagnostic.clone()) };
        let err = validate(0, Path::new("kernel.bin"), &counter).unwrap_err();
        prop_assert_eq!(err, CapacityError::ExternalTool { diagnostic: expected });
    }

    #[test]
    fn positional_extraction_finds_selected_region(
        filler in proptest::collection::vec("[a-d ]{0,12}", 3),
        value in 0u64..100_000,
    ) {
        let source = format!(
            "{}NUM_SECTORS{}NUM_SECTORS{}NUM_SECTORS {value} %endif\nNUM_SECTORS\n",
            filler[0], filler[1], filler[2],
        );
        let text = extract_capacity(&source, "NUM_SECTORS", "%endif", 3).unwrap();
        prop_assert_eq!(text.trim(), value.to_string());
        let capacity = Extractor::new().capacity(&source).unwrap();
        prop_assert_eq!(capacity.sectors, value);
    }

    #[test]
    fn too_few_markers_never_yield_a_value(count in 0usize..3) {
        let source = "NUM_SECTORS 8 %endif\n".repeat(count);
        let err = extract_capacity(&source, "NUM_SECTORS", "%endif", 3).unwrap_err();
        let is_insufficient = matches!(err, SourceError::InsufficientMarkers { .. });
        prop_assert!(is_insufficient);
    }

    #[test]
    fn sectors_cover_every_byte(len in 0u64..(1 << 40), size in 1u64..8192) {
        let size = NonZeroU64::new(size).unwrap();
        let sectors = sectors_for_bytes(len, size);
        prop_assert!(sectors * size.get() >= len);
        prop_assert!(sectors == 0 || (sectors - 1) * size.get() < len);
    }
}

#[test]
fn bootloader_scenario() {
    let source = "\
; Sectors the stage-one loader reads: NUM_SECTORS
%ifndef NUM_SECTORS
    %define NUM_SECTORS 64
%endif
    mov al, NUM_SECTORS
";
    let capacity = Extractor::new().capacity(source).unwrap();
    assert_eq!(capacity.sectors, 64);

    let fits = |_: &Path| -> Result<String, String> { Ok("50\n".into()) };
    let outcome = validate(capacity.sectors, Path::new("kernel.bin"), &fits).unwrap();
    assert!(outcome.is_pass());

    let too_big = |_: &Path| -> Result<String, String> { Ok("70\n".into()) };
    let outcome = validate(capacity.sectors, Path::new("kernel.bin"), &too_big).unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Fail {
            available: 64,
            required: 70,
        }
    );
    assert_eq!(
        outcome.diagnostic().unwrap(),
        "need 70 sectors; bootloader provides only 64"
    );
}
