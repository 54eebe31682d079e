//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors with `?` and never calls
//! `unwrap()` or `expect()`.
//! **Exceptions**: test code

use architectural_enforcement::{assert_clean, scan, ScannedLine};

fn panic_rule(line: &ScannedLine) -> Option<&'static str> {
    if line.code.contains(".unwrap()") {
        Some("unwrap() in production code")
    } else if line.code.contains(".expect(") {
        Some("expect() in production code")
    } else {
        None
    }
}

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan(panic_rule);
    assert_clean("Panicking calls in production code", &violations);
}

#[test]
fn test_unwrap_variants_allowed() {
    let line = |code: &str| ScannedLine {
        number: 1,
        code: code.to_string(),
        in_async_fn: false,
    };
    assert!(panic_rule(&line("    let x = value.unwrap();")).is_some());
    assert!(panic_rule(&line("    let x = value.expect(\"set\");")).is_some());
    assert!(panic_rule(&line("    let x = value.unwrap_or_default();")).is_none());
    assert!(panic_rule(&line("    let x = lock.unwrap_or_else(PoisonError::into_inner);")).is_none());
}
