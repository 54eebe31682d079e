//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep. Waiting between polls of
//! a working conversation uses `tokio::time::interval`.
//! **Exceptions**: test code

use architectural_enforcement::{assert_clean, scan, ScannedLine};

fn sleep_rule(line: &ScannedLine) -> Option<&'static str> {
    if line.code.contains("::sleep(") || line.code.contains(".sleep(") {
        Some("Sleep call")
    } else {
        None
    }
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(sleep_rule);
    if !violations.is_empty() {
        eprintln!("\n✅ Use tokio::time::interval for periodic waits");
        eprintln!("❌ Sleep in polling loops is forbidden\n");
    }
    assert_clean("Sleep calls in production code", &violations);
}

#[test]
fn test_sleep_detection() {
    let line = ScannedLine {
        number: 1,
        code: "    tokio::time::sleep(Duration::from_millis(10)).await;".to_string(),
        in_async_fn: true,
    };
    assert!(sleep_rule(&line).is_some());

    let interval = ScannedLine {
        number: 2,
        code: "    interval.tick().await;".to_string(),
        in_async_fn: true,
    };
    assert!(sleep_rule(&interval).is_none());
}
