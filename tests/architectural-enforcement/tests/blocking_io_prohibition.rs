//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async functions MUST NOT use blocking I/O.
//! **Required**: `tokio::io` for stdin, `reqwest` (async) for HTTP.
//! **Acceptable**: Non-async functions (config loading before the runtime
//! does any work, the synchronous render callback) and test code.

use architectural_enforcement::{assert_clean, scan, ScannedLine};

fn blocking_io_rule(line: &ScannedLine) -> Option<&'static str> {
    let code = &line.code;

    // Blocking HTTP is never acceptable
    if code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }

    if !line.in_async_fn {
        return None;
    }

    if code.contains("std::fs::") {
        Some("Blocking file I/O in async fn")
    } else if code.contains("std::net::") {
        Some("Blocking network I/O in async fn")
    } else if code.contains("std::process::Command") {
        Some("Blocking process I/O in async fn")
    } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
        Some("Blocking stdin/stdout in async fn")
    } else {
        None
    }
}

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan(blocking_io_rule);
    if !violations.is_empty() {
        eprintln!("\n✅ Use tokio::io::stdin(), tokio::fs and async reqwest in async code\n");
    }
    assert_clean("Blocking I/O in production code", &violations);
}

#[test]
fn test_blocking_io_detection() {
    let read = |in_async_fn| ScannedLine {
        number: 1,
        code: "    let text = std::fs::read_to_string(path)?;".to_string(),
        in_async_fn,
    };
    assert!(blocking_io_rule(&read(true)).is_some());
    assert!(blocking_io_rule(&read(false)).is_none());

    let client = ScannedLine {
        number: 2,
        code: "    let client = reqwest::blocking::Client::new();".to_string(),
        in_async_fn: false,
    };
    assert!(blocking_io_rule(&client).is_some());
}
