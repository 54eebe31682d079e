//! Architectural Enforcement
//!
//! Line scanner shared by the integration tests in `tests/`. Each test walks
//! the production sources of the copilot crates and reports lines breaking
//! one rule:
//! - No sleep calls; periodic waits use `tokio::time::interval`
//! - No blocking I/O inside async functions
//! - No `unwrap()` / `expect()` outside tests
//!
//! Everything from the first `#[cfg(test)]` line of a file onward is treated
//! as test code, and `//` comments are ignored.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Source directories holding production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["copilot/core/src", "copilot/cli/src"];

/// One production line, stripped of its comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLine {
    /// 1-based line number
    pub number: usize,
    /// Code before any `//` comment
    pub code: String,
    /// Whether the closest enclosing `fn` is `async`
    pub in_async_fn: bool,
}

/// A rule violation
#[derive(Debug, Clone)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What the rule found
    pub message: String,
    /// The offending code
    pub code: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.message,
            self.code.trim()
        )
    }
}

/// The workspace root (two levels above this crate)
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under the production directories
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Production lines of a source text
pub fn production_lines(content: &str) -> Vec<ScannedLine> {
    let mut lines = Vec::new();
    let mut in_async_fn = false;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }

        let code = line.split("//").next().unwrap_or(line);
        if let Some(is_async) = fn_signature(code) {
            in_async_fn = is_async;
        }

        lines.push(ScannedLine {
            number: idx + 1,
            code: code.to_string(),
            in_async_fn,
        });
    }
    lines
}

/// `Some(is_async)` when `code` opens a function definition
fn fn_signature(code: &str) -> Option<bool> {
    let mut words = code.split_whitespace().peekable();
    let mut is_async = false;
    while let Some(word) = words.next() {
        match word {
            "pub" | "const" | "unsafe" | "extern" => {}
            w if w.starts_with("pub(") => {}
            "async" => is_async = true,
            "fn" => return words.peek().map(|_| is_async),
            _ => return None,
        }
    }
    None
}

/// Scan every production file with `rule`
///
/// `rule` returns the violation message for a line, if any.
pub fn scan<F>(rule: F) -> Vec<Violation>
where
    F: Fn(&ScannedLine) -> Option<&'static str>,
{
    let mut violations = Vec::new();
    for path in production_files() {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        for line in production_lines(&content) {
            if let Some(message) = rule(&line) {
                violations.push(Violation {
                    path: path.clone(),
                    line: line.number,
                    message: message.to_string(),
                    code: line.code.clone(),
                });
            }
        }
    }
    violations
}

/// Panic with every violation listed
pub fn assert_clean(title: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!("\n{title}: {} violation(s) found", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signature_detection() {
        assert_eq!(fn_signature("async fn main() {"), Some(true));
        assert_eq!(fn_signature("    pub async fn handle(&self) {"), Some(true));
        assert_eq!(fn_signature("pub(crate) fn load() {"), Some(false));
        assert_eq!(fn_signature("    let f = fn_ptr;"), None);
        assert_eq!(fn_signature("impl Foo {"), None);
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let source = "async fn run() {\n    work(); // note\n}\n#[cfg(test)]\nmod tests {}\n";
        let lines = production_lines(source);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].code, "    work(); ");
        assert!(lines[1].in_async_fn);
    }

    #[test]
    fn test_production_files_found() {
        let files = production_files();
        assert!(files.iter().any(|p| p.ends_with("copilot/core/src/lib.rs")));
        assert!(files.iter().any(|p| p.ends_with("copilot/cli/src/main.rs")));
    }
}
