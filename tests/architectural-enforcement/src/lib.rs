//! Architectural Enforcement
//!
//! Source-scanning helpers shared by the policy tests in `tests/`:
//! - No panicking shortcuts (`.unwrap()`, `.expect(`) in router core code
//! - No blocking sleeps or blocking HTTP in router core code
//!
//! Only production code is scanned. A file's production code ends at its
//! first `#[cfg(test)]`, and files that only exist for tests are skipped.

use std::fs;
use std::path::{Path, PathBuf};

/// Files compiled only for tests
const TEST_ONLY_FILES: &[&str] = &["test_utils.rs"];

/// A forbidden pattern found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the match
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Trimmed source line
    pub source: String,
    /// Pattern that matched
    pub pattern: &'static str,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - `{}`: {}",
            self.path.display(),
            self.line,
            self.pattern,
            self.source
        )
    }
}

/// Absolute path of a directory relative to the workspace root
#[must_use]
pub fn workspace_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

/// Production lines of a source file as `(line_number, code)` pairs
///
/// Stops at the first `#[cfg(test)]`; skips comment lines and strips
/// trailing `//` comments.
#[must_use]
pub fn production_lines(content: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        let code = line.split("//").next().unwrap_or(line);
        lines.push((idx + 1, code));
    }
    lines
}

/// Scan every `.rs` file under `dir` for `patterns`
#[must_use]
pub fn scan(dir: &Path, patterns: &[&'static str]) -> Vec<Violation> {
    let mut violations = Vec::new();
    if !dir.exists() {
        return violations;
    }

    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
    {
        let path = entry.path();
        let is_test_only = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| TEST_ONLY_FILES.contains(&n));
        if is_test_only {
            continue;
        }

        let Ok(content) = fs::read_to_string(path) else {
            continue;
        };
        for (line, code) in production_lines(&content) {
            for pattern in patterns {
                if code.contains(pattern) {
                    violations.push(Violation {
                        path: path.to_path_buf(),
                        line,
                        source: code.trim().to_string(),
                        pattern,
                    });
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let source = "fn a() {}\n// x.unwrap()\nlet y = z; // w.unwrap()\n#[cfg(test)]\nfn t() { q.unwrap(); }\n";
        let lines = production_lines(source);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|(_, code)| !code.contains("unwrap")));
    }
}
