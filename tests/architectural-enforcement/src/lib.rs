//! Architectural Enforcement Integration Tests
//!
//! Source scanners shared by the tests in `tests/`:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//! - Core stays free of UI and terminal dependencies
//!
//! Scanning is line-based. Everything after a `#[cfg(test)]` line is
//! treated as test code, matching the layout used across the workspace.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["harvest/core/src", "harvest/cli/src"];

/// Workspace root
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A production source file split into lines
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// Lines before the first `#[cfg(test)]`
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Read `path` and drop its test section
    #[must_use]
    pub fn read(root: &Path, path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let lines = content
            .lines()
            .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
            .map(str::to_string)
            .collect();
        Some(Self {
            path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
            lines,
        })
    }

    /// `(line number, code)` pairs with line comments stripped
    pub fn code_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().enumerate().filter_map(|(idx, line)| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") {
                return None;
            }
            Some((idx + 1, line.split("//").next().unwrap_or(line.as_str())))
        })
    }

    /// Whether line `idx` (0-based) sits inside an `async fn`
    #[must_use]
    pub fn in_async_fn(&self, idx: usize) -> bool {
        for line in self.lines[..=idx].iter().rev() {
            let trimmed = line.trim_start();
            let signature = trimmed
                .strip_prefix("pub(crate) ")
                .or_else(|| trimmed.strip_prefix("pub "))
                .unwrap_or(trimmed);
            if signature.starts_with("async fn ") {
                return true;
            }
            if signature.starts_with("fn ") || signature.starts_with("impl") {
                return false;
            }
        }
        false
    }
}

/// Every `.rs` file under the production roots
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                if let Some(file) = SourceFile::read(&root, entry.path()) {
                    files.push(file);
                }
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(lines: &[&str]) -> SourceFile {
        SourceFile {
            path: PathBuf::from("x.rs"),
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    #[test]
    fn test_async_fn_detection() {
        let source = file(&[
            "pub async fn fetch() {",
            "    let x = 1;",
            "}",
            "fn parse() {",
            "    let y = 2;",
            "}",
        ]);
        assert!(source.in_async_fn(1));
        assert!(!source.in_async_fn(4));
    }

    #[test]
    fn test_comments_skipped() {
        let source = file(&["// tokio::time::sleep(d)", "let a = 1; // note"]);
        let lines: Vec<_> = source.code_lines().collect();
        assert_eq!(lines, vec![(2, "let a = 1; ")]);
    }

    #[test]
    fn test_production_sources_found() {
        let files = production_sources();
        assert!(files
            .iter()
            .any(|f| f.path.ends_with("harvest/core/src/controller.rs")));
    }
}
