//! Integration Test: Blocking I/O Prohibition
//!
//! Async functions must not use `std::fs`, `std::net`, `std::process`
//! or `reqwest::blocking`. Synchronous setup code (config loading before
//! the runtime does anything) is allowed.

use architectural_enforcement::production_sources;

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
];

#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (line_number, code) in file.code_lines() {
            let Some((_, kind)) = FORBIDDEN.iter().find(|(pattern, _)| code.contains(pattern))
            else {
                continue;
            };
            if file.in_async_fn(line_number - 1) {
                violations.push(format!(
                    "{}:{} - {kind}: {}",
                    file.path.display(),
                    line_number,
                    code.trim()
                ));
            }
        }
    }

    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        panic!(
            "\nFound {} blocking I/O call(s) in async code. Use tokio equivalents.",
            violations.len()
        );
    }
}
