//! Integration Test: Core Independence
//!
//! `harvest-core` is a library for any front end. It must not pull in
//! terminal UI, CLI or logging-subscriber crates; those belong to the
//! binaries.

use std::fs;

use architectural_enforcement::workspace_root;

const FRONT_END_CRATES: &[&str] = &[
    "ratatui",
    "crossterm",
    "termion",
    "clap",
    "anyhow",
    "tracing-subscriber",
];

#[test]
fn test_core_has_no_front_end_dependencies() {
    let manifest = workspace_root().join("harvest/core/Cargo.toml");
    let content = fs::read_to_string(&manifest).unwrap();

    // Only the [dependencies] table; dev-dependencies may use anything
    let dependencies: Vec<&str> = content
        .lines()
        .skip_while(|line| line.trim() != "[dependencies]")
        .skip(1)
        .take_while(|line| !line.trim_start().starts_with('['))
        .collect();
    assert!(!dependencies.is_empty(), "no [dependencies] table found");

    let offending: Vec<&str> = FRONT_END_CRATES
        .iter()
        .copied()
        .filter(|name| {
            dependencies.iter().any(|line| {
                let line = line.trim_start();
                line.starts_with(&format!("{name} ")) || line.starts_with(&format!("{name}="))
            })
        })
        .collect();

    assert!(
        offending.is_empty(),
        "harvest-core depends on front-end crates: {offending:?}"
    );
}
