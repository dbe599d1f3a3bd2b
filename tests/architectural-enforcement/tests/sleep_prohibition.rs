//! Integration Test: Sleep Prohibition
//!
//! Production code waits on I/O, channels or cancellation, never on a
//! timer. Deadlines go through `tokio::time::timeout`.

use architectural_enforcement::production_sources;

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (line_number, code) in file.code_lines() {
            if code.contains("::sleep(") || code.contains(".sleep(") {
                violations.push(format!(
                    "{}:{} - {}",
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
            "\nFound {} sleep call(s) in production code. Wait on the event instead.",
            violations.len()
        );
    }
}
