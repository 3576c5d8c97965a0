//! Runs the integration test targets one after another and reports which
//! passed.
//!
//! ```text
//! cargo run -p integration-tests                 # every target
//! cargo run -p integration-tests -- failover     # targets whose name contains "failover"
//! RUST_LOG=ldap=debug cargo run -p integration-tests
//! ```

use std::process::{Command, ExitCode};
use std::time::Instant;

/// Test targets declared in this crate's manifest
const TARGETS: [&str; 4] = [
    "codec_tests",
    "failover_tests",
    "negotiation_tests",
    "stress_tests",
];

fn main() -> ExitCode {
    let filters: Vec<String> = std::env::args().skip(1).collect();
    let selected: Vec<&str> = TARGETS
        .into_iter()
        .filter(|target| filters.is_empty() || filters.iter().any(|f| target.contains(f.as_str())))
        .collect();
    if selected.is_empty() {
        eprintln!("no target matches {filters:?}; known targets: {TARGETS:?}");
        return ExitCode::FAILURE;
    }

    let mut failed = Vec::new();
    for target in &selected {
        println!("==> {target}");
        let start = Instant::now();
        // stdio is inherited so test output streams as it happens
        let status = Command::new("cargo")
            .args(["test", "-p", "integration-tests", "--test", target])
            .status();
        let passed = matches!(&status, Ok(s) if s.success());
        if let Err(e) = &status {
            eprintln!("could not run cargo: {e}");
        }
        println!(
            "<== {target}: {} in {:.2?}",
            if passed { "ok" } else { "FAILED" },
            start.elapsed()
        );
        if !passed {
            failed.push(*target);
        }
    }

    println!("\n{} of {} targets passed", selected.len() - failed.len(), selected.len());
    if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        println!("failed: {}", failed.join(", "));
        ExitCode::FAILURE
    }
}
