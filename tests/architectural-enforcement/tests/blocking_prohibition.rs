//! Integration Test: Blocking Call Prohibition
//!
//! **Policy**: The router core runs inside a tokio runtime. Production code
//! MUST NOT block a worker thread.
//!
//! **Forbidden**: `std::thread::sleep`, `reqwest::blocking`
//! **Required**: `tokio::time::sleep(...).await`, `reqwest::Client`

use architectural_enforcement::{scan, workspace_path};

#[test]
fn test_no_blocking_calls_in_router_core() {
    let core = workspace_path("router/core/src");
    assert!(core.exists(), "router core sources not found at {}", core.display());

    let violations = scan(&core, &["std::thread::sleep", "thread::sleep(", "reqwest::blocking"]);

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking calls found in router core production code:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use tokio::time::sleep(...).await and the async reqwest::Client.");

        panic!(
            "\nFound {} blocking call(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_no_blocking_calls_in_cli() {
    let cli = workspace_path("router/cli/src");
    let violations = scan(&cli, &["std::thread::sleep", "reqwest::blocking"]);
    assert!(
        violations.is_empty(),
        "Blocking calls in CLI: {:#?}",
        violations
    );
}
