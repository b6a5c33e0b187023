//! Integration Test: Panic-Free Router Core
//!
//! **Policy**: Production code in `router/core/src` propagates errors instead
//! of panicking. `.unwrap()` and `.expect(` are allowed only in test code.
//!
//! **Required**: `?`, `ok_or_else`, `unwrap_or_default` and friends.

use architectural_enforcement::{scan, workspace_path};

#[test]
fn test_no_unwrap_or_expect_in_router_core() {
    let core = workspace_path("router/core/src");
    assert!(core.exists(), "router core sources not found at {}", core.display());

    let violations = scan(&core, &[".unwrap()", ".expect("]);

    if !violations.is_empty() {
        eprintln!("\n❌ Panicking calls found in router core production code:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Propagate with `?` or map to a RouterError / ProviderCallError instead.");

        panic!(
            "\nFound {} panicking call(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
