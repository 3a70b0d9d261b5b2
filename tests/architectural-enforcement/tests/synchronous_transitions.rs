//! Integration Test: Synchronous Transitions
//!
//! **Policy**: Session transitions and inbound dispatch never suspend. A
//! subscriber must not be able to observe a half-applied transition, and a
//! dispatch handler must return before the next inbound event is read.
//!
//! The modules below may not contain `async fn` or `.await`.

use architectural_enforcement::{assert_no_violations, find_violations};

const SYNCHRONOUS_MODULES: &[&str] = &[
    "widget/core/src/session.rs",
    "widget/core/src/dispatcher.rs",
    "widget/core/src/transcript.rs",
    "widget/core/src/interactive.rs",
];

#[test]
fn test_state_modules_never_suspend() {
    let violations = find_violations(SYNCHRONOUS_MODULES, |code| {
        code.contains(".await") || code.contains("async fn") || code.contains("async move")
    });

    assert_no_violations("Suspension point in a synchronous module", &violations);
}

#[test]
fn test_state_modules_exist() {
    for module in SYNCHRONOUS_MODULES {
        let path = architectural_enforcement::workspace_root().join(module);
        assert!(path.exists(), "{} is missing", path.display());
    }
}
