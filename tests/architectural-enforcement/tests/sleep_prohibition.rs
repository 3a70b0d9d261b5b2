//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the widget crates MUST NOT call sleep.
//! Waiting is always on a channel, a reply port or a timeout.
//! **Exceptions**: test code

use architectural_enforcement::{assert_no_violations, find_violations, PRODUCTION_DIRS};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_violations(PRODUCTION_DIRS, |code| {
        code.contains("::sleep(") || code.contains(".sleep(")
    });

    assert_no_violations(
        "Sleep calls in production code (wait on a channel or use tokio::time::timeout)",
        &violations,
    );
}
