//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors. Nothing a parent page,
//! a backend or a user can send may panic the widget.
//! **Exceptions**: test code

use architectural_enforcement::{assert_no_violations, find_violations, PRODUCTION_DIRS};

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = find_violations(PRODUCTION_DIRS, |code| {
        code.contains(".unwrap()") || code.contains(".expect(") || code.contains("panic!(")
    });

    assert_no_violations("unwrap/expect/panic in production code", &violations);
}
