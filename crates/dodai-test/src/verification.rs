//! Assertion helpers over recorded driver calls.

use pretty_assertions::assert_eq;

use crate::recording::{CallKind, DriverCall, RecordingDriver};

/// Asserts the exact sequence of mutations and saves, ignoring queries.
#[track_caller]
pub fn assert_mutations(driver: &RecordingDriver, expected: &[DriverCall]) {
    assert_eq!(driver.mutations(), expected.to_vec());
}

/// Asserts the exact sequence of all calls, queries included.
#[track_caller]
pub fn assert_calls(driver: &RecordingDriver, expected: &[DriverCall]) {
    assert_eq!(driver.calls(), expected.to_vec());
}

/// Asserts that no call of `kind` was issued.
#[track_caller]
pub fn assert_never_called(driver: &RecordingDriver, kind: CallKind) {
    let count = driver.count(kind);
    assert!(
        count == 0,
        "expected no {} calls, found {}",
        kind.operation(),
        count
    );
}

/// Asserts every mutation was followed by a save.
#[track_caller]
pub fn assert_all_saved(driver: &RecordingDriver) {
    assert!(
        driver.unsaved() == 0,
        "{} mutation(s) not followed by save",
        driver.unsaved()
    );
}
