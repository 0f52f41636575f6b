//! Non-panicking checks that turn a false condition into [`HarnessError::Assertion`].
//!
//! Fixtures run against a live cluster and must report failures rather than
//! abort the process, so these replace `assert!` outside of tests.

use std::fmt::Debug;

use serde_json::Value;

use crate::errors::{HarnessError, HarnessResult};

pub fn expect_true(what: &str, condition: bool) -> HarnessResult<()> {
    if condition {
        Ok(())
    } else {
        Err(HarnessError::assertion(what))
    }
}

pub fn expect_eq<A, E>(what: &str, actual: A, expected: E) -> HarnessResult<()>
where
    A: PartialEq<E> + Debug,
    E: Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "{what}: expected {expected:?}, got {actual:?}"
        )))
    }
}

pub fn expect_at_least(what: &str, actual: i64, minimum: i64) -> HarnessResult<()> {
    if actual >= minimum {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "{what}: expected at least {minimum}, got {actual}"
        )))
    }
}

pub fn expect_contains(what: &str, haystack: &str, needle: &str) -> HarnessResult<()> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "{what}: expected to find '{needle}' in: {haystack}"
        )))
    }
}

/// Fails when the value is absent or JSON `null`.
pub fn expect_present<'a>(what: &str, value: Option<&'a Value>) -> HarnessResult<&'a Value> {
    match value {
        Some(value) if !value.is_null() => Ok(value),
        Some(_) => Err(HarnessError::assertion(format!("{what}: value is null"))),
        None => Err(HarnessError::assertion(format!("{what}: value is missing"))),
    }
}

/// Every item equals `expected`; an empty list fails since nothing reported.
pub fn expect_every<T, E>(what: &str, items: &[T], expected: &E) -> HarnessResult<()>
where
    T: PartialEq<E> + Debug,
    E: Debug + ?Sized,
{
    if items.is_empty() {
        return Err(HarnessError::assertion(format!(
            "{what}: expected every item to be {expected:?}, but there were no items"
        )));
    }
    if items.iter().all(|item| item == expected) {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "{what}: expected every item to be {expected:?}, got {items:?}"
        )))
    }
}
