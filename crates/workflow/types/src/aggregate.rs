//! Error aggregation over a parallel result set
//!
//! A fan-out produces one result slot per invocation. [`combine`] folds the
//! slots into either every success value or a single [`CompositeError`] that
//! keeps every failure, in slot order.

use crate::error::ActivityFailure;
use serde::{Deserialize, Serialize};

/// Every failure of a parallel set of activity invocations
///
/// Never empty: an all-success set folds to `Ok` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeError {
    failures: Vec<ActivityFailure>,
}

impl CompositeError {
    /// Build from a non-empty failure list. Returns `None` for an empty one.
    pub fn from_failures(failures: Vec<ActivityFailure>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    pub fn failures(&self) -> &[ActivityFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<ActivityFailure> {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the resources whose invocation failed, in slot order
    pub fn targets(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.target.as_str()).collect()
    }
}

impl std::fmt::Display for CompositeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}

/// Fold a fixed-size result set into its success values or one composite failure.
///
/// Success iff every slot succeeded; the empty set is a success.
pub fn combine<T>(results: Vec<Result<T, ActivityFailure>>) -> Result<Vec<T>, CompositeError> {
    let mut values = Vec::with_capacity(results.len());
    let mut failures = Vec::new();

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(failure) => failures.push(failure),
        }
    }

    match CompositeError::from_failures(failures) {
        Some(composite) => Err(composite),
        None => Ok(values),
    }
}
