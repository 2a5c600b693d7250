//! Breakpoint computation for numeric visual bins.
//!
//! Every method returns ascending, de-duplicated breaks. Callers are expected
//! to pass a bounded sample; see [`crate::sample`].

pub mod head_tail;
pub mod jenks;
pub mod std_dev;

pub use head_tail::{DEFAULT_HEAD_TAIL_ITERATIONS, head_tail_breaks};
pub use jenks::jenks_breaks;
pub use std_dev::{DEFAULT_STD_DEV_CLASSES, std_dev_breaks};

use formats::ClassificationMethod;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub method: ClassificationMethod,
    pub breaks: Vec<f64>,
}

/// Runs `method` over `values`.
///
/// `classes` is the class count for Jenks and standard deviation; head/tail
/// ignores it and uses its default iteration cap.
pub fn classify(method: ClassificationMethod, values: &[f64], classes: usize) -> ClassificationResult {
    let breaks = match method {
        ClassificationMethod::Jenks => jenks_breaks(values, classes),
        ClassificationMethod::StandardDeviation => std_dev_breaks(values, classes),
        ClassificationMethod::HeadTail => head_tail_breaks(values, DEFAULT_HEAD_TAIL_ITERATIONS),
    };
    debug!(?method, samples = values.len(), breaks = breaks.len(), "classified");
    ClassificationResult { method, breaks }
}
