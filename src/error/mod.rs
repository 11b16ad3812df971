//! Error types shared by every pipeline stage.
//!
//! Record-level failures (`EmptySample`, `Unclassified`, `NoBaseline`,
//! `InvalidBaseline`) are recovered by the caller: the record or comparison is
//! dropped and a [`crate::pipeline::Diagnostic`] is emitted. Query and input
//! failures abort the run.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("record {branch}/{agent} build {build} ({testcase}, {benchmark}) has no samples")]
    EmptySample {
        branch: String,
        agent: String,
        build: u64,
        testcase: String,
        benchmark: String,
    },

    #[error("cannot classify benchmark '{benchmark}' with testcase '{testcase}'")]
    Unclassified { benchmark: String, testcase: String },

    #[error("skipping {agent}{}: no baseline for this agent", variant_suffix(.variant))]
    NoBaseline {
        agent: String,
        variant: Option<String>,
    },

    #[error("baseline mean is zero for {agent} ({key}), gain is undefined")]
    InvalidBaseline { agent: String, key: String },

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid config {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BenchError {
    /// True for failures that only invalidate one record or one comparison.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BenchError::EmptySample { .. }
                | BenchError::Unclassified { .. }
                | BenchError::NoBaseline { .. }
                | BenchError::InvalidBaseline { .. }
        )
    }
}

fn variant_suffix(variant: &Option<String>) -> String {
    variant
        .as_ref()
        .map(|variant| format!(" ({variant})"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_level_errors_are_recoverable() {
        let err = BenchError::NoBaseline {
            agent: "debian2".into(),
            variant: None,
        };
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "skipping debian2: no baseline for this agent");

        let err = BenchError::NoBaseline {
            agent: "debian2".into(),
            variant: Some("dense 2^8 Standard".into()),
        };
        assert_eq!(
            err.to_string(),
            "skipping debian2 (dense 2^8 Standard): no baseline for this agent"
        );
    }

    #[test]
    fn query_errors_are_fatal() {
        let err = BenchError::MalformedQuery("empty scheduler".into());
        assert!(!err.is_recoverable());
        let err = BenchError::MalformedRecord("missing throughput".into());
        assert!(!err.is_recoverable());
    }
}
