use serde::Serialize;

use crate::error::{BenchError, Result};
use crate::record::BenchmarkRecord;

/// Mean and population standard deviation of one record's runs.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub std_dev: f64,
}

/// Reduces repeated-run samples to their mean and population standard deviation.
///
/// Every metric goes through this function so throughput, overhead and
/// extra-symbol series share the same statistics. Returns `None` for an empty
/// slice; [`reduce_record`] turns that into `EmptySample`.
pub fn reduce(samples: &[f64]) -> Option<Summary> {
    if samples.is_empty() {
        return None;
    }

    let len = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / len;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / len;

    Some(Summary {
        mean,
        std_dev: variance.sqrt(),
    })
}

pub fn reduce_record(record: &BenchmarkRecord) -> Result<Summary> {
    reduce(&record.sample_values).ok_or_else(|| BenchError::EmptySample {
        branch: record.branch.clone(),
        agent: record.agent.clone(),
        build: record.build_number,
        testcase: record.testcase.clone(),
        benchmark: record.benchmark.clone(),
    })
}
