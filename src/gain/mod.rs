use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::record::{ReducedRecord, VariantKey};
use crate::selector::{AuthoritativeSet, Selection};

/// Relative change of a candidate branch against the baseline for one agent and variant.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GainResult {
    pub branch: String,
    pub agent: String,
    pub key: VariantKey,
    pub baseline_build: u64,
    pub candidate_build: u64,
    pub baseline_mean: f64,
    pub candidate_mean: f64,
    pub gain_percent: f64,
}

/// `(candidate - baseline) / baseline * 100`, refusing a zero baseline.
///
/// Callers match `baseline` and `candidate` on agent and variant beforehand.
pub fn compute_gain(baseline: &ReducedRecord, candidate: &ReducedRecord) -> Result<GainResult> {
    let baseline_mean = baseline.mean();
    let key = candidate.variant_key();
    if baseline_mean == 0.0 {
        return Err(BenchError::InvalidBaseline {
            agent: candidate.record.agent.clone(),
            key: key.to_string(),
        });
    }

    let candidate_mean = candidate.mean();
    Ok(GainResult {
        branch: candidate.record.branch.clone(),
        agent: candidate.record.agent.clone(),
        key,
        baseline_build: baseline.record.build_number,
        candidate_build: candidate.record.build_number,
        baseline_mean,
        candidate_mean,
        gain_percent: (candidate_mean - baseline_mean) / baseline_mean * 100.0,
    })
}

/// Gains computed for every candidate set, plus the comparisons that were skipped.
#[derive(Debug, Default)]
pub struct Comparison {
    pub gains: Vec<GainResult>,
    pub skipped: Vec<BenchError>,
}

impl Comparison {
    pub fn branches(&self) -> Vec<&str> {
        let mut branches: Vec<&str> = Vec::new();
        for gain in &self.gains {
            if !branches.contains(&gain.branch.as_str()) {
                branches.push(&gain.branch);
            }
        }
        branches
    }
}

/// Compares each candidate set against the baseline set of the same agent.
///
/// The baseline selection is made once and independently of candidate builds.
/// An agent without baseline contributes one `NoBaseline` entry and no gains;
/// a variant missing from an existing baseline set is skipped on its own.
pub fn compare(baseline: &Selection, candidates: &[AuthoritativeSet]) -> Comparison {
    let mut comparison = Comparison::default();
    let mut reported_agents: FxHashSet<&str> = FxHashSet::default();

    for candidate in candidates {
        let Some(baseline_set) = baseline.for_agent(&candidate.agent) else {
            if reported_agents.insert(candidate.agent.as_str()) {
                comparison.skipped.push(BenchError::NoBaseline {
                    agent: candidate.agent.clone(),
                    variant: None,
                });
            }
            continue;
        };

        debug!(
            branch = %candidate.branch,
            agent = %candidate.agent,
            candidate_build = candidate.build_number,
            baseline_build = baseline_set.build_number,
            "comparing against baseline"
        );

        for result in &candidate.results {
            let key = result.variant_key();
            match baseline_set.find(&key) {
                Some(reference) => match compute_gain(reference, result) {
                    Ok(gain) => comparison.gains.push(gain),
                    Err(err) => comparison.skipped.push(err),
                },
                None => comparison.skipped.push(BenchError::NoBaseline {
                    agent: candidate.agent.clone(),
                    variant: Some(key.to_string()),
                }),
            }
        }
    }

    comparison
}
