//! Maps raw benchmark identifiers onto field size, algorithm and code family.
//!
//! Rules are matched by substring, in table order, and the first hit wins.
//! More specific patterns must therefore precede the patterns they contain
//! ("Binary8" before "Binary", "BackwardFullRLNC" before "FullRLNC").

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BenchError, Result};

/// (pattern, label) pairs for the finite field, searched in `benchmark`.
pub const FIELD_RULES: &[(&str, &str)] = &[
    ("Binary16", "2^16"),
    ("Binary8", "2^8"),
    ("Prime2325", "2^32-5"),
    ("Binary", "2"),
];

/// (pattern, label) pairs for the decoding algorithm, searched in `testcase`.
pub const ALGORITHM_RULES: &[(&str, &str)] = &[
    ("BackwardFullRLNC", "Backwards"),
    ("FullDelayedRLNC", "Delayed"),
    ("FullRLNC", "Standard"),
];

pub const DEFAULT_SPARSE_TESTCASES: &[&str] = &["SparseFullRLNC"];

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CodeFamily {
    Dense,
    Sparse,
}

impl CodeFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeFamily::Dense => "dense",
            CodeFamily::Sparse => "sparse",
        }
    }
}

impl fmt::Display for CodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one record. A `None` label means no rule matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub field: Option<&'static str>,
    pub algorithm: Option<&'static str>,
    pub family: CodeFamily,
}

/// A classification where both labels resolved.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Labels {
    pub field: &'static str,
    pub algorithm: &'static str,
    pub family: CodeFamily,
}

impl Classification {
    pub fn is_classified(&self) -> bool {
        self.field.is_some() && self.algorithm.is_some()
    }

    /// Resolved labels, or `Unclassified` naming the identifiers that failed.
    pub fn labels(&self, benchmark: &str, testcase: &str) -> Result<Labels> {
        match (self.field, self.algorithm) {
            (Some(field), Some(algorithm)) => Ok(Labels {
                field,
                algorithm,
                family: self.family,
            }),
            _ => Err(BenchError::Unclassified {
                benchmark: benchmark.to_string(),
                testcase: testcase.to_string(),
            }),
        }
    }
}

fn lookup(rules: &[(&str, &'static str)], raw: &str) -> Option<&'static str> {
    rules
        .iter()
        .find(|(pattern, _)| raw.contains(pattern))
        .map(|&(_, label)| label)
}

pub fn field_label(benchmark: &str) -> Option<&'static str> {
    lookup(FIELD_RULES, benchmark)
}

pub fn algorithm_label(testcase: &str) -> Option<&'static str> {
    lookup(ALGORITHM_RULES, testcase)
}

/// Immutable classification context. Only the sparse set is configurable.
#[derive(Clone, Debug)]
pub struct Taxonomy {
    sparse_testcases: Vec<String>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new(DEFAULT_SPARSE_TESTCASES.iter().map(|s| s.to_string()))
    }
}

impl Taxonomy {
    pub fn new<I>(sparse_testcases: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            sparse_testcases: sparse_testcases.into_iter().collect(),
        }
    }

    pub fn family(&self, testcase: &str) -> CodeFamily {
        if self.sparse_testcases.iter().any(|t| t == testcase) {
            CodeFamily::Sparse
        } else {
            CodeFamily::Dense
        }
    }

    pub fn classify(&self, benchmark: &str, testcase: &str) -> Classification {
        Classification {
            field: field_label(benchmark),
            algorithm: algorithm_label(testcase),
            family: self.family(testcase),
        }
    }
}

struct AgentSpec {
    name: &'static str,
    os: &'static str,
    cpu: &'static str,
}

const AGENTS: &[AgentSpec] = &[
    AgentSpec { name: "debian0", os: "", cpu: "" },
    AgentSpec { name: "debian1", os: "", cpu: "" },
    AgentSpec { name: "debian2", os: "Debian testing x86-64", cpu: "i7-3770S CPU @ 3.10GHz" },
    AgentSpec { name: "debian3", os: "Debian testing x86-64", cpu: "i7-3770S CPU @ 3.10GHz" },
    AgentSpec { name: "debian4", os: "Debian testing x86-64", cpu: "i7-3770S CPU @ 3.10GHz" },
    AgentSpec { name: "debian5", os: "", cpu: "" },
    AgentSpec { name: "arch1", os: "ArchLinux x86-64", cpu: "i7-3770S CPU @ 3.10GHz" },
    AgentSpec { name: "arch2", os: "ArchLinux x86-64", cpu: "i7-3770S CPU @ 3.10GHz" },
    AgentSpec { name: "windows1", os: "Windows 7 Enterprise x86-64", cpu: "Athlon 64 Processor 3200+ @ 2.00GHz" },
    AgentSpec { name: "windows2", os: "Windows 7 Enterprise x86-64", cpu: "Core2 Duo E6550 @ 2.33 GHz" },
    AgentSpec { name: "windows3", os: "Windows 7 Enterprise x86-64", cpu: "i7-2600 CPU @ 3.40GHz" },
    AgentSpec { name: "mac1", os: "MacOS, 10.8.5, x86-64", cpu: "i5-2400 CPU @ 3.10GHz" },
    AgentSpec { name: "mac2", os: "MacOS, 10.9.1, x86-64", cpu: "i5-3210M CPU @ 2.50GHz" },
    AgentSpec { name: "mac3", os: "MacOS, 10.8.5, x86-64", cpu: "i5-3210M CPU @ 2.50GHz" },
];

/// Info-box text for an agent: its id, plus OS and CPU when the agent is known.
pub fn describe_agent(name: &str) -> String {
    let mut description = format!("ID: {}", name.replace('_', "-"));
    if let Some(spec) = AGENTS.iter().find(|spec| spec.name == name) {
        description.push_str(&format!("\nOS: {}\nCPU: {}", spec.os, spec.cpu));
    }
    description
}
