use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BenchError, Result};
use crate::grouping::Ratio;
use crate::stats::Summary;
use crate::taxonomy::{CodeFamily, Labels};

/// Which side of the codec a throughput record measured.
#[derive(ValueEnum, Serialize, Deserialize, Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    Encoder,
    #[default]
    Decoder,
}

impl MeasurementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementType::Encoder => "encoder",
            MeasurementType::Decoder => "decoder",
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The quantity a record collection measures, and how its per-run samples are derived.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Coding throughput, one value per run.
    Throughput,
    /// Extra symbols received relative to symbols coded, in percent.
    Overhead,
    /// Symbols used beyond the generation size before decoding succeeded.
    ExtraSymbols,
}

impl Metric {
    /// Name of the database collection holding records of this metric.
    pub fn collection(&self) -> &'static str {
        match self {
            Metric::Throughput => "kodo_throughput",
            Metric::Overhead => "kodo_overhead",
            Metric::ExtraSymbols => "kodo_decoding_probability",
        }
    }

    pub fn axis_label(&self) -> &'static str {
        match self {
            Metric::Throughput => "Throughput",
            Metric::Overhead => "Overhead",
            Metric::ExtraSymbols => "Extra symbols",
        }
    }

    /// Only throughput records carry an encoder/decoder distinction.
    pub fn has_measurement_type(&self) -> bool {
        matches!(self, Metric::Throughput)
    }

    fn samples(&self, raw: &RawRecord) -> Result<Vec<f64>> {
        match self {
            Metric::Throughput => raw
                .throughput
                .clone()
                .ok_or_else(|| missing_field(raw, "throughput")),
            Metric::Overhead => {
                let used = raw.used.as_ref().ok_or_else(|| missing_field(raw, "used"))?;
                let coded = raw.coded.as_ref().ok_or_else(|| missing_field(raw, "coded"))?;
                if used.len() != coded.len() {
                    return Err(BenchError::MalformedRecord(format!(
                        "{}/{}: 'used' has {} runs but 'coded' has {}",
                        raw.testcase,
                        raw.benchmark,
                        used.len(),
                        coded.len()
                    )));
                }
                used.iter()
                    .zip(coded)
                    .map(|(&used, &coded)| {
                        if coded == 0.0 {
                            Err(BenchError::MalformedRecord(format!(
                                "{}/{}: zero coded symbols in run",
                                raw.testcase, raw.benchmark
                            )))
                        } else {
                            Ok((used - coded) / coded * 100.0)
                        }
                    })
                    .collect()
            }
            Metric::ExtraSymbols => {
                let used = raw.used.as_ref().ok_or_else(|| missing_field(raw, "used"))?;
                let symbols = raw.symbols as f64;
                Ok(used.iter().map(|&used| used - symbols).collect())
            }
        }
    }
}

fn missing_field(raw: &RawRecord, field: &str) -> BenchError {
    BenchError::MalformedRecord(format!(
        "{}/{} on {}: missing '{}' samples",
        raw.testcase,
        raw.benchmark,
        raw.agent.as_deref().unwrap_or("unknown agent"),
        field
    ))
}

/// One benchmark run as stored by the nightly harness.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct BenchmarkRecord {
    pub branch: String,
    pub scheduler: String,
    pub build_number: u64,
    pub agent: String,
    pub measurement_type: MeasurementType,
    pub testcase: String,
    pub benchmark: String,
    pub symbols: u64,
    pub symbol_size: u64,
    pub density: Option<f64>,
    pub erasure_rate: Option<f64>,
    pub sample_values: Vec<f64>,
    pub unit: String,
    pub utc_date: Option<DateTime<Utc>>,
}

impl BenchmarkRecord {
    /// Short identity used in diagnostics.
    pub fn identity(&self) -> String {
        format!(
            "{}/{} build {} ({}, {})",
            self.branch, self.agent, self.build_number, self.testcase, self.benchmark
        )
    }
}

/// Record as found in the database or a gauge JSON file, using the harness's field names.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct RawRecord {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub scheduler: Option<String>,
    #[serde(default, rename = "buildnumber")]
    pub build_number: Option<u64>,
    #[serde(default, rename = "slavename", alias = "buildername", alias = "agent")]
    pub agent: Option<String>,
    #[serde(default, rename = "type")]
    pub measurement_type: Option<MeasurementType>,
    pub testcase: String,
    pub benchmark: String,
    pub symbols: u64,
    pub symbol_size: u64,
    #[serde(default)]
    pub density: Option<f64>,
    #[serde(default)]
    pub erasure_rate: Option<f64>,
    #[serde(default)]
    pub throughput: Option<Vec<f64>>,
    #[serde(default)]
    pub used: Option<Vec<f64>>,
    #[serde(default)]
    pub coded: Option<Vec<f64>>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub utc_date: Option<DateTime<Utc>>,
}

impl RawRecord {
    /// Converts into a typed record, deriving the sample vector for `metric`.
    ///
    /// An empty sample vector is accepted here; the reducer rejects it per record.
    pub fn into_record(self, metric: Metric) -> Result<BenchmarkRecord> {
        let sample_values = metric.samples(&self)?;
        let unit = self.unit.unwrap_or_else(|| match metric {
            Metric::Throughput => "MB/s".to_string(),
            Metric::Overhead => "%".to_string(),
            Metric::ExtraSymbols => "symbols".to_string(),
        });

        Ok(BenchmarkRecord {
            branch: self.branch.unwrap_or_default(),
            scheduler: self.scheduler.unwrap_or_default(),
            build_number: self.build_number.unwrap_or_default(),
            agent: self.agent.unwrap_or_default(),
            measurement_type: self.measurement_type.unwrap_or_default(),
            testcase: self.testcase,
            benchmark: self.benchmark,
            symbols: self.symbols,
            symbol_size: self.symbol_size,
            density: self.density,
            erasure_rate: self.erasure_rate,
            sample_values,
            unit,
            utc_date: self.utc_date,
        })
    }
}

/// A record whose samples reduced and whose identifiers classified.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ReducedRecord {
    #[serde(flatten)]
    pub record: BenchmarkRecord,
    pub labels: Labels,
    #[serde(flatten)]
    pub summary: Summary,
}

impl ReducedRecord {
    pub fn mean(&self) -> f64 {
        self.summary.mean
    }

    pub fn variant_key(&self) -> VariantKey {
        VariantKey {
            family: self.labels.family,
            field: self.labels.field,
            algorithm: self.labels.algorithm,
            density: self.record.density.map(Ratio),
            erasure_rate: self.record.erasure_rate.map(Ratio),
            symbols: self.record.symbols,
            symbol_size: self.record.symbol_size,
        }
    }
}

/// Everything that must agree for two results to measure the same code variant.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub family: CodeFamily,
    pub field: &'static str,
    pub algorithm: &'static str,
    pub density: Option<Ratio>,
    pub erasure_rate: Option<Ratio>,
    pub symbols: u64,
    pub symbol_size: u64,
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} symbols={} symbol_size={}",
            self.family, self.field, self.algorithm, self.symbols, self.symbol_size
        )?;
        if let Some(density) = self.density {
            write!(f, " density={density}")?;
        }
        if let Some(erasure_rate) = self.erasure_rate {
            write!(f, " erasure_rate={erasure_rate}")?;
        }
        Ok(())
    }
}
