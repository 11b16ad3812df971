use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::record::{BenchmarkRecord, MeasurementType, Metric, RawRecord};

/// Agent name given to every record read from a local gauge file.
pub const LOCAL_AGENT: &str = "local";

/// Filter handed to a [`RecordStore`]. Dates select `[from, to)`; `to` may be open.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub metric: Metric,
    pub branch: Option<String>,
    pub scheduler: String,
    pub measurement_type: Option<MeasurementType>,
    pub from: DateTime<Utc>,
    pub to: Option<DateTime<Utc>>,
}

impl Query {
    pub fn new(metric: Metric, scheduler: impl Into<String>, from: DateTime<Utc>) -> Self {
        Self {
            metric,
            branch: None,
            scheduler: scheduler.into(),
            measurement_type: None,
            from,
            to: None,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn measurement_type(mut self, measurement_type: MeasurementType) -> Self {
        self.measurement_type = Some(measurement_type);
        self
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Rejects filters that cannot describe any well-formed record set.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.trim().is_empty() {
            return Err(BenchError::MalformedQuery("scheduler must not be empty".into()));
        }
        if matches!(&self.branch, Some(branch) if branch.trim().is_empty()) {
            return Err(BenchError::MalformedQuery("branch must not be empty".into()));
        }
        if let Some(to) = self.to {
            if to <= self.from {
                return Err(BenchError::MalformedQuery(format!(
                    "date range is empty: [{}, {})",
                    self.from, to
                )));
            }
        }
        if self.measurement_type.is_some() && !self.metric.has_measurement_type() {
            return Err(BenchError::MalformedQuery(format!(
                "{} records have no encoder/decoder type",
                self.metric.collection()
            )));
        }
        Ok(())
    }

    pub fn matches(&self, record: &BenchmarkRecord) -> bool {
        self.accepts(
            &record.branch,
            &record.scheduler,
            record.measurement_type,
            record.utc_date,
        )
    }

    /// Same filter on an undecoded record, so samples are only derived for selected records.
    pub fn matches_raw(&self, raw: &RawRecord) -> bool {
        self.accepts(
            raw.branch.as_deref().unwrap_or_default(),
            raw.scheduler.as_deref().unwrap_or_default(),
            raw.measurement_type.unwrap_or_default(),
            raw.utc_date,
        )
    }

    fn accepts(
        &self,
        branch: &str,
        scheduler: &str,
        measurement_type: MeasurementType,
        date: Option<DateTime<Utc>>,
    ) -> bool {
        if matches!(&self.branch, Some(wanted) if wanted != branch) {
            return false;
        }
        if scheduler != self.scheduler {
            return false;
        }
        if matches!(self.measurement_type, Some(t) if t != measurement_type) {
            return false;
        }
        match date {
            Some(date) => date >= self.from && self.to.map_or(true, |to| date < to),
            None => false,
        }
    }
}

/// Source of raw benchmark records.
pub trait RecordStore {
    /// Returns every record matching an already validated query.
    fn load(&self, query: &Query) -> Result<Vec<BenchmarkRecord>>;

    /// Validates `query`, then loads. A malformed query never reaches the store.
    fn fetch(&self, query: &Query) -> Result<Vec<BenchmarkRecord>> {
        query.validate()?;
        let records = self.load(query)?;
        debug!(
            collection = query.metric.collection(),
            branch = query.branch.as_deref().unwrap_or("*"),
            scheduler = %query.scheduler,
            records = records.len(),
            "fetched records"
        );
        Ok(records)
    }

    /// True when records come from a local file rather than the nightly database.
    fn is_local(&self) -> bool {
        false
    }
}

/// In-memory store, filtering with [`Query::matches`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Vec<BenchmarkRecord>,
}

impl MemoryStore {
    pub fn new(records: Vec<BenchmarkRecord>) -> Self {
        Self { records }
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, query: &Query) -> Result<Vec<BenchmarkRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GaugeFile {
    Many(Vec<RawRecord>),
    One(RawRecord),
}

/// Records written by a local gauge benchmark run, standing in for the database.
///
/// The file carries no branch, scheduler or date context, so only the
/// measurement type filter applies and every record is attributed to
/// [`LOCAL_AGENT`].
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self, query: &Query) -> Result<Vec<BenchmarkRecord>> {
        let content = fs::read_to_string(&self.path)?;
        let raw = match serde_json::from_str::<GaugeFile>(&content)? {
            GaugeFile::Many(records) => records,
            GaugeFile::One(record) => vec![record],
        };

        raw.into_iter()
            .filter(|r| match (query.measurement_type, r.measurement_type) {
                (Some(wanted), Some(found)) => wanted == found,
                _ => true,
            })
            .map(|r| {
                let mut record = r.into_record(query.metric)?;
                record.agent = LOCAL_AGENT.to_string();
                if record.branch.is_empty() {
                    record.branch = LOCAL_AGENT.to_string();
                }
                Ok(record)
            })
            .collect()
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// Exported database collection: full records with branch, scheduler and
/// date, filtered with [`Query::matches`] on every load.
#[derive(Clone, Debug)]
pub struct DatabaseDump {
    path: PathBuf,
}

impl DatabaseDump {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordStore for DatabaseDump {
    fn load(&self, query: &Query) -> Result<Vec<BenchmarkRecord>> {
        let content = fs::read_to_string(&self.path)?;
        let raw: Vec<RawRecord> = serde_json::from_str(&content)?;

        raw.into_iter()
            .filter(|r| query.matches_raw(r))
            .map(|r| r.into_record(query.metric))
            .collect()
    }
}
