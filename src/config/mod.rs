//! Run settings: every recognized option with its default, validated once.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};
use crate::record::{MeasurementType, Metric};
use crate::store::Query;
use crate::taxonomy::{Taxonomy, DEFAULT_SPARSE_TESTCASES};

pub const DEFAULT_BASELINE_BRANCH: &str = "master";
pub const NIGHTLY_SCHEDULER: &str = "kodo (nightly benchmark)";
pub const FORCED_SCHEDULER: &str = "force kodo (benchmark)";

/// Longest accepted look-back window, one century.
pub const MAX_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Encoder or decoder throughput.
    pub coder: MeasurementType,
    /// End of the query window; midnight UTC today when unset.
    pub date: Option<DateTime<Utc>>,
    /// Window length in days; each view has its own default.
    pub days: Option<u32>,
    /// Extension of per-group artifacts, e.g. png, eps, pdf.
    pub output_format: String,
    pub output_dir: PathBuf,
    /// Local gauge file replacing the database.
    pub json: Option<PathBuf>,
    /// Exported database collection read when no gauge file is given.
    pub database: Option<PathBuf>,
    pub baseline_branch: String,
    pub baseline_scheduler: String,
    pub candidate_scheduler: String,
    pub sparse_testcases: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            coder: MeasurementType::Decoder,
            date: None,
            days: None,
            output_format: "png".to_string(),
            output_dir: PathBuf::from("."),
            json: None,
            database: None,
            baseline_branch: DEFAULT_BASELINE_BRANCH.to_string(),
            baseline_scheduler: NIGHTLY_SCHEDULER.to_string(),
            candidate_scheduler: FORCED_SCHEDULER.to_string(),
            sparse_testcases: DEFAULT_SPARSE_TESTCASES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn invalid(field: &str, reason: &str) -> BenchError {
    BenchError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Settings {
    /// Load settings from a JSON file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            invalid(&path.display().to_string(), &format!("failed to read config file: {e}"))
        })?;

        let settings: Self = serde_json::from_str(&content).map_err(|e| {
            invalid(&path.display().to_string(), &format!("failed to parse config: {e}"))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        match self.days {
            Some(0) => return Err(invalid("days", "must look back at least one day")),
            Some(days) if days > MAX_DAYS => {
                return Err(invalid("days", &format!("must not exceed {MAX_DAYS}")))
            }
            _ => {}
        }
        if self.output_format.is_empty()
            || !self.output_format.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(invalid("output_format", "must be a plain file extension"));
        }
        if self.baseline_branch.trim().is_empty() {
            return Err(invalid("baseline_branch", "must not be empty"));
        }
        if self.baseline_scheduler.trim().is_empty() {
            return Err(invalid("baseline_scheduler", "must not be empty"));
        }
        if self.candidate_scheduler.trim().is_empty() {
            return Err(invalid("candidate_scheduler", "must not be empty"));
        }
        Ok(())
    }

    pub fn taxonomy(&self) -> Taxonomy {
        Taxonomy::new(self.sparse_testcases.iter().cloned())
    }

    /// End of the window: the configured date, or today at midnight UTC.
    pub fn reference_date(&self) -> DateTime<Utc> {
        self.date.unwrap_or_else(|| {
            let now = Utc::now();
            now.date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .unwrap_or(now)
        })
    }

    pub fn window_start(&self, default_days: u32) -> DateTime<Utc> {
        let days = self.days.unwrap_or(default_days);
        let date = self.reference_date();
        date.checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn typed(&self, query: Query, metric: Metric) -> Query {
        if metric.has_measurement_type() {
            query.measurement_type(self.coder)
        } else {
            query
        }
    }

    /// Nightly baseline-branch records in `[date - days, date)`.
    pub fn baseline_query(&self, metric: Metric, default_days: u32) -> Query {
        let query = Query::new(metric, &self.baseline_scheduler, self.window_start(default_days))
            .branch(&self.baseline_branch)
            .until(self.reference_date());
        self.typed(query, metric)
    }

    /// Forced runs of any branch since `date - days`, with no upper bound.
    pub fn candidate_query(&self, metric: Metric, default_days: u32) -> Query {
        let query = Query::new(metric, &self.candidate_scheduler, self.window_start(default_days));
        self.typed(query, metric)
    }
}
