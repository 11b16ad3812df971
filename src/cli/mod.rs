//! Argument definitions and process plumbing shared by the binaries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::error::{BenchError, Result};
use crate::record::{BenchmarkRecord, MeasurementType};
use crate::store::{DatabaseDump, JsonFileStore, Query, RecordStore};

/// Exit status when the baseline window holds no records.
pub const EXIT_NO_BASELINE: u8 = 2;

#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Throughput side to plot
    #[arg(long, value_enum)]
    pub coder: Option<MeasurementType>,

    /// End of the query window (YYYY-MM-DD or RFC 3339), defaults to today
    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<Utc>>,

    /// Days to look back from --date
    #[arg(long)]
    pub days: Option<u32>,

    /// Extension of the per-group figures
    #[arg(long)]
    pub output_format: Option<String>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Local gauge benchmark file used instead of the database
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Exported database collection
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// JSON settings file, overridden by the flags above
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the grouped series as JSON for a renderer
    #[arg(long)]
    pub series_out: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Config file (or defaults) overlaid with the given flags, validated once.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(coder) = self.coder {
            settings.coder = coder;
        }
        if self.date.is_some() {
            settings.date = self.date;
        }
        if self.days.is_some() {
            settings.days = self.days;
        }
        if let Some(format) = &self.output_format {
            settings.output_format = format.clone();
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if self.json.is_some() {
            settings.json = self.json.clone();
        }
        if self.database.is_some() {
            settings.database = self.database.clone();
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339.
pub fn parse_date(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(date.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc())
        .ok_or_else(|| format!("invalid date '{value}', expected YYYY-MM-DD or RFC 3339"))
}

/// Where records come from: a local gauge file wins over a database export.
#[derive(Clone, Debug)]
pub enum Source {
    Local(JsonFileStore),
    Database(DatabaseDump),
}

impl Source {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match (&settings.json, &settings.database) {
            (Some(path), _) => Ok(Source::Local(JsonFileStore::new(path))),
            (None, Some(path)) => Ok(Source::Database(DatabaseDump::new(path))),
            (None, None) => Err(BenchError::InvalidConfig {
                field: "database".into(),
                reason: "no record source, pass --json or --database".into(),
            }),
        }
    }
}

impl RecordStore for Source {
    fn load(&self, query: &Query) -> Result<Vec<BenchmarkRecord>> {
        match self {
            Source::Local(store) => store.load(query),
            Source::Database(store) => store.load(query),
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, Source::Local(_))
    }
}

/// How a run ended when it did not fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Done,
    NoBaseline,
}

/// 0 on success, [`EXIT_NO_BASELINE`] for an empty baseline window, 1 on failure.
pub fn status_code(outcome: &Result<Status>) -> u8 {
    match outcome {
        Ok(Status::Done) => 0,
        Ok(Status::NoBaseline) => EXIT_NO_BASELINE,
        Err(_) => 1,
    }
}

pub fn exit_code(outcome: Result<Status>) -> ExitCode {
    if let Err(error) = &outcome {
        error!(%error, "run failed");
    }
    ExitCode::from(status_code(&outcome))
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`.
pub fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
