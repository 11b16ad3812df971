//! Stage wiring: fetch, reduce, classify, select, compare and group.
//!
//! Every stage takes its input by reference or value and returns a new view;
//! nothing is mutated after it is derived. Record-level failures become
//! [`Diagnostic`]s and the run continues.

use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{BenchError, Result};
use crate::gain::{compare, GainResult};
use crate::grouping::{group_by, pivot, Dimension, Dimensioned, GroupKey, Series, Valued};
use crate::record::{BenchmarkRecord, Metric, ReducedRecord};
use crate::selector::{select_authoritative, DuplicateVariant};
use crate::stats::reduce_record;
use crate::store::{RecordStore, LOCAL_AGENT};
use crate::taxonomy::{CodeFamily, Taxonomy};

const FAMILIES: [CodeFamily; 2] = [CodeFamily::Sparse, CodeFamily::Dense];

/// A recovered record-level failure.
#[derive(Debug)]
pub enum Diagnostic {
    /// Record had no samples and was dropped.
    EmptySample(BenchError),
    /// Record could not be classified and was left out of every group.
    Unclassified { record: String, error: BenchError },
    /// A comparison was skipped because no baseline exists for it.
    NoBaseline(BenchError),
    /// A gain was skipped because the baseline mean is zero.
    InvalidBaseline(BenchError),
    /// A build reported the same variant twice; the first record was kept.
    DuplicateVariant(DuplicateVariant),
}

impl Diagnostic {
    fn from_skipped(error: BenchError) -> Self {
        match error {
            BenchError::InvalidBaseline { .. } => Diagnostic::InvalidBaseline(error),
            other => Diagnostic::NoBaseline(other),
        }
    }

    pub fn emit(&self) {
        match self {
            Diagnostic::EmptySample(error) => warn!(%error, "dropping record"),
            Diagnostic::Unclassified { record, error } => {
                warn!(record = %record, %error, "excluding unclassified record")
            }
            Diagnostic::NoBaseline(error) => warn!(%error, "no baseline"),
            Diagnostic::InvalidBaseline(error) => warn!(%error, "skipping gain"),
            Diagnostic::DuplicateVariant(dup) => warn!(
                branch = %dup.branch,
                agent = %dup.agent,
                build = dup.build_number,
                variant = %dup.key,
                "duplicate variant in build, keeping first"
            ),
        }
    }
}

fn record_diagnostic(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    diagnostic.emit();
    diagnostics.push(diagnostic);
}

/// Records that reduced and classified, and what happened to the rest.
#[derive(Debug, Default)]
pub struct Prepared {
    pub records: Vec<ReducedRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Reduces and classifies each record; failures are dropped with a diagnostic.
pub fn prepare(records: Vec<BenchmarkRecord>, taxonomy: &Taxonomy) -> Prepared {
    let mut prepared = Prepared::default();

    for record in records {
        let summary = match reduce_record(&record) {
            Ok(summary) => summary,
            Err(error) => {
                record_diagnostic(&mut prepared.diagnostics, Diagnostic::EmptySample(error));
                continue;
            }
        };

        let labels = match taxonomy
            .classify(&record.benchmark, &record.testcase)
            .labels(&record.benchmark, &record.testcase)
        {
            Ok(labels) => labels,
            Err(error) => {
                record_diagnostic(
                    &mut prepared.diagnostics,
                    Diagnostic::Unclassified {
                        record: record.identity(),
                        error,
                    },
                );
                continue;
            }
        };

        prepared.records.push(ReducedRecord {
            record,
            labels,
            summary,
        });
    }

    prepared
}

/// Grouping presets for the single-branch summaries.
#[derive(ValueEnum, Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    /// Throughput per agent against generation size.
    Throughput,
    /// Throughput per agent and generation over time.
    Timeline,
    /// Throughput of every agent side by side, per code variant.
    Device,
    /// Extra received symbols relative to coded symbols.
    Overhead,
    /// Symbols needed beyond the generation size.
    ExtraSymbols,
    /// Throughput per agent against the erasure rate of the stored symbols.
    Storage,
}

/// Legend dimensions that tell code variants of one family apart.
pub fn variant_dimensions(family: CodeFamily) -> &'static [Dimension] {
    match family {
        CodeFamily::Dense => &[Dimension::Field, Dimension::Algorithm],
        CodeFamily::Sparse => &[Dimension::Field, Dimension::Density],
    }
}

impl View {
    pub fn metric(&self) -> Metric {
        match self {
            View::Throughput | View::Timeline | View::Device | View::Storage => {
                Metric::Throughput
            }
            View::Overhead => Metric::Overhead,
            View::ExtraSymbols => Metric::ExtraSymbols,
        }
    }

    pub fn default_days(&self) -> u32 {
        match self {
            View::Timeline => 60,
            _ => 1,
        }
    }

    pub fn group_dimensions(&self, family: CodeFamily) -> Vec<Dimension> {
        match self {
            View::Throughput | View::Overhead | View::ExtraSymbols | View::Storage => {
                vec![Dimension::Agent, Dimension::SymbolSize]
            }
            View::Timeline => vec![Dimension::Agent, Dimension::Symbols, Dimension::SymbolSize],
            View::Device => {
                let mut dims = variant_dimensions(family).to_vec();
                dims.push(Dimension::SymbolSize);
                dims
            }
        }
    }

    pub fn line_dimensions(&self, family: CodeFamily) -> Vec<Dimension> {
        match self {
            View::Device => vec![Dimension::Agent],
            View::Storage => vec![Dimension::Symbols, Dimension::SymbolSize],
            _ => variant_dimensions(family).to_vec(),
        }
    }

    pub fn x_dimension(&self) -> Dimension {
        match self {
            View::Timeline => Dimension::Date,
            View::Storage => Dimension::ErasureRate,
            _ => Dimension::Symbols,
        }
    }
}

/// One renderable figure: a group key within a code family and its series.
#[derive(Serialize, Clone, Debug)]
pub struct Panel {
    pub family: CodeFamily,
    pub key: GroupKey,
    pub key_dimensions: Vec<Dimension>,
    pub line_dimensions: Vec<Dimension>,
    pub x: Dimension,
    pub unit: String,
    pub series: Vec<Series>,
}

/// Groups `items` of each family into panels. Returns the panels and how many
/// items lacked a grouping dimension.
pub fn build_panels<T, F>(
    items: &[T],
    family_of: F,
    group_dims: impl Fn(CodeFamily) -> Vec<Dimension>,
    line_dims: impl Fn(CodeFamily) -> Vec<Dimension>,
    x: Dimension,
    unit: &str,
) -> (Vec<Panel>, usize)
where
    T: Dimensioned + Valued,
    F: Fn(&T) -> CodeFamily,
{
    let mut panels = Vec::new();
    let mut excluded = 0;

    for family in FAMILIES {
        let key_dimensions = group_dims(family);
        let line_dimensions = line_dims(family);
        let grouping = group_by(items.iter().filter(|item| family_of(*item) == family), &key_dimensions);
        excluded += grouping.excluded();

        for (key, members) in grouping.iter() {
            panels.push(Panel {
                family,
                key: key.clone(),
                key_dimensions: key_dimensions.clone(),
                line_dimensions: line_dimensions.clone(),
                x,
                unit: unit.to_string(),
                series: pivot(members, &line_dimensions, x),
            });
        }
    }

    if excluded > 0 {
        warn!(excluded, "results without a value for every grouping dimension were left out");
    }
    (panels, excluded)
}

#[derive(Debug)]
pub struct SummaryReport {
    pub view: View,
    pub metric: Metric,
    pub branch: String,
    pub records: Vec<ReducedRecord>,
    pub panels: Vec<Panel>,
    pub ungrouped: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Pure part of a summary run over already fetched records.
pub fn summarize_records(
    records: Vec<BenchmarkRecord>,
    view: View,
    branch: &str,
    taxonomy: &Taxonomy,
) -> SummaryReport {
    let prepared = prepare(records, taxonomy);
    let unit = prepared
        .records
        .first()
        .map(|r| r.record.unit.clone())
        .unwrap_or_default();

    let (panels, ungrouped) = build_panels(
        &prepared.records,
        |r: &ReducedRecord| r.labels.family,
        |family| view.group_dimensions(family),
        |family| view.line_dimensions(family),
        view.x_dimension(),
        &unit,
    );

    SummaryReport {
        view,
        metric: view.metric(),
        branch: branch.to_string(),
        records: prepared.records,
        panels,
        ungrouped,
        diagnostics: prepared.diagnostics,
    }
}

/// Fetches the baseline branch's nightly records and summarizes them for `view`.
pub fn summarize<S: RecordStore>(
    store: &S,
    settings: &Settings,
    view: View,
) -> Result<SummaryReport> {
    let query = settings.baseline_query(view.metric(), view.default_days());
    let records = store.fetch(&query)?;
    let branch = if store.is_local() {
        LOCAL_AGENT
    } else {
        settings.baseline_branch.as_str()
    };
    info!(view = ?view, records = records.len(), "summarizing");
    Ok(summarize_records(records, view, branch, &settings.taxonomy()))
}

/// Gains of one candidate branch, grouped for rendering.
#[derive(Serialize, Debug)]
pub struct BranchReport {
    pub branch: String,
    pub panels: Vec<Panel>,
}

#[derive(Debug, Default)]
pub struct ComparisonReport {
    pub baseline_branch: String,
    pub gains: Vec<GainResult>,
    pub branches: Vec<BranchReport>,
    pub ungrouped: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ComparisonReport {
    pub fn count<F: Fn(&Diagnostic) -> bool>(&self, predicate: F) -> usize {
        self.diagnostics.iter().filter(|d| predicate(d)).count()
    }
}

#[derive(Debug)]
pub enum ComparisonOutcome {
    /// The baseline window holds no records at all.
    NoBaseline,
    Compared(ComparisonReport),
}

/// Pure part of a comparison run over already fetched baseline and candidate records.
pub fn compare_records(
    baseline: Vec<BenchmarkRecord>,
    candidates: Vec<BenchmarkRecord>,
    baseline_branch: &str,
    taxonomy: &Taxonomy,
) -> ComparisonReport {
    let mut report = ComparisonReport {
        baseline_branch: baseline_branch.to_string(),
        ..Default::default()
    };

    let (baseline, foreign): (Vec<BenchmarkRecord>, Vec<BenchmarkRecord>) = baseline
        .into_iter()
        .partition(|r| r.branch == baseline_branch);
    if !foreign.is_empty() {
        debug!(
            baseline = baseline_branch,
            ignored = foreign.len(),
            "baseline records from other branches"
        );
    }
    let baseline = prepare(baseline, taxonomy);
    report.diagnostics.extend(baseline.diagnostics);

    let candidates: Vec<BenchmarkRecord> = candidates
        .into_iter()
        .filter(|r| r.branch != baseline_branch)
        .collect();
    let candidates = prepare(candidates, taxonomy);
    report.diagnostics.extend(candidates.diagnostics);

    let baseline_selection = select_authoritative(&baseline.records);
    let candidate_selection = select_authoritative(&candidates.records);
    for duplicate in baseline_selection
        .duplicates
        .iter()
        .chain(&candidate_selection.duplicates)
    {
        record_diagnostic(&mut report.diagnostics, Diagnostic::DuplicateVariant(duplicate.clone()));
    }

    if candidate_selection.sets.is_empty() {
        info!(
            baseline = baseline_branch,
            "only baseline results in the window, nothing to compare"
        );
    }

    let mut comparison = compare(&baseline_selection, &candidate_selection.sets);
    for error in std::mem::take(&mut comparison.skipped) {
        record_diagnostic(&mut report.diagnostics, Diagnostic::from_skipped(error));
    }

    let branches: Vec<String> = comparison.branches().into_iter().map(str::to_string).collect();

    for branch in branches {
        let gains: Vec<GainResult> = comparison
            .gains
            .iter()
            .filter(|g| g.branch == branch)
            .cloned()
            .collect();
        let (panels, ungrouped) = build_panels(
            &gains,
            |g: &GainResult| g.key.family,
            |_| vec![Dimension::Agent, Dimension::SymbolSize],
            |family| variant_dimensions(family).to_vec(),
            Dimension::Symbols,
            "%",
        );
        report.ungrouped += ungrouped;
        info!(branch = %branch, gains = gains.len(), panels = panels.len(), "compared branch");
        report.branches.push(BranchReport { branch, panels });
    }

    report.gains = comparison.gains;
    report
}

/// Fetches baseline and candidate windows and compares every candidate branch.
///
/// Both queries are validated before either is fetched. Local stores are
/// rejected: they carry no branch to compare.
pub fn compare_branches<S: RecordStore>(
    store: &S,
    settings: &Settings,
) -> Result<ComparisonOutcome> {
    if store.is_local() {
        return Err(BenchError::InvalidConfig {
            field: "json".into(),
            reason: "a local gauge file holds a single run, branches can only be compared from the database".into(),
        });
    }

    let metric = Metric::Throughput;
    let baseline_query = settings.baseline_query(metric, 1);
    let candidate_query = settings.candidate_query(metric, 1);
    baseline_query.validate()?;
    candidate_query.validate()?;

    let baseline = store.fetch(&baseline_query)?;
    if baseline.is_empty() {
        warn!(
            branch = %settings.baseline_branch,
            from = %baseline_query.from,
            "no baseline records in the window"
        );
        return Ok(ComparisonOutcome::NoBaseline);
    }
    let candidates = store.fetch(&candidate_query)?;

    Ok(ComparisonOutcome::Compared(compare_records(
        baseline,
        candidates,
        &settings.baseline_branch,
        &settings.taxonomy(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::key_label;

    fn record(testcase: &str, benchmark: &str, samples: Vec<f64>) -> BenchmarkRecord {
        BenchmarkRecord {
            branch: "master".into(),
            agent: "a1".into(),
            build_number: 1,
            testcase: testcase.into(),
            benchmark: benchmark.into(),
            symbols: 16,
            symbol_size: 1600,
            sample_values: samples,
            unit: "MB/s".into(),
            ..Default::default()
        }
    }

    #[test]
    fn prepare_accounts_for_every_record() {
        let records = vec![
            record("FullRLNC", "Binary8", vec![1.0]),
            record("FullRLNC", "Binary8", vec![]),
            record("SeedRLNC", "Binary8", vec![1.0]),
            record("FullRLNC", "Prime31", vec![1.0]),
        ];
        let prepared = prepare(records, &Taxonomy::default());

        assert_eq!(prepared.records.len(), 1);
        assert_eq!(prepared.diagnostics.len(), 3);
        assert!(matches!(prepared.diagnostics[0], Diagnostic::EmptySample(_)));
        assert!(matches!(prepared.diagnostics[1], Diagnostic::Unclassified { .. }));
    }

    #[test]
    fn families_are_split_before_grouping() {
        let mut sparse = record("SparseFullRLNC", "Binary", vec![5.0]);
        sparse.density = Some(0.5);
        let records = vec![record("FullRLNC", "Binary8", vec![1.0]), sparse];

        let report = summarize_records(records, View::Throughput, "master", &Taxonomy::default());
        assert_eq!(report.panels.len(), 2);
        assert_eq!(report.panels[0].family, CodeFamily::Sparse);
        assert_eq!(key_label(&report.panels[0].key), "a1_1600");
        assert_eq!(key_label(&report.panels[0].series[0].line), "2_0.5");
        assert_eq!(report.panels[1].family, CodeFamily::Dense);
        assert_eq!(key_label(&report.panels[1].series[0].line), "2^8_Standard");
        assert_eq!(report.ungrouped, 0);
    }

    #[test]
    fn device_view_draws_one_line_per_agent() {
        let mut other = record("FullRLNC", "Binary8", vec![3.0]);
        other.agent = "a2".into();
        let records = vec![record("FullRLNC", "Binary8", vec![1.0]), other];

        let report = summarize_records(records, View::Device, "master", &Taxonomy::default());
        assert_eq!(report.panels.len(), 1);
        assert_eq!(key_label(&report.panels[0].key), "2^8_Standard_1600");
        let lines: Vec<String> = report.panels[0].series.iter().map(|s| key_label(&s.line)).collect();
        assert_eq!(lines, vec!["a1", "a2"]);
    }

    #[test]
    fn storage_view_plots_erasure_rate_per_generation() {
        let mut records = Vec::new();
        for (symbols, erasure_rate, samples) in [(16, 0.1, 4.0), (16, 0.2, 2.0), (32, 0.1, 3.0)] {
            let mut r = record("FullRLNC", "Binary8", vec![samples]);
            r.symbols = symbols;
            r.erasure_rate = Some(erasure_rate);
            records.push(r);
        }

        let report = summarize_records(records, View::Storage, "master", &Taxonomy::default());
        assert_eq!(report.panels.len(), 1);
        let panel = &report.panels[0];
        assert_eq!(key_label(&panel.key), "a1_1600");
        assert_eq!(panel.x, Dimension::ErasureRate);
        let lines: Vec<String> = panel.series.iter().map(|s| key_label(&s.line)).collect();
        assert_eq!(lines, vec!["16_1600", "32_1600"]);
        assert_eq!(panel.series[0].points.len(), 2);
        assert_eq!(panel.series[0].points[1].y, 2.0);
    }

    #[test]
    fn baseline_of_another_branch_is_never_used() {
        let mut stray = record("FullRLNC", "Binary8", vec![50.0]);
        stray.branch = "feature".into();
        stray.agent = "a2".into();
        let mut candidate = record("FullRLNC", "Binary8", vec![50.0]);
        candidate.branch = "feature".into();
        candidate.agent = "a2".into();
        candidate.build_number = 9;

        let report = compare_records(
            vec![record("FullRLNC", "Binary8", vec![1.0]), stray],
            vec![candidate],
            "master",
            &Taxonomy::default(),
        );
        assert!(report.gains.is_empty());
        assert_eq!(report.count(|d| matches!(d, Diagnostic::NoBaseline(_))), 1);
    }

    #[test]
    fn skipped_comparisons_become_diagnostics_next_to_gains() {
        let mut candidate = record("FullRLNC", "Binary8", vec![2.0]);
        candidate.branch = "feature".into();
        let mut unmatched = record("FullRLNC", "Binary16", vec![2.0]);
        unmatched.branch = "feature".into();

        let report = compare_records(
            vec![record("FullRLNC", "Binary8", vec![1.0])],
            vec![candidate, unmatched],
            "master",
            &Taxonomy::default(),
        );
        assert_eq!(report.gains.len(), 1);
        assert_eq!(report.branches.len(), 1);
        assert_eq!(report.count(|d| matches!(d, Diagnostic::NoBaseline(_))), 1);
    }

    #[test]
    fn local_stores_cannot_compare_branches() {
        struct LocalStore;
        impl RecordStore for LocalStore {
            fn load(&self, _query: &crate::store::Query) -> Result<Vec<BenchmarkRecord>> {
                Ok(vec![record("FullRLNC", "Binary8", vec![1.0])])
            }

            fn is_local(&self) -> bool {
                true
            }
        }

        let outcome = compare_branches(&LocalStore, &Settings::default());
        assert!(matches!(outcome, Err(BenchError::InvalidConfig { .. })));
    }

    #[test]
    fn timeline_needs_dates() {
        let records = vec![record("FullRLNC", "Binary8", vec![1.0])];
        let report = summarize_records(records, View::Timeline, "master", &Taxonomy::default());
        assert_eq!(report.panels.len(), 1);
        assert!(report.panels[0].series.is_empty());
    }

    #[test]
    fn view_presets() {
        assert_eq!(View::Timeline.default_days(), 60);
        assert_eq!(View::Overhead.metric(), Metric::Overhead);
        assert_eq!(
            View::Device.group_dimensions(CodeFamily::Sparse),
            vec![Dimension::Field, Dimension::Density, Dimension::SymbolSize]
        );
    }
}
