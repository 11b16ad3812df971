use prettytable::{row, Table};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::Result;
use crate::grouping::{key_label, Dimension, DimensionValue};
use crate::pipeline::{ComparisonReport, Panel, SummaryReport};
use crate::record::Metric;
use crate::taxonomy::describe_agent;

/// Name of the multi-page document collecting every figure of a branch.
pub const COMBINED_DOCUMENT: &str = "all.pdf";

/// Where a renderer should put each figure. Computes paths only, never touches the disk.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    base: PathBuf,
    output_format: String,
}

impl Layout {
    /// `<output_dir>/<database|local>[/<coder>]`; the coder level only exists for throughput.
    pub fn new(settings: &Settings, local: bool, metric: Metric) -> Self {
        let mut base = settings
            .output_dir
            .join(if local { "local" } else { "database" });
        if metric.has_measurement_type() {
            base.push(settings.coder.as_str());
        }
        Self {
            base,
            output_format: settings.output_format.clone(),
        }
    }

    pub fn branch_dir(&self, branch: &str) -> PathBuf {
        self.base.join(branch.replace('-', "_"))
    }

    pub fn combined(&self, branch: &str) -> PathBuf {
        self.branch_dir(branch).join(COMBINED_DOCUMENT)
    }

    pub fn artifact(&self, branch: &str, panel: &Panel) -> PathBuf {
        self.branch_dir(branch)
            .join(panel.family.as_str())
            .join(format!("{}.{}", artifact_stem(panel), self.output_format))
    }
}

/// File stem of a panel: its key joined with `_`, path separators replaced.
pub fn artifact_stem(panel: &Panel) -> String {
    key_label(&panel.key)
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect()
}

fn title_case(dimension: Dimension) -> String {
    let name = dimension.name().replace('_', " ");
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Legend title such as `(Field, Algorithm)`.
pub fn legend_title(dimensions: &[Dimension]) -> String {
    let names: Vec<String> = dimensions.iter().map(|&d| title_case(d)).collect();
    format!("({})", names.join(", "))
}

#[derive(Serialize, Clone, Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub legend: String,
    /// Agent info box, present when the figure belongs to one agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<String>,
    pub panel: Panel,
}

/// Everything a renderer produces for one branch: per-group figures plus the combined document.
#[derive(Serialize, Clone, Debug)]
pub struct Document {
    pub branch: String,
    pub combined: PathBuf,
    pub artifacts: Vec<Artifact>,
}

fn agent_info(panel: &Panel) -> Option<String> {
    panel
        .key_dimensions
        .iter()
        .position(|&d| d == Dimension::Agent)
        .and_then(|i| panel.key.get(i))
        .map(|value| match value {
            DimensionValue::Text(agent) => describe_agent(agent),
            other => describe_agent(&other.to_string()),
        })
}

fn document(layout: &Layout, branch: &str, panels: &[Panel]) -> Document {
    Document {
        branch: branch.to_string(),
        combined: layout.combined(branch),
        artifacts: panels
            .iter()
            .map(|panel| Artifact {
                path: layout.artifact(branch, panel),
                legend: legend_title(&panel.line_dimensions),
                agent_info: agent_info(panel),
                panel: panel.clone(),
            })
            .collect(),
    }
}

pub fn plan_summary(report: &SummaryReport, layout: &Layout) -> Document {
    document(layout, &report.branch, &report.panels)
}

pub fn plan_comparison(report: &ComparisonReport, layout: &Layout) -> Vec<Document> {
    report
        .branches
        .iter()
        .map(|branch| document(layout, &branch.branch, &branch.panels))
        .collect()
}

/// Writes the planned documents as pretty JSON for an external renderer.
pub fn write_series(documents: &[Document], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(documents)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    Ok(())
}

/// Per-record means of a summary, sorted by agent, family and variant.
pub fn summary_table(report: &SummaryReport) -> Table {
    let mut records: Vec<_> = report.records.iter().collect();
    records.sort_by(|a, b| {
        (&a.record.agent, a.labels.family, a.variant_key())
            .cmp(&(&b.record.agent, b.labels.family, b.variant_key()))
    });

    let mut table = Table::new();
    table.add_row(row![
        "Agent",
        "Family",
        "Field",
        "Algorithm",
        "Density",
        "Symbols",
        "Symbol Size",
        format!("{} ({})", report.metric.axis_label(), unit_of(report)),
        "Std Dev"
    ]);

    for r in records {
        table.add_row(row![
            r.record.agent,
            r.labels.family,
            r.labels.field,
            r.labels.algorithm,
            r.record.density.map(|d| d.to_string()).unwrap_or_default(),
            r.record.symbols,
            r.record.symbol_size,
            format!("{:.2}", r.summary.mean),
            format!("{:.2}", r.summary.std_dev),
        ]);
    }

    table
}

fn unit_of(report: &SummaryReport) -> &str {
    report
        .records
        .first()
        .map(|r| r.record.unit.as_str())
        .unwrap_or("")
}

/// One row per gain, grouped by branch then agent.
pub fn gain_table(report: &ComparisonReport) -> Table {
    let mut gains: Vec<_> = report.gains.iter().collect();
    gains.sort_by(|a, b| (&a.branch, &a.agent, &a.key).cmp(&(&b.branch, &b.agent, &b.key)));

    let mut table = Table::new();
    table.add_row(row![
        "Branch",
        "Agent",
        "Family",
        "Field",
        "Algorithm",
        "Density",
        "Symbols",
        "Symbol Size",
        format!("{} Build", report.baseline_branch),
        "Build",
        format!("{} Mean", report.baseline_branch),
        "Mean",
        "Gain (%)"
    ]);

    for g in &gains {
        table.add_row(row![
            g.branch,
            g.agent,
            g.key.family,
            g.key.field,
            g.key.algorithm,
            g.key.density.map(|d| d.to_string()).unwrap_or_default(),
            g.key.symbols,
            g.key.symbol_size,
            g.baseline_build,
            g.candidate_build,
            format!("{:.2}", g.baseline_mean),
            format!("{:.2}", g.candidate_mean),
            format!("{:+.2}", g.gain_percent),
        ]);
    }

    // Average gain per branch
    let mut branches: Vec<&str> = gains.iter().map(|g| g.branch.as_str()).collect();
    branches.dedup();
    for branch in branches {
        let values: Vec<f64> = gains
            .iter()
            .filter(|g| g.branch == branch)
            .map(|g| g.gain_percent)
            .collect();
        let average = values.iter().sum::<f64>() / values.len() as f64;
        table.add_row(row![
            branch, "AVERAGE", "", "", "", "", "", "", "", "", "", "",
            format!("{:+.2}", average)
        ]);
    }

    table
}
