use clap::Parser;
use std::process::ExitCode;
use tracing::info;

use coding_benchmark_rs::cli::{exit_code, init_tracing, CommonArgs, Source, Status};
use coding_benchmark_rs::error::Result;
use coding_benchmark_rs::pipeline::{compare_branches, ComparisonOutcome};
use coding_benchmark_rs::record::Metric;
use coding_benchmark_rs::report::{gain_table, plan_comparison, write_series, Layout};
use coding_benchmark_rs::store::RecordStore;

/// Compares forced benchmark runs of every branch against the nightly baseline
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: &Cli) -> Result<Status> {
    let settings = cli.common.settings()?;
    let store = Source::from_settings(&settings)?;

    let report = match compare_branches(&store, &settings)? {
        ComparisonOutcome::NoBaseline => return Ok(Status::NoBaseline),
        ComparisonOutcome::Compared(report) => report,
    };

    if report.gains.is_empty() {
        println!("No branch results to compare against {}", report.baseline_branch);
    } else {
        println!("\nGains against {} ({})", report.baseline_branch, settings.coder);
        gain_table(&report).printstd();
    }

    let layout = Layout::new(&settings, store.is_local(), Metric::Throughput);
    let documents = plan_comparison(&report, &layout);
    for document in &documents {
        info!(
            branch = %document.branch,
            figures = document.artifacts.len(),
            combined = %document.combined.display(),
            "planned figures"
        );
    }

    if let Some(path) = &cli.common.series_out {
        write_series(&documents, path)?;
        info!(path = %path.display(), "wrote series");
    }

    info!(
        gains = report.gains.len(),
        diagnostics = report.diagnostics.len(),
        ungrouped = report.ungrouped,
        "comparison finished"
    );
    Ok(Status::Done)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);
    exit_code(run(&cli))
}
