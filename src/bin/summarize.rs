use clap::Parser;
use std::process::ExitCode;
use tracing::info;

use coding_benchmark_rs::cli::{exit_code, init_tracing, CommonArgs, Source, Status};
use coding_benchmark_rs::error::Result;
use coding_benchmark_rs::pipeline::{summarize, View};
use coding_benchmark_rs::report::{plan_summary, summary_table, write_series, Layout};
use coding_benchmark_rs::store::RecordStore;

/// Groups the nightly results of the baseline branch for one view
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[arg(long, value_enum, default_value_t = View::Throughput)]
    view: View,

    #[command(flatten)]
    common: CommonArgs,
}

fn run(cli: &Cli) -> Result<Status> {
    let settings = cli.common.settings()?;
    let store = Source::from_settings(&settings)?;

    let report = summarize(&store, &settings, cli.view)?;
    if report.records.is_empty() {
        return Ok(Status::NoBaseline);
    }

    println!("\n{} on {}", report.metric.axis_label(), report.branch);
    summary_table(&report).printstd();

    let layout = Layout::new(&settings, store.is_local(), report.metric);
    let document = plan_summary(&report, &layout);
    info!(
        view = ?cli.view,
        figures = document.artifacts.len(),
        combined = %document.combined.display(),
        "planned figures"
    );

    if let Some(path) = &cli.common.series_out {
        write_series(std::slice::from_ref(&document), path)?;
        info!(path = %path.display(), "wrote series");
    }

    Ok(Status::Done)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.common.verbose);
    exit_code(run(&cli))
}
