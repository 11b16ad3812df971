use chrono::{DateTime, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::io::Write;

use coding_benchmark_rs::config::{Settings, FORCED_SCHEDULER, NIGHTLY_SCHEDULER};
use coding_benchmark_rs::error::BenchError;
use coding_benchmark_rs::gain::GainResult;
use coding_benchmark_rs::grouping::{group_by, key_label, Dimension};
use coding_benchmark_rs::pipeline::{
    compare_branches, compare_records, prepare, summarize, ComparisonOutcome, Diagnostic, View,
};
use coding_benchmark_rs::record::{BenchmarkRecord, MeasurementType, Metric};
use coding_benchmark_rs::report::{gain_table, plan_comparison, write_series, Layout};
use coding_benchmark_rs::store::{JsonFileStore, MemoryStore};
use coding_benchmark_rs::taxonomy::{CodeFamily, Taxonomy};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 2, day, hour, 0, 0).unwrap()
}

fn run(branch: &str, build: u64, agent: &str, testcase: &str, benchmark: &str, samples: &[f64]) -> BenchmarkRecord {
    let scheduler = if branch == "master" { NIGHTLY_SCHEDULER } else { FORCED_SCHEDULER };
    BenchmarkRecord {
        branch: branch.into(),
        scheduler: scheduler.into(),
        build_number: build,
        agent: agent.into(),
        measurement_type: MeasurementType::Decoder,
        testcase: testcase.into(),
        benchmark: benchmark.into(),
        symbols: 16,
        symbol_size: 1600,
        sample_values: samples.to_vec(),
        unit: "MB/s".into(),
        utc_date: Some(at(9, 4)),
        ..Default::default()
    }
}

fn settings() -> Settings {
    Settings {
        date: Some(at(10, 0)),
        days: Some(1),
        ..Default::default()
    }
}

#[test]
fn feature_branch_gain_against_master() {
    let store = MemoryStore::new(vec![
        run("master", 5, "a1", "FullRLNC", "Binary8", &[100.0, 110.0]),
        run("feature", 9, "a1", "FullRLNC", "Binary8", &[130.0, 130.0]),
    ]);

    let ComparisonOutcome::Compared(report) = compare_branches(&store, &settings()).unwrap() else {
        panic!("expected a comparison");
    };

    assert_eq!(report.gains.len(), 1);
    let gain = &report.gains[0];
    assert_eq!(gain.branch, "feature");
    assert_eq!(gain.baseline_build, 5);
    assert_eq!(gain.candidate_build, 9);
    assert!((gain.gain_percent - 23.8095).abs() < 1e-3);

    assert_eq!(report.branches.len(), 1);
    let panels = &report.branches[0].panels;
    assert_eq!(panels.len(), 1);
    assert_eq!(panels[0].family, CodeFamily::Dense);
    assert_eq!(key_label(&panels[0].key), "a1_1600");
    assert_eq!(key_label(&panels[0].series[0].line), "2^8_Standard");
    assert!(report.diagnostics.is_empty());

    // Header, one gain, one branch average
    assert_eq!(gain_table(&report).len(), 3);
}

#[test]
fn agent_without_baseline_is_skipped_once() {
    let baseline = vec![run("master", 5, "a1", "FullRLNC", "Binary8", &[100.0])];
    let candidates = vec![
        run("feature", 9, "a1", "FullRLNC", "Binary8", &[110.0]),
        run("feature", 9, "a2", "FullRLNC", "Binary8", &[120.0]),
        run("feature", 9, "a2", "FullRLNC", "Binary16", &[120.0]),
    ];

    let report = compare_records(baseline, candidates, "master", &Taxonomy::default());

    assert_eq!(report.gains.len(), 1);
    assert_eq!(report.gains[0].agent, "a1");
    let skipped: Vec<&Diagnostic> = report
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::NoBaseline(BenchError::NoBaseline { agent, variant: None }) if agent == "a2"))
        .collect();
    assert_eq!(skipped.len(), 1);
}

#[test]
fn latest_candidate_build_is_authoritative() {
    let baseline = vec![
        run("master", 4, "a1", "FullRLNC", "Binary8", &[50.0]),
        run("master", 5, "a1", "FullRLNC", "Binary8", &[100.0]),
    ];
    let candidates = vec![
        run("feature", 9, "a1", "FullRLNC", "Binary8", &[150.0]),
        run("feature", 8, "a1", "FullRLNC", "Binary8", &[10.0]),
        run("master", 6, "a1", "FullRLNC", "Binary8", &[1.0]),
    ];

    let report = compare_records(baseline, candidates, "master", &Taxonomy::default());
    assert_eq!(report.gains.len(), 1);
    assert_eq!(report.gains[0].baseline_build, 5);
    assert_eq!(report.gains[0].candidate_build, 9);
    assert!((report.gains[0].gain_percent - 50.0).abs() < 1e-9);
}

#[test]
fn zero_baseline_is_reported_not_divided() {
    let baseline = vec![run("master", 5, "a1", "FullRLNC", "Binary8", &[0.0, 0.0])];
    let candidates = vec![run("feature", 9, "a1", "FullRLNC", "Binary8", &[10.0])];

    let report = compare_records(baseline, candidates, "master", &Taxonomy::default());
    assert!(report.gains.is_empty());
    assert_eq!(report.count(|d| matches!(d, Diagnostic::InvalidBaseline(_))), 1);
}

#[test]
fn empty_baseline_window_is_a_soft_outcome() {
    let store = MemoryStore::new(vec![run("feature", 9, "a1", "FullRLNC", "Binary8", &[1.0])]);
    assert!(matches!(
        compare_branches(&store, &settings()).unwrap(),
        ComparisonOutcome::NoBaseline
    ));
}

#[test]
fn gains_do_not_depend_on_input_order() {
    let mut baseline = Vec::new();
    let mut candidates = Vec::new();
    for (i, benchmark) in ["Binary", "Binary8", "Binary16", "Prime2325"].iter().enumerate() {
        for agent in ["a1", "a2", "a3"] {
            let base = 100.0 + i as f64;
            baseline.push(run("master", 5, agent, "FullRLNC", benchmark, &[base]));
            candidates.push(run("feature", 9, agent, "FullRLNC", benchmark, &[base * 1.1]));
            candidates.push(run("other", 3, agent, "FullDelayedRLNC", benchmark, &[base]));
        }
    }

    let sorted = |mut gains: Vec<GainResult>| {
        gains.sort_by(|a, b| (&a.branch, &a.agent, &a.key).cmp(&(&b.branch, &b.agent, &b.key)));
        gains
    };
    let expected = sorted(
        compare_records(baseline.clone(), candidates.clone(), "master", &Taxonomy::default()).gains,
    );

    let mut rng = thread_rng();
    for _ in 0..10 {
        baseline.shuffle(&mut rng);
        candidates.shuffle(&mut rng);
        let report =
            compare_records(baseline.clone(), candidates.clone(), "master", &Taxonomy::default());
        assert_eq!(sorted(report.gains), expected);
    }
}

#[test]
fn grouping_accounts_for_every_classified_record() {
    let mut records = Vec::new();
    for day in 1..6 {
        let mut record = run("master", u64::from(day), "a1", "FullRLNC", "Binary8", &[1.0]);
        record.utc_date = if day % 2 == 0 { None } else { Some(at(day, 4)) };
        records.push(record);
    }

    let prepared = prepare(records, &Taxonomy::default());
    let grouping = group_by(&prepared.records, &[Dimension::Agent, Dimension::Date]);
    assert_eq!(grouping.grouped() + grouping.excluded(), prepared.records.len());
    assert_eq!(grouping.excluded(), 2);
    assert_eq!(grouping.len(), 3);
}

#[test]
fn local_gauge_file_summary() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"type": "decoder", "testcase": "FullRLNC", "benchmark": "Binary8",
              "symbols": 16, "symbol_size": 1600, "throughput": [10.0, 20.0]}},
            {{"type": "decoder", "testcase": "SparseFullRLNC", "benchmark": "Binary",
              "symbols": 16, "symbol_size": 1600, "density": 0.2, "throughput": [5.0]}},
            {{"type": "decoder", "testcase": "SeedRLNC", "benchmark": "Binary8",
              "symbols": 16, "symbol_size": 1600, "throughput": [5.0]}}
        ]"#
    )
    .unwrap();

    let store = JsonFileStore::new(file.path());
    let report = summarize(&store, &settings(), View::Throughput).unwrap();

    assert_eq!(report.branch, "local");
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.panels.len(), 2);
    assert_eq!(report.panels[0].family, CodeFamily::Sparse);
    assert_eq!(key_label(&report.panels[1].key), "local_1600");
    assert_eq!(report.panels[1].series[0].points[0].y, 15.0);
    assert_eq!(
        report
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::Unclassified { .. }))
            .count(),
        1
    );
}

#[test]
fn series_export_follows_the_layout() {
    let baseline = vec![run("master", 5, "a1", "FullRLNC", "Binary8", &[100.0])];
    let candidates = vec![run("new-feature", 9, "a1", "FullRLNC", "Binary8", &[120.0])];
    let report = compare_records(baseline, candidates, "master", &Taxonomy::default());

    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        output_dir: dir.path().to_path_buf(),
        ..settings()
    };
    let layout = Layout::new(&settings, false, Metric::Throughput);
    let documents = plan_comparison(&report, &layout);
    assert_eq!(documents.len(), 1);
    assert_eq!(
        documents[0].artifacts[0].path,
        dir.path().join("database/decoder/new_feature/dense/a1_1600.png")
    );

    let out = dir.path().join("series/comparison.json");
    write_series(&documents, &out).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written[0]["branch"], "new-feature");
    assert_eq!(written[0]["artifacts"][0]["legend"], "(Field, Algorithm)");
}
