//! Integration tests for abkit
//!
//! These tests exercise the facade end to end: validation, frequentist
//! comparison, winner selection, offload with cancellation and report output.

use abkit::prelude::*;
use abkit::{
    AnalysisReport, BackgroundWorker, BetterVariant, CancellationToken, FieldErrorKind, Job,
    JobOutput, LookSnapshot, OutputFormat, WarningCode, WorkerRequest, evaluate_looks, render,
};

fn record(label: VariantLabel, visitors: u64, conversions: u64) -> VariantRecord {
    VariantRecord::new(label, visitors, conversions).unwrap()
}

/// 5% vs 6% over 10,000 visitors each, 95% two-sided
#[test]
fn test_end_to_end_scenario() {
    let mut engine = AnalysisEngine::default();
    let inputs = [
        VariantInput::new(VariantLabel::A, 10_000, 500),
        VariantInput::new(VariantLabel::B, 10_000, 600),
    ];
    let analysis = engine.analyze(&inputs, &TestSettings::default()).unwrap();
    let c = analysis.comparisons[0];

    assert!((c.relative_uplift - 20.0).abs() < 1e-9);
    // Pooled SE: sqrt(0.055 * 0.945 * 2 / 10000)
    assert!((c.z_score - 3.1016).abs() < 1e-3);
    assert!(c.p_value > 0.0015 && c.p_value < 0.0025);
    assert!(c.is_significant);
    assert_eq!(c.better_variant, BetterVariant::Test);

    let winner = analysis.winner.as_ref().unwrap();
    assert_eq!(winner.winner, VariantLabel::B);
    assert!(winner.confidence <= 95.0);
}

#[test]
fn test_frequentist_is_deterministic() {
    let control = record(VariantLabel::A, 7_321, 402);
    let test = record(VariantLabel::B, 7_102, 455);
    let settings = TestSettings::new(ConfidenceLevel::NinetyNine, HypothesisType::OneSided);

    let a = serde_json::to_string(&compare_variants(&control, &test, &settings)).unwrap();
    let b = serde_json::to_string(&compare_variants(&control, &test, &settings)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_blocking_errors_list_every_field() {
    let mut engine = AnalysisEngine::default();
    let inputs = [
        VariantInput {
            label: VariantLabel::A,
            visitors: -5.0,
            conversions: 2.5,
        },
        VariantInput::new(VariantLabel::B, 100, 150),
    ];
    let errors = engine.analyze(&inputs, &TestSettings::default()).unwrap_err();

    assert_eq!(errors.for_label(VariantLabel::A).count(), 2);
    assert!(errors
        .for_label(VariantLabel::B)
        .any(|e| e.kind == FieldErrorKind::ExceedsVisitors));
}

#[test]
fn test_warnings_do_not_block() {
    let mut engine = AnalysisEngine::default();
    let inputs = [
        VariantInput::new(VariantLabel::A, 80, 4),
        VariantInput::new(VariantLabel::B, 130, 9),
    ];
    let analysis = engine.analyze(&inputs, &TestSettings::default()).unwrap();

    let codes: Vec<WarningCode> = analysis.warnings.iter().map(|w| w.code).collect();
    assert!(codes.contains(&WarningCode::SmallSample));
    assert!(codes.contains(&WarningCode::LowConversions));
    assert!(codes.contains(&WarningCode::TrafficImbalance));
    assert_eq!(analysis.comparisons.len(), 1);
}

#[test]
fn test_bayesian_sanity() {
    let control = record(VariantLabel::A, 1_000, 50);
    let test = record(VariantLabel::B, 1_000, 100);

    let lifts: Vec<f64> = (0..3)
        .map(|seed| {
            let result = analyze_bayesian(
                &control,
                &test,
                &BayesianConfig {
                    seed: Some(seed),
                    ..Default::default()
                },
            );
            assert!(result.probability_of_improvement > 0.99);
            result.expected_lift_percent
        })
        .collect();

    for lift in &lifts {
        assert!((lift - 100.0).abs() < 6.0, "lift {}", lift);
    }
}

#[test]
fn test_sequential_boundaries_at_extremes() {
    let control = record(VariantLabel::A, 5_000, 250);
    let test = record(VariantLabel::B, 5_000, 260);

    for spending in [SpendingFunction::Pocock, SpendingFunction::OBrienFleming] {
        let design = SequentialDesign {
            spending,
            ..Default::default()
        };
        let start = sequential_status(&control, &test, &design, 0).unwrap();
        assert_eq!(start.alpha_boundary, 0.0);
        assert_eq!(start.beta_boundary, 1.0);
        assert!(!start.is_conclusive);

        let end = sequential_status(&control, &test, &design, design.total_looks).unwrap();
        assert!((end.alpha_boundary - 0.05).abs() < 1e-12);
        assert!((end.beta_boundary - 0.2).abs() < 1e-9);
    }
}

#[test]
fn test_worker_offload_with_cancellation() {
    let mut worker = BackgroundWorker::spawn(4).unwrap();
    let control = record(VariantLabel::A, 2_000, 100);
    let test = record(VariantLabel::B, 2_000, 130);
    let job = Job::Bayesian {
        control,
        test,
        config: BayesianConfig {
            simulations: 20_000,
            loss_simulations: 2_000,
            seed: Some(3),
        },
    };

    for id in 1..=3 {
        worker
            .submit(WorkerRequest {
                id,
                cache_key: Some("bayes:A-B".to_string()),
                job: job.clone(),
            })
            .unwrap();
    }
    assert!(worker.cancel(2));

    let first = worker.recv().unwrap();
    let third = worker.recv().unwrap();
    assert_eq!(first.id, 1);
    assert!(!first.cached);
    assert_eq!(third.id, 3);
    assert!(third.cached);
    assert_eq!(first.output, third.output);
    assert!(matches!(first.output, JobOutput::Bayesian(_)));
    assert_eq!(worker.pending(), 0);
}

#[test]
fn test_evaluate_looks_stops_when_cancelled() {
    let snapshots: Vec<LookSnapshot> = (1..=5)
        .map(|look| LookSnapshot {
            look,
            control: record(VariantLabel::A, 1_000 * u64::from(look), 50 * u64::from(look)),
            test: record(VariantLabel::B, 1_000 * u64::from(look), 65 * u64::from(look)),
        })
        .collect();
    let token = CancellationToken::new();
    let statuses = evaluate_looks(&snapshots, &SequentialDesign::default(), &token).unwrap();
    assert_eq!(statuses.len(), 5);
    assert!(statuses.iter().all(|s| s.total_looks == 5));

    token.cancel();
    assert!(evaluate_looks(&snapshots, &SequentialDesign::default(), &token).is_err());
}

#[test]
fn test_report_renders_every_format() {
    let mut engine = AnalysisEngine::default();
    let inputs = [
        VariantInput::new(VariantLabel::A, 10_000, 500),
        VariantInput::new(VariantLabel::B, 10_000, 600),
        VariantInput::new(VariantLabel::C, 10_000, 520),
    ];
    let analysis = engine.analyze(&inputs, &TestSettings::default()).unwrap();
    let status = engine
        .sequential_status(
            &analysis.variants[0],
            &analysis.variants[1],
            &SequentialDesign::default(),
            3,
        )
        .unwrap();
    let report = AnalysisReport::from_analysis(&analysis).with_sequential(status);

    let json = render(&report, OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["comparisons"].as_array().map(Vec::len), Some(2));
    assert_eq!(value["winner"]["winner"], "B");
    assert_eq!(value["sequential"]["currentLook"], 3);

    let csv = render(&report, OutputFormat::Csv).unwrap();
    assert_eq!(csv.lines().count(), 3);

    let text = render(&report, OutputFormat::Human).unwrap();
    assert!(text.contains("Sequential look 3/5"));
    assert!(text.contains("C vs A"));
}
