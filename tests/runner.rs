mod common;

use std::fs;

use common::{context, node_set, FakeNodes};
use dhtbench::runner::GROWTH_SCHEMA_VERSION;
use dhtbench::{BenchError, GrowthReport, OperationError, ProbeOutcome, TimedRunner};

#[test]
fn growth_resets_then_times_every_join_and_leave() {
    let nodes = node_set(6);
    let (ctx, _dir) = context(nodes);
    let fake = FakeNodes::healthy();

    let report = TimedRunner::new(&fake).growth_and_measure(&ctx, 4, 3);

    assert_eq!(report.schema_version, GROWTH_SCHEMA_VERSION);
    assert_eq!(report.cluster_size, 4);
    assert!(!report.cancelled);
    assert_eq!(report.iterations.len(), 3);
    for (i, it) in report.iterations.iter().enumerate() {
        assert_eq!(it.iteration, i);
        assert_eq!(it.join_secs.len(), 3);
        assert_eq!(it.leave_secs.len(), 3);
        assert!(it.join_secs.iter().chain(&it.leave_secs).all(|&s| s >= 0.0));
    }

    let calls = fake.calls();
    // the reset leaves all six nodes, then 3 iterations of 3 joins and 3 leaves
    assert_eq!(calls.len(), 6 + 3 * 6);
    assert!(calls[..6].iter().all(|(_, op)| op.name() == "leave"));
    let first_cycle: Vec<_> = calls[6..12].iter().map(|(_, op)| op.name()).collect();
    assert_eq!(first_cycle, vec!["join", "join", "join", "leave", "leave", "leave"]);
}

#[test]
fn failed_operations_are_still_timed() {
    let (ctx, _dir) = context(node_set(3));
    let fake = FakeNodes::new(|_, _| Err(OperationError::Transport("refused".into())));

    let report = TimedRunner::new(&fake).growth_and_measure(&ctx, 3, 2);

    assert_eq!(report.iterations.len(), 2);
    assert!(report
        .iterations
        .iter()
        .all(|it| it.join_secs.len() == 2 && it.leave_secs.len() == 2));
}

#[test]
fn amount_is_clamped_to_the_node_set() {
    let (ctx, _dir) = context(node_set(3));
    let fake = FakeNodes::healthy();

    let report = TimedRunner::new(&fake).growth_and_measure(&ctx, 64, 1);

    assert_eq!(report.cluster_size, 3);
    assert_eq!(report.iterations[0].join_secs.len(), 2);
}

#[test]
fn legacy_matrix_alternates_join_and_leave() {
    let (ctx, _dir) = context(node_set(3));
    let fake = FakeNodes::healthy();
    let report = TimedRunner::new(&fake).growth_and_measure(&ctx, 3, 2);

    let matrix = report.legacy_matrix();

    assert_eq!(matrix.len(), 4);
    assert_eq!(matrix[0], report.iterations[0].join_secs);
    assert_eq!(matrix[1], report.iterations[0].leave_secs);
    assert_eq!(matrix[2], report.iterations[1].join_secs);
    assert_eq!(matrix[3], report.iterations[1].leave_secs);
}

#[test]
fn run_growth_writes_a_versioned_dump() {
    let (mut ctx, dir) = context(node_set(4));
    ctx.config.cluster_size = 4;
    ctx.config.iterations = 2;
    let fake = FakeNodes::healthy();

    let (report, path) = TimedRunner::new(&fake).run_growth(&ctx).unwrap();

    assert_eq!(
        path,
        dir.path().join("time_taken_to_join_and_leave_size_4.txt")
    );
    let written: GrowthReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, report);
}

#[test]
fn run_growth_can_write_the_legacy_layout() {
    let (mut ctx, _dir) = context(node_set(2));
    ctx.config.cluster_size = 2;
    ctx.config.iterations = 3;
    ctx.config.legacy_growth_format = true;
    let fake = FakeNodes::healthy();

    let (_, path) = TimedRunner::new(&fake).run_growth(&ctx).unwrap();

    let written: Vec<Vec<f64>> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written.len(), 6);
    assert!(written.iter().all(|times| times.len() == 1));
}

#[test]
fn cancelled_growth_keeps_partial_timings() {
    let (ctx, _dir) = context(node_set(4));
    let cancel = ctx.cancel.clone();
    let fake = FakeNodes::new(move |_, op| {
        if op.name() == "join" {
            cancel.cancel();
        }
        common::ok("")
    });

    let report = TimedRunner::new(&fake).growth_and_measure(&ctx, 4, 5);

    assert!(report.cancelled);
    assert_eq!(report.iterations.len(), 1);
    assert_eq!(report.iterations[0].join_secs.len(), 1);
    assert!(report.iterations[0].leave_secs.is_empty());
}

#[test]
fn probe_reports_a_wrong_value_without_stopping() {
    let (ctx, _dir) = context(node_set(3));
    let fake = FakeNodes::new(|_, op| match op.name() {
        "GET" => common::ok("something else"),
        _ => common::ok(""),
    });

    let report = TimedRunner::new(&fake).probe(&ctx, false).unwrap();

    assert!(!report.passed());
    assert_eq!(report.checks.len(), 4);
    assert!(report
        .checks
        .iter()
        .all(|c| matches!(c.outcome, ProbeOutcome::Mismatch { .. })));
    assert_eq!(ctx.counters.snapshot().correctness_failures, 4);
}

#[test]
fn cancelled_value_check_still_empties_the_cluster() {
    let (ctx, _dir) = context(node_set(3));
    let cancel = ctx.cancel.clone();
    let fake = FakeNodes::new(move |_, op| {
        if op.name() == "join" {
            cancel.cancel();
        }
        common::ok("")
    });

    let report = TimedRunner::new(&fake).probe(&ctx, false).unwrap();

    assert!(report.cancelled);
    assert!(report.checks.is_empty());
    let calls = fake.calls();
    // one join, then every node is asked to leave regardless of the cancellation
    assert_eq!(calls.len(), 1 + 3);
    assert_eq!(calls[0].1.name(), "join");
    assert_eq!(fake.calls_named("leave").len(), 3);
}

#[test]
fn simulated_crash_needs_a_second_node() {
    let (ctx, _dir) = context(node_set(1));
    let fake = FakeNodes::healthy();

    let err = TimedRunner::new(&fake).probe(&ctx, true).unwrap_err();

    assert!(matches!(
        err,
        BenchError::NotEnoughNodes {
            needed: 2,
            given: 1,
            ..
        }
    ));
    assert!(fake.calls().is_empty());
}
