// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, bail, ensure};
use pincheck_runner::{
    config::{PincheckConfig, TestThreads},
    list::{CasePhase, CaseRegistry, TestCase},
    reporter::TestEventKind,
    runner::{ResultStatus, TestRunnerBuilder},
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use test_case::test_case;

fn builder(pool_size: usize) -> TestRunnerBuilder {
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_test_threads(TestThreads::Count(pool_size))
        .set_tick_interval(TEST_TICK);
    builder
}

#[test]
fn persistence_case_runs_alone_in_a_single_slot() -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let registry = registry(&[("a/x", false), ("b/y", true)]);
    let materializer = Arc::new(FakeMaterializer::new(Duration::from_millis(20))?);

    let mut runner = builder(1).build(&registry, &profile, materializer.clone())?;
    let (stats, results) = execute_collect(&mut runner);

    let names: Vec<_> = results.iter().map(|result| result.display_name()).collect();
    assert_eq!(names, ["b/y", "b/y-persistence", "a/x"]);
    assert!(stats.is_success(), "all results passed: {stats:?}");
    assert_eq!(stats.passed, 3);

    let invocations = materializer.invocations();
    let persistence_end = invocations
        .iter()
        .find(|invocation| invocation.phase == CasePhase::Persistence)
        .map(|invocation| invocation.end)
        .expect("persistence phase ran");
    let ordinary = invocations
        .iter()
        .find(|invocation| invocation.full_name == "a/x")
        .expect("a/x ran");
    ensure!(
        ordinary.start >= persistence_end,
        "a/x started only after b/y finished both phases"
    );

    Ok(())
}

#[test]
fn at_most_one_persistence_case_at_a_time() -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let registry = registry(&[
        ("tests/filesys/extended/dir-mk-tree", true),
        ("tests/filesys/base/lg-create", false),
        ("tests/filesys/extended/grow-two-files", true),
        ("tests/filesys/base/sm-full", false),
        ("tests/filesys/base/syn-read", false),
        ("tests/filesys/extended/syn-rw", true),
        ("tests/filesys/base/syn-write", false),
        ("tests/filesys/base/lg-seq-block", false),
    ]);
    let materializer = Arc::new(FakeMaterializer::new(Duration::from_millis(15))?);

    let mut runner = builder(4).build(&registry, &profile, materializer.clone())?;
    let mut max_persistence_slots = 0;
    let mut result_count = 0;
    let stats = runner.execute(|event| match event.kind {
        TestEventKind::PoolStatus { snapshot } => {
            let persistence_slots = snapshot.slots.iter().filter(|slot| slot.persistence).count();
            max_persistence_slots = max_persistence_slots.max(persistence_slots);
        }
        TestEventKind::CaseFinished { .. } => result_count += 1,
        _ => {}
    });

    assert_eq!(max_persistence_slots, 1);
    assert_eq!(result_count, 8 + 3, "persistence cases produce two results each");
    assert!(stats.is_success(), "all results passed: {stats:?}");

    // Each persistence case's phases must not overlap with any other persistence case.
    let mut intervals = BTreeMap::new();
    for invocation in materializer.invocations() {
        let case = registry
            .get(&invocation.full_name)
            .expect("invoked cases are in the registry");
        if !case.persistence() {
            continue;
        }
        let interval = intervals
            .entry(invocation.full_name.clone())
            .or_insert((invocation.start, invocation.end));
        interval.0 = interval.0.min(invocation.start);
        interval.1 = interval.1.max(invocation.end);
    }
    let mut intervals: Vec<_> = intervals.into_values().collect();
    intervals.sort();
    assert_eq!(intervals.len(), 3);
    for pair in intervals.windows(2) {
        ensure!(
            pair[1].0 >= pair[0].1,
            "persistence cases overlapped: {pair:?}"
        );
    }

    Ok(())
}

#[test_case(1 ; "one slot")]
#[test_case(3 ; "three slots")]
#[test_case(16 ; "more slots than cases")]
fn every_case_produces_its_results(pool_size: usize) -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let registry = registry(&[
        ("tests/threads/alarm-single", false),
        ("tests/threads/alarm-multiple", false),
        ("tests/filesys/extended/dir-rm-tree", true),
        ("tests/threads/priority-change", false),
        ("tests/filesys/extended/grow-sparse", true),
    ]);
    let materializer = Arc::new(FakeMaterializer::new(Duration::from_millis(5))?);

    let mut runner = builder(pool_size).build(&registry, &profile, materializer)?;
    assert_eq!(runner.pool_size(), pool_size);
    let (stats, results) = execute_collect(&mut runner);

    assert_eq!(results.len(), registry.expected_result_count());
    assert_eq!(results.len(), 7);
    assert_eq!(stats.passed, 7);
    assert_eq!(stats.not_passed, 0);

    // Every phase of every case shows up exactly once.
    let mut seen: Vec<_> = results.iter().map(|result| result.display_name()).collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 7);

    Ok(())
}

#[test]
fn failures_are_recorded_as_results() -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let registry = registry(&[
        ("tests/userprog/args-none", false),
        ("tests/userprog/exec-bad-ptr", false),
        ("tests/userprog/wait-twice", false),
        ("tests/filesys/extended/dir-over-file", true),
    ]);
    let materializer = Arc::new(
        FakeMaterializer::new(Duration::from_millis(5))?
            .with_artifact(
                "tests/userprog/exec-bad-ptr",
                "\n\nFAIL\nRun didn't produce any output\n",
            )
            .with_exit_code("tests/userprog/wait-twice", 2)
            .with_artifact("tests/filesys/extended/dir-over-file", "FAIL\n"),
    );

    let mut runner = builder(2).build(&registry, &profile, materializer)?;
    let (stats, results) = execute_collect(&mut runner);

    assert!(!stats.is_success());
    assert_eq!(stats.epochs_failed(), 1);
    assert_eq!(stats.passed, 2);
    assert_eq!(stats.not_passed, 3);

    let by_name: BTreeMap<_, _> = results
        .iter()
        .map(|result| (result.display_name(), result))
        .collect();

    let failed = by_name["tests/userprog/exec-bad-ptr"];
    assert_eq!(failed.status(), ResultStatus::Fail);
    assert_eq!(failed.dump, "\n\nFAIL\nRun didn't produce any output\n");

    let errored = by_name["tests/userprog/wait-twice"];
    assert_eq!(errored.status(), ResultStatus::Error);
    assert_eq!(errored.exit_code, 2);
    assert!(
        errored
            .dump
            .starts_with("cannot run making result file properly\n"),
        "dump records the invocation output: {}",
        errored.dump
    );

    // The phases of a persistence case are judged independently.
    assert_eq!(
        by_name["tests/filesys/extended/dir-over-file"].status(),
        ResultStatus::Fail
    );
    assert_eq!(
        by_name["tests/filesys/extended/dir-over-file-persistence"].status(),
        ResultStatus::Pass
    );

    Ok(())
}

#[test]
fn repeats_every_epoch() -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let registry = registry(&[
        ("tests/threads/alarm-zero", false),
        ("tests/threads/alarm-negative", false),
    ]);
    let materializer = Arc::new(FakeMaterializer::new(Duration::from_millis(5))?);

    let mut builder = builder(2);
    builder.set_repeat(3);
    let mut runner = builder.build(&registry, &profile, materializer.clone())?;
    assert_eq!(runner.repeat(), 3);

    let mut epochs_started = Vec::new();
    let mut epoch_result_counts = Vec::new();
    let stats = runner.execute(|event| match event.kind {
        TestEventKind::EpochStarted {
            epoch,
            epochs_passed,
            ..
        } => epochs_started.push((epoch, epochs_passed)),
        TestEventKind::EpochFinished { results, .. } => epoch_result_counts.push(results.len()),
        _ => {}
    });

    assert_eq!(epochs_started, [(1, 0), (2, 1), (3, 2)]);
    assert_eq!(epoch_result_counts, [2, 2, 2]);
    assert_eq!(stats.epochs, 3);
    assert_eq!(stats.finished_epochs, 3);
    assert_eq!(stats.epochs_passed, 3);
    assert!(stats.is_success());
    assert_eq!(materializer.invocations().len(), 6);

    Ok(())
}

#[test]
fn callback_error_waits_for_running_cases() -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let registry = registry(&[
        ("tests/vm/page-linear", false),
        ("tests/vm/page-parallel", false),
        ("tests/vm/page-merge-seq", false),
        ("tests/vm/page-merge-par", false),
    ]);
    let materializer = Arc::new(FakeMaterializer::new(Duration::from_millis(30))?);

    let mut runner = builder(2).build(&registry, &profile, materializer.clone())?;
    let result = runner.try_execute(|event| match event.kind {
        TestEventKind::CaseFinished { .. } => Err("stop"),
        _ => Ok(()),
    });

    match result {
        Err(error) => assert_eq!(error, "stop"),
        Ok(stats) => bail!("run should have stopped early, got {stats:?}"),
    }
    // Only the first two cases were admitted, and both ran to completion.
    let invocations = materializer.invocations();
    assert_eq!(invocations.len(), 2);
    ensure!(
        invocations
            .iter()
            .all(|invocation| invocation.full_name.starts_with("tests/vm/page-")),
        "unexpected invocations: {invocations:?}"
    );

    Ok(())
}

#[test]
fn sort_by_timeout_front_loads_long_cases() -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let registry = CaseRegistry::from_cases([
        TestCase::new("tests/vm", "page-linear", Duration::from_secs(60), false),
        TestCase::new("tests/vm", "page-merge-mm", Duration::from_secs(300), false),
        TestCase::new("tests/vm", "pt-grow-stack", Duration::from_secs(60), false),
        TestCase::new("tests/vm", "page-merge-stk", Duration::from_secs(120), false),
    ]);
    let materializer = Arc::new(FakeMaterializer::new(Duration::ZERO)?);

    let mut sorted = builder(2);
    sorted.set_sort_by_timeout(true);
    let runner = sorted.build(&registry, &profile, materializer.clone())?;
    let names: Vec<_> = runner.cases().map(TestCase::name).collect();
    assert_eq!(
        names,
        ["page-merge-mm", "page-merge-stk", "page-linear", "pt-grow-stack"]
    );

    let runner = builder(2).build(&registry, &profile, materializer)?;
    let names: Vec<_> = runner.cases().map(TestCase::name).collect();
    assert_eq!(
        names,
        ["page-linear", "page-merge-mm", "pt-grow-stack", "page-merge-stk"]
    );

    Ok(())
}

#[test]
fn empty_registry_passes_trivially() -> Result<()> {
    let config = default_config()?;
    let profile = config.profile(PincheckConfig::DEFAULT_PROFILE)?;
    let materializer = Arc::new(FakeMaterializer::new(Duration::ZERO)?);

    let mut runner = builder(4).build(&CaseRegistry::default(), &profile, materializer)?;
    let (stats, results) = execute_collect(&mut runner);

    assert!(results.is_empty());
    assert_eq!(stats.finished_epochs, 1);
    assert!(stats.is_success());

    Ok(())
}
