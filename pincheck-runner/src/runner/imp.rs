// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ExecutionResult, ExecutionUnit, ResultStatus};
use crate::{
    build_system::ResultMaterializer,
    config::{PincheckProfile, TestThreads},
    errors::TestRunnerBuildError,
    list::{CaseRegistry, TestCase},
    reporter::{PoolSnapshot, SlotSnapshot, TestEvent, TestEventKind},
    time::{StopwatchStart, stopwatch},
};
use chrono::Local;
use std::{collections::VecDeque, convert::Infallible, sync::Arc, time::Duration};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
    repeat: Option<usize>,
    sort_by_timeout: Option<bool>,
    tick_interval: Option<Duration>,
}

impl TestRunnerBuilder {
    /// Sets the number of slots in the pool.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets the number of epochs to run.
    pub fn set_repeat(&mut self, repeat: usize) -> &mut Self {
        self.repeat = Some(repeat);
        self
    }

    /// Sets whether the backlog is sorted by decreasing timeout.
    pub fn set_sort_by_timeout(&mut self, sort_by_timeout: bool) -> &mut Self {
        self.sort_by_timeout = Some(sort_by_timeout);
        self
    }

    /// Sets how often the scheduler polls its slots.
    pub fn set_tick_interval(&mut self, tick_interval: Duration) -> &mut Self {
        self.tick_interval = Some(tick_interval);
        self
    }

    /// Creates a new test runner over the cases in `registry`.
    ///
    /// Options not set on the builder are taken from `profile`.
    pub fn build<M: ResultMaterializer>(
        self,
        registry: &CaseRegistry,
        profile: &PincheckProfile<'_>,
        materializer: Arc<M>,
    ) -> Result<TestRunner<M>, TestRunnerBuildError> {
        let pool_size = self
            .test_threads
            .unwrap_or_else(|| profile.jobs())
            .compute()
            .max(1);
        let repeat = self.repeat.unwrap_or_else(|| profile.repeat()).max(1);
        let sort_by_timeout = self
            .sort_by_timeout
            .unwrap_or_else(|| profile.sort_by_timeout());
        let tick_interval = self
            .tick_interval
            .unwrap_or_else(|| profile.tick_interval());

        let mut cases: Vec<_> = registry.iter().cloned().map(Arc::new).collect();
        if sort_by_timeout {
            // Stable, so cases with equal timeouts keep discovery order.
            cases.sort_by(|a, b| b.timeout().cmp(&a.timeout()));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("pincheck-runner")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                cases,
                pool_size,
                repeat,
                tick_interval,
                materializer,
            },
            runtime,
        })
    }
}

/// Context for running cases.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<M> {
    inner: TestRunnerInner<M>,
    runtime: Runtime,
}

impl<M: ResultMaterializer> TestRunner<M> {
    /// Returns the number of slots in the pool.
    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    /// Returns the number of epochs this runner will run.
    pub fn repeat(&self) -> usize {
        self.inner.repeat
    }

    /// Returns the cases in the order they are admitted.
    pub fn cases(&self) -> impl ExactSizeIterator<Item = &TestCase> + '_ {
        self.inner.cases.iter().map(|case| &**case)
    }

    /// Runs every epoch.
    ///
    /// The callback is called with each event the run produces.
    pub fn execute<F>(&mut self, mut callback: F) -> RunStats
    where
        F: FnMut(TestEvent<'_>),
    {
        let result = self.try_execute::<Infallible, _>(|event| {
            callback(event);
            Ok(())
        });
        match result {
            Ok(stats) => stats,
            Err(never) => match never {},
        }
    }

    /// Runs every epoch.
    ///
    /// Accepts a callback that is called with each event the run produces. If the callback
    /// returns an error, cases that are still running are waited for, then the error is
    /// returned and the callback is no longer called.
    pub fn try_execute<E, F>(&mut self, mut callback: F) -> Result<RunStats, E>
    where
        F: FnMut(TestEvent<'_>) -> Result<(), E>,
    {
        self.runtime.block_on(self.inner.run(&mut callback))
    }
}

#[derive(Debug)]
struct TestRunnerInner<M> {
    cases: Vec<Arc<TestCase>>,
    pool_size: usize,
    repeat: usize,
    tick_interval: Duration,
    materializer: Arc<M>,
}

impl<M: ResultMaterializer> TestRunnerInner<M> {
    fn expected_result_count(&self) -> usize {
        self.cases.iter().map(|case| case.phases().len()).sum()
    }

    async fn run<E, F>(&self, callback: &mut F) -> Result<RunStats, E>
    where
        F: FnMut(TestEvent<'_>) -> Result<(), E>,
    {
        let run_start = stopwatch();
        let expected_result_count = self.expected_result_count();
        let mut stats = RunStats {
            epochs: self.repeat,
            ..RunStats::default()
        };

        callback(make_event(
            &run_start,
            TestEventKind::RunStarted {
                case_count: self.cases.len(),
                expected_result_count,
                pool_size: self.pool_size,
                epochs: self.repeat,
            },
        ))?;

        for epoch in 1..=self.repeat {
            callback(make_event(
                &run_start,
                TestEventKind::EpochStarted {
                    epoch,
                    epochs: self.repeat,
                    epochs_passed: stats.epochs_passed,
                },
            ))?;

            let results = self.run_epoch(&run_start, callback).await?;
            let epoch_stats = EpochStats::new(expected_result_count, &results);
            stats.on_epoch_finished(&epoch_stats);
            debug!("epoch {epoch} finished: {epoch_stats:?}");

            callback(make_event(
                &run_start,
                TestEventKind::EpochFinished {
                    epoch,
                    epochs: self.repeat,
                    stats: epoch_stats,
                    results: &results,
                },
            ))?;
        }

        callback(make_event(&run_start, TestEventKind::RunFinished { stats }))?;
        Ok(stats)
    }

    /// Runs one full pass over the backlog with fresh slots.
    async fn run_epoch<E, F>(
        &self,
        run_start: &StopwatchStart,
        callback: &mut F,
    ) -> Result<Vec<ExecutionResult>, E>
    where
        F: FnMut(TestEvent<'_>) -> Result<(), E>,
    {
        let expected_count = self.expected_result_count();
        let (persistence, ordinary): (Vec<_>, Vec<_>) =
            self.cases.iter().cloned().partition(|case| case.persistence());
        let mut persistence = VecDeque::from(persistence);
        let mut ordinary = VecDeque::from(ordinary);

        let mut slots: Vec<Option<ExecutionUnit>> = (0..self.pool_size).map(|_| None).collect();
        let mut results = Vec::with_capacity(expected_count);

        loop {
            // Reap finished units in slot order.
            let mut reaped = Vec::new();
            for slot in &mut slots {
                if slot.as_ref().is_some_and(ExecutionUnit::is_finished) {
                    reaped.extend(slot.take());
                }
            }
            for unit in reaped {
                for result in unit.take_results().into_iter().flatten() {
                    results.push(result);
                    let event = make_event(
                        run_start,
                        TestEventKind::CaseFinished {
                            result: &results[results.len() - 1],
                        },
                    );
                    if let Err(error) = callback(event) {
                        join_all(&mut slots).await;
                        return Err(error);
                    }
                }
            }

            if results.len() >= expected_count {
                break;
            }
            if persistence.is_empty() && ordinary.is_empty() && slots.iter().all(Option::is_none)
            {
                warn!(
                    "backlog drained with {} of {expected_count} results reaped",
                    results.len()
                );
                break;
            }

            // A persistence case is admitted only while no other one occupies a slot.
            let mut admit_persistence = !persistence.is_empty()
                && !slots
                    .iter()
                    .flatten()
                    .any(|unit| unit.case().persistence());

            for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
                let next = if admit_persistence {
                    admit_persistence = false;
                    persistence.pop_front()
                } else {
                    ordinary.pop_front()
                };
                let Some(case) = next else {
                    break;
                };
                debug!("admitting `{}`", case.full_name());
                *slot = Some(ExecutionUnit::spawn(case, &self.materializer));
            }
            debug_assert!(
                slots
                    .iter()
                    .flatten()
                    .filter(|unit| unit.case().persistence())
                    .count()
                    <= 1,
                "at most one persistence case occupies the pool"
            );

            let snapshot = PoolSnapshot {
                pool_size: self.pool_size,
                finished_count: results.len(),
                expected_count,
                slots: slots
                    .iter()
                    .flatten()
                    .map(|unit| SlotSnapshot {
                        tag: unit.display_tag(),
                        persistence: unit.case().persistence(),
                    })
                    .collect(),
            };
            let event = make_event(
                run_start,
                TestEventKind::PoolStatus {
                    snapshot: &snapshot,
                },
            );
            if let Err(error) = callback(event) {
                join_all(&mut slots).await;
                return Err(error);
            }

            tokio::time::sleep(self.tick_interval).await;
        }

        Ok(results)
    }
}

/// Waits for every occupied slot before an early exit.
///
/// The results are not reported, but internal errors are logged and returned so they are not
/// lost.
async fn join_all(slots: &mut [Option<ExecutionUnit>]) -> Vec<ExecutionResult> {
    let mut internal_errors = Vec::new();
    for unit in slots.iter_mut().filter_map(Option::take) {
        debug!("waiting for `{}` before exiting", unit.case().full_name());
        for result in unit.join().await.into_iter().flatten() {
            if let Some(note) = &result.failure_note {
                warn!(
                    "`{}` failed internally while the run was stopping: {note}",
                    result.phase.target_name(result.case.full_name())
                );
                internal_errors.push(result);
            }
        }
    }
    internal_errors
}

fn make_event<'a>(run_start: &StopwatchStart, kind: TestEventKind<'a>) -> TestEvent<'a> {
    TestEvent {
        timestamp: Local::now(),
        elapsed: run_start.elapsed(),
        kind,
    }
}

/// Statistics for one epoch.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct EpochStats {
    /// The number of results the epoch was expected to produce.
    pub expected_count: usize,

    /// The number of results the epoch produced.
    pub finished_count: usize,

    /// The number of results that passed.
    pub passed: usize,

    /// The number of results whose artifact did not say `PASS`.
    pub failed: usize,

    /// The number of results that could not produce an artifact, or failed internally.
    pub errored: usize,
}

impl EpochStats {
    fn new(expected_count: usize, results: &[ExecutionResult]) -> Self {
        let mut stats = Self {
            expected_count,
            ..Self::default()
        };
        for result in results {
            stats.finished_count += 1;
            match result.status() {
                ResultStatus::Pass => stats.passed += 1,
                ResultStatus::Fail => stats.failed += 1,
                ResultStatus::Error => stats.errored += 1,
            }
        }
        stats
    }

    /// Returns the number of results that did not pass.
    pub fn not_passed(&self) -> usize {
        self.failed + self.errored
    }

    /// Returns true if every expected result was produced and passed.
    pub fn is_success(&self) -> bool {
        self.finished_count == self.expected_count && self.passed == self.expected_count
    }
}

/// Statistics for a whole run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The number of epochs requested.
    pub epochs: usize,

    /// The number of epochs that ran to completion.
    pub finished_epochs: usize,

    /// The number of epochs in which every result passed.
    pub epochs_passed: usize,

    /// Passing results across all epochs.
    pub passed: usize,

    /// Non-passing results across all epochs.
    pub not_passed: usize,
}

impl RunStats {
    /// Returns true if every requested epoch ran and passed.
    pub fn is_success(&self) -> bool {
        self.finished_epochs == self.epochs && self.epochs_passed == self.epochs
    }

    /// Returns the number of finished epochs that did not pass.
    pub fn epochs_failed(&self) -> usize {
        self.finished_epochs - self.epochs_passed
    }

    fn on_epoch_finished(&mut self, epoch: &EpochStats) {
        self.finished_epochs += 1;
        if epoch.is_success() {
            self.epochs_passed += 1;
        }
        self.passed += epoch.passed;
        self.not_passed += epoch.not_passed();
    }
}
