// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::runner::{EpochStats, ExecutionResult, RunStats};
use chrono::{DateTime, Local};
use std::time::Duration;

/// A run event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and consumed by a
/// [`TestReporter`](crate::reporter::TestReporter).
#[derive(Clone, Debug)]
pub struct TestEvent<'a> {
    /// The time at which the event was generated.
    pub timestamp: DateTime<Local>,

    /// The amount of time elapsed since the start of the run.
    pub elapsed: Duration,

    /// The kind of event this is.
    pub kind: TestEventKind<'a>,
}

/// The kind of run event this is.
///
/// Forms part of [`TestEvent`].
#[derive(Clone, Debug)]
pub enum TestEventKind<'a> {
    /// The run started.
    RunStarted {
        /// The number of cases in each epoch.
        case_count: usize,

        /// The number of results each epoch produces.
        expected_result_count: usize,

        /// The number of slots in the pool.
        pool_size: usize,

        /// The number of epochs that will be run.
        epochs: usize,
    },

    /// An epoch started.
    EpochStarted {
        /// The 1-based index of this epoch.
        epoch: usize,

        /// The number of epochs that will be run.
        epochs: usize,

        /// The number of earlier epochs that passed.
        epochs_passed: usize,
    },

    /// A phase of a case finished.
    CaseFinished {
        /// The result of the phase.
        result: &'a ExecutionResult,
    },

    /// The scheduler finished a tick. Emitted once per tick.
    PoolStatus {
        /// What the pool looks like after the tick.
        snapshot: &'a PoolSnapshot,
    },

    /// An epoch finished.
    EpochFinished {
        /// The 1-based index of this epoch.
        epoch: usize,

        /// The number of epochs that will be run.
        epochs: usize,

        /// Statistics for this epoch.
        stats: EpochStats,

        /// Every result of this epoch, in the order they were reaped.
        results: &'a [ExecutionResult],
    },

    /// The run finished.
    RunFinished {
        /// Statistics for the whole run.
        stats: RunStats,
    },
}

/// The occupancy of the pool at the end of a scheduler tick.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolSnapshot {
    /// The number of slots in the pool.
    pub pool_size: usize,

    /// Results reaped so far in this epoch.
    pub finished_count: usize,

    /// Results this epoch will produce in total.
    pub expected_count: usize,

    /// The occupied slots, in slot order.
    pub slots: Vec<SlotSnapshot>,
}

impl PoolSnapshot {
    /// Returns the number of occupied slots.
    pub fn running_count(&self) -> usize {
        self.slots.len()
    }
}

/// One occupied slot of a [`PoolSnapshot`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SlotSnapshot {
    /// The unit's display tag, including its elapsed-seconds counter.
    pub tag: String,

    /// True if the slot holds a persistence case.
    pub persistence: bool,
}
