// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::list::{CasePhase, TestCase};
use chrono::{DateTime, Local};
use std::{sync::Arc, time::Duration};

/// The exit code recorded when no real one is available: the artifact could not be read, the
/// build system was killed by a signal, or the unit failed internally.
pub const MISSING_EXIT_CODE: i32 = -1;

/// The outcome of one phase of a case.
///
/// Results are created once, when an execution unit finishes a phase, and are immutable
/// afterwards.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// The case this result belongs to.
    pub case: Arc<TestCase>,

    /// The phase of the case that produced this result.
    pub phase: CasePhase,

    /// True if the result artifact reported `PASS`.
    pub passed: bool,

    /// The exit code of the build system invocation, or [`MISSING_EXIT_CODE`].
    pub exit_code: i32,

    /// The artifact contents, or a description of why the artifact could not be produced.
    pub dump: String,

    /// Set if the unit itself failed, as opposed to the case failing.
    pub failure_note: Option<String>,

    /// When this phase started.
    pub start_time: DateTime<Local>,

    /// When this phase finished.
    pub end_time: DateTime<Local>,

    /// How long this phase took.
    pub time_taken: Duration,
}

impl ExecutionResult {
    /// Returns the status this result is reported with.
    pub fn status(&self) -> ResultStatus {
        if self.passed {
            ResultStatus::Pass
        } else if self.failure_note.is_some() || self.exit_code != 0 {
            ResultStatus::Error
        } else {
            ResultStatus::Fail
        }
    }

    /// Returns the name this result is displayed under: the full name of the case, with a
    /// `-persistence` suffix for the persistence phase.
    pub fn display_name(&self) -> String {
        self.phase.target_name(self.case.full_name())
    }
}

/// How a result is reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultStatus {
    /// The phase passed.
    Pass,

    /// The artifact was produced and did not say `PASS`.
    Fail,

    /// The artifact could not be produced, or the unit failed internally.
    Error,
}
