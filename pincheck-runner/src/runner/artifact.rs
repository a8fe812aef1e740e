// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running one phase of a case and reading its verdict.

use super::{ExecutionResult, MISSING_EXIT_CODE, PhaseResults};
use crate::{
    build_system::ResultMaterializer,
    list::{CasePhase, TestCase},
    time::{StopwatchSnapshot, stopwatch},
};
use std::sync::Arc;
use tracing::debug;

/// The token a passing artifact starts with.
const PASS_TOKEN: &str = "PASS";

/// Returns true if the first non-blank line of `contents` is exactly `PASS`.
pub(crate) fn is_pass(contents: &str) -> bool {
    contents.lines().find(|line| !line.trim().is_empty()) == Some(PASS_TOKEN)
}

/// Asks the build system for the artifact of one phase and turns it into a result.
///
/// Every failure here is a per-case failure: nothing is propagated.
pub(super) async fn run_phase<M: ResultMaterializer>(
    materializer: &M,
    case: &Arc<TestCase>,
    phase: CasePhase,
) -> ExecutionResult {
    let start = stopwatch();
    let full_name = case.full_name();
    debug!("materializing `{}`", phase.artifact_name(full_name));

    let output = match materializer.materialize(full_name, phase).await {
        Ok(output) => output,
        Err(error) => {
            return failed(
                case,
                phase,
                start.snapshot(),
                MISSING_EXIT_CODE,
                String::new(),
                Some(format!("failed to launch the build system: {error}")),
            );
        }
    };

    let Some(invocation_output) = output.output.as_deref().filter(|_| output.is_success()) else {
        let exit_code = output.exit_code.unwrap_or(MISSING_EXIT_CODE);
        let failure_note = (exit_code == 0).then(|| "the build system produced no output".to_owned());
        let dump = format!(
            "cannot run making result file properly\n{}",
            output.output.as_deref().unwrap_or_default()
        );
        return failed(case, phase, start.snapshot(), exit_code, dump, failure_note);
    };
    debug!(
        "build system output for `{}`: {} bytes",
        phase.target_name(full_name),
        invocation_output.len()
    );

    let path = materializer.artifact_path(full_name, phase);
    let contents = match tokio::fs::read(&path).await {
        Ok(contents) => String::from_utf8_lossy(&contents).into_owned(),
        Err(error) => {
            return failed(
                case,
                phase,
                start.snapshot(),
                MISSING_EXIT_CODE,
                format!("cannot open result file `{path}`: {error}"),
                None,
            );
        }
    };

    let snapshot = start.snapshot();
    ExecutionResult {
        case: case.clone(),
        phase,
        passed: is_pass(&contents),
        exit_code: 0,
        dump: contents,
        failure_note: None,
        start_time: snapshot.start_time,
        end_time: snapshot.end_time(),
        time_taken: snapshot.duration,
    }
}

/// Results for every phase of `case`, recording an internal failure of its unit.
pub(super) fn internal_error_results(
    case: &Arc<TestCase>,
    snapshot: StopwatchSnapshot,
    note: &str,
) -> PhaseResults {
    case.phases()
        .iter()
        .map(|&phase| internal_error_result(case, phase, snapshot.clone(), note))
        .collect()
}

/// The result of one phase whose execution failed internally.
pub(super) fn internal_error_result(
    case: &Arc<TestCase>,
    phase: CasePhase,
    snapshot: StopwatchSnapshot,
    note: &str,
) -> ExecutionResult {
    failed(
        case,
        phase,
        snapshot,
        MISSING_EXIT_CODE,
        String::new(),
        Some(note.to_owned()),
    )
}

fn failed(
    case: &Arc<TestCase>,
    phase: CasePhase,
    snapshot: StopwatchSnapshot,
    exit_code: i32,
    dump: String,
    failure_note: Option<String>,
) -> ExecutionResult {
    ExecutionResult {
        case: case.clone(),
        phase,
        passed: false,
        exit_code,
        dump,
        failure_note,
        start_time: snapshot.start_time,
        end_time: snapshot.end_time(),
        time_taken: snapshot.duration,
    }
}
