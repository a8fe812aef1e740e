// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    PhaseResults,
    artifact::{internal_error_result, internal_error_results, run_phase},
};
use crate::{
    build_system::ResultMaterializer,
    errors::UnitStartError,
    list::TestCase,
    time::{StopwatchStart, stopwatch},
};
use futures::FutureExt;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use swrite::{SWrite, swrite};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::debug;

/// What [`ExecutionUnit::poll`] observed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnitStatus {
    /// The unit has not been started.
    Created,

    /// The unit is running.
    Running {
        /// Time since the unit was started.
        elapsed: Duration,
    },

    /// The unit has finished and its results are (or were) available.
    Finished,
}

#[derive(Debug)]
enum UnitState {
    Created,
    Running { stopwatch: StopwatchStart },
    Finished { results: PhaseResults },
    Drained,
}

/// Runs every phase of one case on a background task.
///
/// The unit's state is shared between the scheduler, which polls it, and the task, which writes
/// it exactly once when all phases are done. Neither side holds the lock across an await point.
#[derive(Debug)]
pub struct ExecutionUnit {
    case: Arc<TestCase>,
    state: Arc<Mutex<UnitState>>,
    handle: Option<JoinHandle<()>>,
}

impl ExecutionUnit {
    /// Creates a unit for `case`. Nothing runs until [`start`](Self::start) is called.
    pub fn new(case: Arc<TestCase>) -> Self {
        Self {
            case,
            state: Arc::new(Mutex::new(UnitState::Created)),
            handle: None,
        }
    }

    /// Returns the case this unit runs.
    pub fn case(&self) -> &Arc<TestCase> {
        &self.case
    }

    /// Creates a unit for `case` and starts it immediately.
    pub fn spawn<M: ResultMaterializer>(case: Arc<TestCase>, materializer: &Arc<M>) -> Self {
        let mut unit = Self::new(case);
        let start = stopwatch();
        *unit.lock() = UnitState::Running {
            stopwatch: start.clone(),
        };
        unit.launch(start, materializer);
        unit
    }

    /// Starts running the case on the current Tokio runtime.
    ///
    /// If no runtime is available the unit finishes immediately with internal-error results, so
    /// a started unit always reaches [`UnitStatus::Finished`]. Returns an error if the unit was
    /// started before.
    pub fn start<M: ResultMaterializer>(
        &mut self,
        materializer: &Arc<M>,
    ) -> Result<(), UnitStartError> {
        let start = {
            let mut state = self.lock();
            if !matches!(*state, UnitState::Created) {
                return Err(UnitStartError::new(self.case.full_name()));
            }
            let start = stopwatch();
            *state = UnitState::Running {
                stopwatch: start.clone(),
            };
            start
        };
        self.launch(start, materializer);
        Ok(())
    }

    fn launch<M: ResultMaterializer>(&mut self, start: StopwatchStart, materializer: &Arc<M>) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                let results = internal_error_results(
                    &self.case,
                    start.snapshot(),
                    &format!("failed to launch execution task: {error}"),
                );
                *self.lock() = UnitState::Finished { results };
                return;
            }
        };

        debug!("starting `{}`", self.case.full_name());
        let case = self.case.clone();
        let state = self.state.clone();
        let materializer = materializer.clone();
        self.handle = Some(runtime.spawn(async move {
            let mut results = PhaseResults::new();
            for &phase in case.phases() {
                // Phases are independent: a failed or panicking primary phase does not skip the
                // persistence phase, and neither overwrites the other's result.
                let phase_start = stopwatch();
                let run = run_phase(&*materializer, &case, phase);
                let result = match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => internal_error_result(
                        &case,
                        phase,
                        phase_start.snapshot(),
                        &format!("execution task panicked: {}", panic_message(&*payload)),
                    ),
                };
                results.push(result);
            }
            *lock_state(&state) = UnitState::Finished { results };
        }));
    }

    /// Returns the unit's current status without blocking.
    pub fn poll(&self) -> UnitStatus {
        let mut state = self.lock();
        match &*state {
            UnitState::Created => UnitStatus::Created,
            UnitState::Running { stopwatch } => {
                if self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
                    // The task ended without recording results: it was aborted.
                    let results = internal_error_results(
                        &self.case,
                        stopwatch.snapshot(),
                        "execution task ended without producing results",
                    );
                    *state = UnitState::Finished { results };
                    UnitStatus::Finished
                } else {
                    UnitStatus::Running {
                        elapsed: stopwatch.elapsed(),
                    }
                }
            }
            UnitState::Finished { .. } | UnitState::Drained => UnitStatus::Finished,
        }
    }

    /// Returns true if the unit has finished.
    pub fn is_finished(&self) -> bool {
        self.poll() == UnitStatus::Finished
    }

    /// Takes the results of a finished unit: one per phase, in phase order.
    ///
    /// Returns `None` if the unit has not finished or its results were already taken.
    pub fn take_results(&self) -> Option<PhaseResults> {
        let mut state = self.lock();
        if !matches!(*state, UnitState::Finished { .. }) {
            return None;
        }
        match std::mem::replace(&mut *state, UnitState::Drained) {
            UnitState::Finished { results } => Some(results),
            _ => None,
        }
    }

    /// Returns the compact label shown in the live status line: the case's leaf name, a
    /// `(-persistence)` marker for persistence cases, and elapsed seconds while running.
    pub fn display_tag(&self) -> String {
        let mut tag = self.case.name().to_owned();
        if self.case.persistence() {
            tag.push_str("(-persistence)");
        }
        if let UnitStatus::Running { elapsed } = self.poll() {
            swrite!(tag, "[{}s]", elapsed.as_secs());
        }
        tag
    }

    /// Waits for the background task to end, then takes the results.
    ///
    /// A task that failed without recording results is reported as an internal error.
    pub async fn join(mut self) -> Option<PhaseResults> {
        if let Some(handle) = self.handle.take()
            && let Err(error) = handle.await
        {
            let mut state = self.lock();
            if let UnitState::Running { stopwatch } = &*state {
                let results = internal_error_results(
                    &self.case,
                    stopwatch.snapshot(),
                    &format!("execution task failed: {error}"),
                );
                *state = UnitState::Finished { results };
            }
        }
        self.take_results()
    }

    fn lock(&self) -> MutexGuard<'_, UnitState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<UnitState>) -> MutexGuard<'_, UnitState> {
    // The state is only ever replaced wholesale, so a poisoned lock still holds a valid value.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "(non-string panic payload)"
    }
}
