// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use pincheck_runner::{
    build_system::{MaterializeOutput, ResultMaterializer},
    config::PincheckConfig,
    list::{CasePhase, CaseRegistry, DEFAULT_TIMEOUT, TestCase},
    reporter::TestEvent,
    runner::{ExecutionResult, RunStats, TestRunner},
};
use std::{
    collections::HashMap,
    future::Future,
    io,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// The scheduler tick used by integration tests.
pub(crate) const TEST_TICK: Duration = Duration::from_millis(5);

/// One call to [`FakeMaterializer::materialize`].
#[derive(Clone, Debug)]
pub(crate) struct Invocation {
    pub(crate) full_name: String,
    pub(crate) phase: CasePhase,
    pub(crate) start: Instant,
    pub(crate) end: Instant,
}

/// A build system that writes canned artifacts into a scratch directory.
///
/// Every artifact says `PASS` unless overridden with [`FakeMaterializer::with_artifact`].
#[derive(Debug)]
pub(crate) struct FakeMaterializer {
    dir: Utf8TempDir,
    delay: Duration,
    artifacts: HashMap<String, &'static str>,
    exit_codes: HashMap<String, i32>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl FakeMaterializer {
    pub(crate) fn new(delay: Duration) -> Result<Self> {
        Ok(Self {
            dir: camino_tempfile::tempdir()?,
            delay,
            artifacts: HashMap::new(),
            exit_codes: HashMap::new(),
            invocations: Arc::default(),
        })
    }

    /// Overrides the artifact written for a target (`full_name` or `full_name-persistence`).
    pub(crate) fn with_artifact(mut self, target: &str, contents: &'static str) -> Self {
        self.artifacts.insert(target.to_owned(), contents);
        self
    }

    /// Makes the invocation for a target exit with `exit_code` without writing anything.
    pub(crate) fn with_exit_code(mut self, target: &str, exit_code: i32) -> Self {
        self.exit_codes.insert(target.to_owned(), exit_code);
        self
    }

    /// Returns every invocation so far, in the order they finished.
    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .expect("invocation log is not poisoned")
            .clone()
    }
}

impl ResultMaterializer for FakeMaterializer {
    fn materialize(
        &self,
        full_name: &str,
        phase: CasePhase,
    ) -> impl Future<Output = io::Result<MaterializeOutput>> + Send {
        let target = phase.target_name(full_name);
        let path = self.artifact_path(full_name, phase);
        let contents = self.artifacts.get(&target).copied().unwrap_or("PASS\n");
        let exit_code = self.exit_codes.get(&target).copied();
        let delay = self.delay;
        let invocations = self.invocations.clone();
        let full_name = full_name.to_owned();

        async move {
            let start = Instant::now();
            tokio::time::sleep(delay).await;
            if exit_code.is_none() {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, contents).await?;
            }
            invocations
                .lock()
                .expect("invocation log is not poisoned")
                .push(Invocation {
                    full_name,
                    phase,
                    start,
                    end: Instant::now(),
                });

            Ok(MaterializeOutput {
                exit_code: Some(exit_code.unwrap_or(0)),
                output: Some(format!("make {target}.result\n")),
            })
        }
    }

    fn artifact_path(&self, full_name: &str, phase: CasePhase) -> Utf8PathBuf {
        self.dir.path().join(phase.artifact_name(full_name))
    }
}

/// Builds a registry from `(full_name, persistence)` pairs.
pub(crate) fn registry(cases: &[(&str, bool)]) -> CaseRegistry {
    CaseRegistry::from_cases(cases.iter().map(|&(full_name, persistence)| {
        let (subdir, name) = full_name.rsplit_once('/').unwrap_or(("", full_name));
        TestCase::new(subdir, name, DEFAULT_TIMEOUT, persistence)
    }))
}

/// Loads the built-in configuration from an empty source root.
pub(crate) fn default_config() -> Result<PincheckConfig> {
    let source_root = camino_tempfile::tempdir()?;
    Ok(PincheckConfig::from_sources(source_root.path(), None)?)
}

/// Runs every epoch, returning the run statistics and every reaped result in order.
pub(crate) fn execute_collect<M: ResultMaterializer>(
    runner: &mut TestRunner<M>,
) -> (RunStats, Vec<ExecutionResult>) {
    let mut results = Vec::new();
    let stats = runner.execute(|event: TestEvent<'_>| {
        if let pincheck_runner::reporter::TestEventKind::CaseFinished { result } = event.kind {
            results.push(result.clone());
        }
    });
    (stats, results)
}
