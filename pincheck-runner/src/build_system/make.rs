// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CaseDiscovery, MaterializeOutput, MetadataProbe, ProbeOutcome, ResultMaterializer};
use crate::{
    errors::{DiscoveryError, ProbeError},
    list::{CasePhase, DEFAULT_TIMEOUT},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{ffi::OsString, future::Future, io, time::Duration};
use tracing::debug;

/// Flags that keep make from rebuilding the disk image while it is asked about a case.
const KEEP_DISK_FLAGS: [&str; 2] = ["--assume-old=os.dsk", "--what-if=os.dsk"];

/// The helper makefile that exposes the case list and grading file of a Pintos build.
const HELPER_MAKEFILE_CONTENTS: &str = "\
# -*- makefile -*-

SRCDIR = ../..

.PHONY: tests grade_file

tests:
\t@echo $(TESTS) $(EXTRA_GRADES) $(foreach subdir,$(TEST_SUBDIRS),$($(subdir)_GRADES))

grade_file:
\t@echo $(GRADING_FILE)

include ../../Make.config
include ../Make.vars
include ../../tests/Make.tests
";

/// A build system driven by the Pintos makefiles in a project's `build` directory.
#[derive(Clone, Debug)]
pub struct MakeBuildSystem {
    build_dir: Utf8PathBuf,
    default_timeout: Duration,
}

impl MakeBuildSystem {
    /// The name of the helper makefile written into the build directory.
    pub const HELPER_MAKEFILE: &'static str = "Make.pincheck";

    /// Creates a build system rooted at `build_dir`.
    pub fn new(build_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the timeout used when a case's run command does not state one.
    pub fn set_default_timeout(&mut self, default_timeout: Duration) -> &mut Self {
        self.default_timeout = default_timeout;
        self
    }

    /// Returns the build directory.
    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    /// Returns the source root, two levels above the build directory.
    ///
    /// Paths named by the grading file are relative to this directory.
    pub fn source_root(&self) -> Utf8PathBuf {
        self.build_dir
            .parent()
            .and_then(Utf8Path::parent)
            .filter(|root| !root.as_str().is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.build_dir.join("../.."))
    }

    fn write_helper(&self) -> Result<(), DiscoveryError> {
        let path = self.build_dir.join(Self::HELPER_MAKEFILE);
        std::fs::write(&path, HELPER_MAKEFILE_CONTENTS)
            .map_err(|error| DiscoveryError::WriteHelper { path, error })
    }

    fn run_helper_target(&self, target: &str) -> Result<String, DiscoveryError> {
        self.write_helper()?;

        let args = [target, "--silent", "-f", Self::HELPER_MAKEFILE];
        let command = display_command(&args);
        debug!("running `{command}` in `{}`", self.build_dir);

        let (exit_code, output) = self
            .run_make(&args)
            .map_err(|error| DiscoveryError::Exec {
                command: command.clone(),
                error,
            })?;
        if exit_code != Some(0) {
            return Err(DiscoveryError::CommandFailed {
                command,
                exit_code,
                output,
            });
        }
        Ok(output)
    }

    /// Runs make synchronously, returning its exit code and combined output.
    fn run_make(&self, args: &[&str]) -> io::Result<(Option<i32>, String)> {
        run_combined("make", args.iter().copied(), &self.build_dir)
    }
}

/// Runs `program` in `dir` with stdin closed, returning its exit code and its output with
/// standard error merged into standard output in the order they were written.
fn run_combined<I, S>(program: &str, args: I, dir: &Utf8Path) -> io::Result<(Option<i32>, String)>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let output = duct::cmd(program, args)
        .dir(dir.as_std_path())
        .stdin_null()
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .run()?;
    Ok((
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

impl CaseDiscovery for MakeBuildSystem {
    fn discover_cases(&self) -> Result<Vec<String>, DiscoveryError> {
        let output = self.run_helper_target("tests")?;
        Ok(output.split_whitespace().map(ToOwned::to_owned).collect())
    }

    fn grading_file(&self) -> Result<Utf8PathBuf, DiscoveryError> {
        let output = self.run_helper_target("grade_file")?;
        let grading_file = output.trim();
        if grading_file.is_empty() {
            return Err(DiscoveryError::NoGradingFile {
                command: display_command(&["grade_file", "--silent", "-f", Self::HELPER_MAKEFILE]),
            });
        }
        Ok(Utf8PathBuf::from(grading_file))
    }
}

impl MetadataProbe for MakeBuildSystem {
    fn probe(&self, full_name: &str) -> Result<ProbeOutcome, ProbeError> {
        let target = format!("{full_name}.output");
        let args = [
            target.as_str(),
            "--dry-run",
            "--silent",
            KEEP_DISK_FLAGS[0],
            KEEP_DISK_FLAGS[1],
        ];
        let command = display_command(&args);

        let (exit_code, output) = self.run_make(&args).map_err(|error| ProbeError::Exec {
            full_name: full_name.to_owned(),
            command: command.clone(),
            error,
        })?;
        if exit_code != Some(0) {
            return Err(ProbeError::CommandFailed {
                full_name: full_name.to_owned(),
                command,
                exit_code,
                output,
            });
        }

        let outcome = classify_dry_run(&output, self.default_timeout);
        debug!("probed `{full_name}`: {outcome:?}");
        Ok(outcome)
    }
}

impl ResultMaterializer for MakeBuildSystem {
    fn materialize(
        &self,
        full_name: &str,
        phase: CasePhase,
    ) -> impl Future<Output = io::Result<MaterializeOutput>> + Send {
        let artifact = phase.artifact_name(full_name);
        let build_dir = self.build_dir.clone();

        async move {
            let (exit_code, output) = tokio::task::spawn_blocking(move || {
                let args = [artifact.as_str(), "--silent", KEEP_DISK_FLAGS[0], KEEP_DISK_FLAGS[1]];
                run_combined("make", args, &build_dir)
            })
            .await
            .map_err(io::Error::other)??;

            Ok(MaterializeOutput {
                exit_code,
                output: Some(output),
            })
        }
    }

    fn artifact_path(&self, full_name: &str, phase: CasePhase) -> Utf8PathBuf {
        self.build_dir.join(phase.artifact_name(full_name))
    }
}

/// Interprets the output of a dry run of a case's `.output` target.
///
/// A case whose run expands to three or more commands (for example, one that has to set up and
/// tear down scratch disks around the run) is not applicable on its own.
fn classify_dry_run(output: &str, default_timeout: Duration) -> ProbeOutcome {
    let command = output.trim();
    if command.matches('\n').count() >= 2 {
        return ProbeOutcome::NotApplicable;
    }
    ProbeOutcome::Derived {
        timeout: parse_timeout(command).unwrap_or(default_timeout),
    }
}

/// Extracts the value following `-T` in a pintos command line, in seconds.
fn parse_timeout(command: &str) -> Option<Duration> {
    let tokens = shell_words::split(command)
        .unwrap_or_else(|_| command.split_whitespace().map(ToOwned::to_owned).collect());
    let position = tokens.iter().position(|token| token == "-T")?;
    let secs = tokens.get(position + 1)?.parse().ok()?;
    Some(Duration::from_secs(secs))
}

fn display_command(args: &[&str]) -> String {
    shell_words::join(std::iter::once("make").chain(args.iter().copied()))
}
