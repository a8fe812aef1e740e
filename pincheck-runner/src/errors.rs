// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by pincheck.
//!
//! Only configuration-class failures are represented here. A case that fails, or whose result
//! cannot be materialized, is recorded as a failed
//! [`ExecutionResult`](crate::runner::ExecutionResult) instead.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse pincheck config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`] that occurred.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error which indicates that a profile was requested but not known to pincheck.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// Error returned while parsing a [`TestThreads`](crate::config::TestThreads) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for jobs: {input}\n(hint: expected a positive integer or \"num-cpus\")")]
pub struct TestThreadsParseError {
    input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while asking the build system which cases exist.
///
/// Without a case list there is nothing to schedule, so this is always fatal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The helper makefile used to query the build could not be written.
    #[error("failed to write helper makefile `{path}`")]
    WriteHelper {
        /// The path that could not be written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The discovery command could not be executed.
    #[error("failed to execute `{command}`")]
    Exec {
        /// The command that was run.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The discovery command exited unsuccessfully.
    #[error("`{command}` {}", DisplayExitCode::from(.exit_code))]
    CommandFailed {
        /// The command that was run.
        command: String,

        /// The exit code, or `None` if the process was terminated by a signal.
        exit_code: Option<i32>,

        /// Combined stdout and stderr of the command.
        output: String,
    },

    /// The build did not name a grading file.
    #[error("`{command}` did not name a grading file")]
    NoGradingFile {
        /// The command that was run.
        command: String,
    },
}

/// An error that occurred while deriving the run metadata of a single case.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// The probe command could not be executed.
    #[error("failed to execute `{command}` to probe `{full_name}`")]
    Exec {
        /// The case being probed.
        full_name: String,

        /// The command that was run.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The probe command exited unsuccessfully.
    #[error(
        "cannot find out the command line to run `{full_name}`: `{command}` {}",
        DisplayExitCode::from(.exit_code)
    )]
    CommandFailed {
        /// The case being probed.
        full_name: String,

        /// The command that was run.
        command: String,

        /// The exit code, or `None` if the process was terminated by a signal.
        exit_code: Option<i32>,

        /// Combined stdout and stderr of the command.
        output: String,
    },
}

/// An error that occurred while building a [`CaseRegistry`](crate::list::CaseRegistry).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryBuildError {
    /// Probing a case failed.
    #[error("error deriving case metadata")]
    Probe(#[from] ProbeError),
}

/// An error that occurred while writing the metadata cache back to disk.
#[derive(Debug, Error)]
#[error("failed to write metadata cache to `{path}`")]
pub struct CacheFlushError {
    path: Utf8PathBuf,
    #[source]
    error: atomicwrites::Error<io::Error>,
}

impl CacheFlushError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: atomicwrites::Error<io::Error>) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while reading scoring documents.
///
/// Scoring data is all-or-nothing: any of these aborts the run before scheduling begins.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RubricParseError {
    /// A grading file or rubric document could not be read.
    #[error("failed to read scoring document `{path}`")]
    Read {
        /// The path that could not be read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A grading file line had a percentage that is not a number.
    #[error("{path}:{line_number}: invalid percentage `{value}`")]
    InvalidPercentage {
        /// The grading file.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// The text before the `%`.
        value: String,
    },

    /// A rubric document had no title line.
    #[error("rubric `{path}` is missing a title line")]
    MissingTitle {
        /// The rubric document.
        path: Utf8PathBuf,
    },

    /// A rubric line was neither a subtitle marker nor a `points name` pair.
    #[error("{path}:{line_number}: expected `<points> <name>` or `- <subtitle>`, found `{line}`")]
    MalformedLine {
        /// The rubric document.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// The offending line, with comments stripped.
        line: String,
    },

    /// A rubric line had a point value that is not a non-negative integer.
    #[error("{path}:{line_number}: invalid point value `{value}`")]
    InvalidPoints {
        /// The rubric document.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// The offending value.
        value: String,
    },
}

/// An error that occurred while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),
}

/// An error returned when an [`ExecutionUnit`](crate::runner::ExecutionUnit) is started twice.
#[derive(Clone, Debug, Error)]
#[error("execution unit for `{full_name}` was already started")]
pub struct UnitStartError {
    full_name: String,
}

impl UnitStartError {
    pub(crate) fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }
}

/// An error that occurred while writing a run event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] io::Error),
}

struct DisplayExitCode(Option<i32>);

impl From<&Option<i32>> for DisplayExitCode {
    fn from(exit_code: &Option<i32>) -> Self {
        Self(*exit_code)
    }
}

impl fmt::Display for DisplayExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exited with code {code}"),
            None => write!(f, "was terminated by a signal"),
        }
    }
}
