// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use pincheck_metadata::PincheckExitCode;
use pincheck_runner::errors::*;
use std::{error::Error, path::PathBuf};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that pincheck anticipates and reports with a dedicated exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: PathBuf },
    #[error("build directory not found")]
    BuildDirNotFound { build_dir: Utf8PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("case discovery failed")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("registry build error")]
    RegistryBuildError {
        #[from]
        err: RegistryBuildError,
    },
    #[error("rubric parse error")]
    RubricParseError {
        #[from]
        err: RubricParseError,
    },
    #[error("test runner build error")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("error writing event")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed { epochs_failed: usize, epochs: usize },
}

impl ExpectedError {
    pub(crate) fn write_output_error(err: std::io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::BuildDirNotFound { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::RubricParseError { .. }
            | Self::TestRunnerBuildError { .. } => PincheckExitCode::SETUP_ERROR,
            Self::DiscoveryError { .. } | Self::RegistryBuildError { .. } => {
                PincheckExitCode::BUILD_SYSTEM_FAILED
            }
            Self::WriteEventError { .. } | Self::WriteOutputError { .. } => {
                PincheckExitCode::WRITE_OUTPUT_ERROR
            }
            Self::TestRunFailed { .. } => PincheckExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::BuildDirNotFound { build_dir } => {
                error!(
                    "build directory `{}` does not exist\n{}",
                    build_dir.style(styles.bold),
                    "(hint: run pincheck from a Pintos `build` directory, or pass --build-dir)"
                        .style(styles.warning_text),
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse pincheck config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{}", err);
                err.source()
            }
            Self::DiscoveryError { err } => {
                error!("failed to list the cases of this build");
                Some(err as &dyn Error)
            }
            Self::RegistryBuildError { err } => {
                error!("failed to build the case registry");
                Some(err as &dyn Error)
            }
            Self::RubricParseError { err } => {
                error!("failed to read the grading rubrics");
                Some(err as &dyn Error)
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to build the test runner");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write run event");
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed {
                epochs_failed,
                epochs,
            } => {
                error!(
                    "test run failed: {} of {} epochs did not pass",
                    epochs_failed.style(styles.bold),
                    epochs.style(styles.bold),
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
