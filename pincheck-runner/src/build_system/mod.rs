// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seams between pincheck and the build system that knows how to run cases.
//!
//! pincheck never compiles or boots the kernel itself. It asks a build system which cases exist
//! ([`CaseDiscovery`]), how each one is run ([`MetadataProbe`]), and to produce a result artifact
//! for a case ([`ResultMaterializer`]). [`MakeBuildSystem`] implements all three on top of the
//! Pintos makefiles.

mod make;

pub use make::*;

use crate::{
    errors::{DiscoveryError, ProbeError},
    list::CasePhase,
};
use camino::Utf8PathBuf;
use std::{future::Future, io, time::Duration};

/// Lists the cases a build knows about.
pub trait CaseDiscovery {
    /// Returns the raw case identifiers (`subdir/name`) in discovery order.
    ///
    /// Failure is fatal: without a case list there is nothing to run.
    fn discover_cases(&self) -> Result<Vec<String>, DiscoveryError>;

    /// Returns the grading file naming this build's rubrics, relative to the source root.
    fn grading_file(&self) -> Result<Utf8PathBuf, DiscoveryError>;
}

/// The outcome of probing a single case.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeOutcome {
    /// The case can be run directly with this time budget.
    Derived {
        /// The time budget the build system gives the case.
        timeout: Duration,
    },

    /// The case cannot be run on its own.
    NotApplicable,
}

/// Derives the run metadata of a single case.
pub trait MetadataProbe {
    /// Probes `full_name`. Probe failures are fatal.
    fn probe(&self, full_name: &str) -> Result<ProbeOutcome, ProbeError>;
}

/// The raw outcome of asking the build system to produce a result artifact.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MaterializeOutput {
    /// The exit code of the invocation, or `None` if it was terminated by a signal.
    pub exit_code: Option<i32>,

    /// Combined stdout and stderr of the invocation, or `None` if it could not be captured.
    pub output: Option<String>,
}

impl MaterializeOutput {
    /// Returns true if the invocation exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Produces result artifacts for cases.
///
/// Implementations are shared between the tasks backing concurrently running cases.
pub trait ResultMaterializer: Send + Sync + 'static {
    /// Triggers the pipeline that writes the artifact for `phase` of `full_name`.
    ///
    /// An `Err` means the invocation could not even be launched.
    fn materialize(
        &self,
        full_name: &str,
        phase: CasePhase,
    ) -> impl Future<Output = io::Result<MaterializeOutput>> + Send;

    /// Returns where the artifact for `phase` of `full_name` is written.
    fn artifact_path(&self, full_name: &str, phase: CasePhase) -> Utf8PathBuf;
}
