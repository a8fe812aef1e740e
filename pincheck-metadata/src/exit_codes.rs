// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `pincheck` failures.
///
/// `pincheck` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum PincheckExitCode {}

impl PincheckExitCode {
    /// No errors occurred and every epoch passed.
    pub const OK: i32 = 0;

    /// No cases were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// A user issue happened while setting up a pincheck invocation: a bad config file, an unknown
    /// profile, or a malformed scoring document.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more cases failed in at least one epoch.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The build system could not list cases or describe how to run one.
    pub const BUILD_SYSTEM_FAILED: i32 = 101;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
