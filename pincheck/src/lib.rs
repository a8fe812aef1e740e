// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A parallel test runner and grader for Pintos kernels.
//!
//! `pincheck` asks a Pintos build which cases it has, runs them through the build's makefiles
//! under a bounded pool, and reports the results alongside the point values from the build's
//! grading rubrics. The orchestration itself lives in
//! [pincheck-runner](https://crates.io/crates/pincheck-runner).

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
