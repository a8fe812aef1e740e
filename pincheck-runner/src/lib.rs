// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [pincheck](https://crates.io/crates/pincheck): discovering the cases a
//! Pintos build exposes, running them under a bounded pool, and attaching rubric scores to them.
//!
//! The major pieces are:
//!
//! * [`list::CaseRegistry`]: the catalog of discovered cases.
//! * [`runner::TestRunner`]: the pool scheduler and epoch loop.
//! * [`rubric::RubricSet`]: scoring documents and the annotations they attach to cases.
//! * [`reporter::TestReporter`]: human-readable output for the events a run produces.
//!
//! The build system is reached only through the traits in [`build_system`], with
//! [`build_system::MakeBuildSystem`] as the make-driven implementation.

pub mod build_system;
pub mod config;
pub mod errors;
mod helpers;
pub mod list;
pub mod reporter;
pub mod rubric;
pub mod runner;
pub mod test_filter;
mod time;
