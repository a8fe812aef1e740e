// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pool scheduler and the execution units it drives.
//!
//! The main structure in this module is [`TestRunner`]. Each epoch, it admits cases from the
//! backlog into a fixed number of slots, polls the [`ExecutionUnit`] in each slot on a fixed
//! tick, and reports every finished phase as an [`ExecutionResult`].
//!
//! At most one persistence case occupies the pool at any time. Persistence cases share on-disk
//! state that their restart phase must find untouched.

mod artifact;
mod imp;
mod result;
mod unit;

pub use imp::*;
pub use result::*;
pub use unit::*;

use smallvec::SmallVec;

/// The results of one unit: one per phase.
pub type PhaseResults = SmallVec<[ExecutionResult; 2]>;
