// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovered cases and the registry that holds them.
//!
//! The main structure in this module is [`CaseRegistry`].

mod cache;
mod case;
mod registry;

pub use cache::*;
pub use case::{CasePhase, DEFAULT_TIMEOUT, TestCase};
pub(crate) use case::{full_name, split_full_name};
pub use registry::*;
