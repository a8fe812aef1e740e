// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-level contract for `pincheck`.
//!
//! Tools that drive `pincheck` (graders, CI wrappers) can depend on this crate to interpret its
//! exit status without pulling in the runner itself.

#![warn(missing_docs)]

mod exit_codes;

pub use exit_codes::*;
