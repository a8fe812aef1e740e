// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out run events and rubric listings.
//!
//! The main structure in this module is [`TestReporter`].

mod events;
mod imp;
mod listing;
mod status_line;

pub use events::*;
pub use imp::*;
pub use listing::*;
pub(crate) use status_line::*;
