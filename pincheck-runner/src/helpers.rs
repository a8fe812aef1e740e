// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for pincheck-runner.

use console::AnsiCodeIterator;
use std::{fmt, time::Duration};
use unicode_width::UnicodeWidthChar;

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "case" if `count` is 1, otherwise "cases".
    pub(crate) fn cases_str(count: usize) -> &'static str {
        if count == 1 { "case" } else { "cases" }
    }

    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "epoch" if `count` is 1, otherwise "epochs".
    pub(crate) fn epochs_str(count: usize) -> &'static str {
        if count == 1 { "epoch" } else { "epochs" }
    }

    /// Returns "point" if `count` is 1, otherwise "points".
    pub(crate) fn points_str(count: u64) -> &'static str {
        if count == 1 { "point" } else { "points" }
    }
}

/// The display width of `text`, ignoring ANSI escape codes.
pub(crate) fn text_width(text: &str) -> usize {
    // The width of a string may not be the sum of the widths of its characters, but truncation
    // is only manageable per character, so both functions here use the sum.
    strip_ansi_escapes::strip_str(text)
        .chars()
        .map(|c| c.width().unwrap_or(0))
        .sum()
}

/// Keeps the first `width` columns of `text`, along with every ANSI escape code in it.
pub(crate) fn truncate_ansi_aware(text: &str, width: usize) -> String {
    let mut pos = 0;
    let mut res = String::new();
    for (s, is_ansi) in AnsiCodeIterator::new(text) {
        if is_ansi {
            // Escape codes past the cut are kept so styles are still reset.
            res.push_str(s);
            continue;
        } else if pos >= width {
            continue;
        }

        for c in s.chars() {
            let c_width = c.width().unwrap_or(0);
            if pos + c_width > width {
                pos = width;
                break;
            }
            res.push(c);
            pos += c_width;
        }
    }

    res
}

#[derive(Debug)]
pub(crate) struct FormattedDuration(pub(crate) Duration);

impl fmt::Display for FormattedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration = self.0.as_secs_f64();
        if duration > 60.0 {
            write!(f, "{}m {:.2}s", duration as u32 / 60, duration % 60.0)
        } else {
            write!(f, "{duration:.2}s")
        }
    }
}
