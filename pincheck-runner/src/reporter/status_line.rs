// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PoolSnapshot, imp::Styles};
use crate::helpers::{text_width, truncate_ansi_aware};
use owo_colors::OwoColorize;
use swrite::{SWrite, swrite};

/// Appended to a status line that had to be cut short.
const OMIT_MARKER: &str = " ... ";

/// Columns kept free at the end of the status line.
const COL_JITTER: usize = 3;

/// Renders the live status line: a `Running(k/n) : ` prefix followed by the tag of every
/// occupied slot, with persistence cases highlighted.
///
/// If the line would not fit in `width` columns, the tags are cut and [`OMIT_MARKER`] is
/// appended. The result is never wider than `width`.
pub(crate) fn render_status_line(snapshot: &PoolSnapshot, width: usize, styles: &Styles) -> String {
    let prefix = format!(
        "Running({}/{}) : ",
        snapshot.running_count(),
        snapshot.pool_size
    );
    let prefix_width = text_width(&prefix);

    let mut slots = String::new();
    for slot in &snapshot.slots {
        let style = if slot.persistence {
            styles.persistence
        } else {
            styles.running
        };
        swrite!(slots, "{} ", slot.tag.style(style));

        if prefix_width + text_width(&slots) + COL_JITTER >= width {
            let keep = width.saturating_sub(prefix_width + COL_JITTER + OMIT_MARKER.len());
            slots = truncate_ansi_aware(&slots, keep);
            slots.push_str(OMIT_MARKER);
            break;
        }
    }

    let line = format!("{}{}", prefix.style(styles.running_prefix), slots);
    // Terminals narrower than the prefix itself still get a line that fits.
    if text_width(&line) > width {
        truncate_ansi_aware(&line, width)
    } else {
        line
    }
}
