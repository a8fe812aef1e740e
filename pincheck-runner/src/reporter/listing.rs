// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::imp::Styles;
use crate::{helpers::plural, list::CaseRegistry, rubric::RubricSet};
use itertools::Itertools;
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Writes the selected cases grouped by rubric and subtitle, followed by the cases no rubric
/// mentions.
#[derive(Debug)]
pub struct RubricListing<'a> {
    rubrics: &'a RubricSet,
    registry: &'a CaseRegistry,
    styles: Box<Styles>,
}

impl<'a> RubricListing<'a> {
    /// Creates a new listing over an annotated registry.
    pub fn new(rubrics: &'a RubricSet, registry: &'a CaseRegistry) -> Self {
        Self {
            rubrics,
            registry,
            styles: Box::default(),
        }
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Writes the listing to `writer`.
    pub fn write(&self, mut writer: impl Write) -> io::Result<()> {
        for rubric in self.rubrics {
            if rubric.case_count() == 0 {
                continue;
            }

            let total = rubric
                .subtitles()
                .values()
                .flatten()
                .filter_map(|full_name| self.registry.get(full_name))
                .fold(0u64, |total, case| {
                    total.saturating_add(u64::from(case.max_points()))
                });
            writeln!(
                writer,
                "{} ({}%, {} {}) {}",
                rubric.title().style(self.styles.title),
                rubric.max_percentage(),
                total.style(self.styles.points),
                plural::points_str(total),
                rubric.path(),
            )?;

            for (subtitle, full_names) in rubric.subtitles() {
                let indent = if subtitle.is_empty() {
                    "    "
                } else {
                    writeln!(writer, "    - {}", subtitle.style(self.styles.subtitle))?;
                    "        "
                };
                for full_name in full_names {
                    let points = self
                        .registry
                        .get(full_name)
                        .map_or(0, |case| case.max_points());
                    writeln!(
                        writer,
                        "{indent}{:>3} {}",
                        points.style(self.styles.points),
                        full_name,
                    )?;
                }
            }
        }

        let unscored: Vec<_> = self.rubrics.unscored(self.registry).collect();
        if !unscored.is_empty() {
            writeln!(
                writer,
                "{} {}",
                "Unscored cases in".style(self.styles.title),
                unscored
                    .iter()
                    .map(|case| case.subdir())
                    .unique()
                    .join(", ")
                    .style(self.styles.title),
            )?;
            for case in unscored {
                writeln!(writer, "    {}", case.full_name())?;
            }
        }

        Ok(())
    }
}
