// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoring documents and the annotations they attach to cases.
//!
//! A build names one grading file. Each meaningful grading line has the form `<pct>% <path>`,
//! where `<path>` is a rubric document relative to the source root. A rubric document starts with
//! a title line, followed by `<points> <name>` lines grouped under `- <subtitle>` markers. `#`
//! starts a comment in both kinds of document.
//!
//! Loading a [`RubricSet`] annotates every matching case in a
//! [`CaseRegistry`](crate::list::CaseRegistry) with its point value and subtitle.

use crate::{
    errors::RubricParseError,
    list::{CaseRegistry, TestCase, full_name},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use tracing::debug;

/// A single parsed rubric document.
#[derive(Clone, Debug, PartialEq)]
pub struct Rubric {
    path: Utf8PathBuf,
    group: String,
    suffix: Option<String>,
    title: String,
    max_percentage: f64,
    subtitles: IndexMap<String, Vec<String>>,
}

impl Rubric {
    /// Returns the path of this rubric, relative to the source root.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the subdirectory whose cases this rubric scores.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the extension of the rubric's file name, which tells rubrics for the same group
    /// apart.
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Returns the title line of the rubric.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the share of the total grade this rubric is worth, in percent.
    ///
    /// Percentages of different rubrics are independent of each other and need not sum to 100.
    pub fn max_percentage(&self) -> f64 {
        self.max_percentage
    }

    /// Returns the full names of the matched cases, grouped by subtitle in document order.
    ///
    /// Cases listed before the first subtitle marker are grouped under the empty string.
    pub fn subtitles(&self) -> &IndexMap<String, Vec<String>> {
        &self.subtitles
    }

    /// Returns the number of cases this rubric matched.
    pub fn case_count(&self) -> usize {
        self.subtitles.values().map(Vec::len).sum()
    }
}

/// Every rubric named by a grading file, in grading file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RubricSet {
    rubrics: Vec<Rubric>,
}

impl RubricSet {
    /// Reads `grading_file` and every rubric document it names, annotating matching cases in
    /// `registry`.
    ///
    /// Rubric paths are resolved against `source_root`. If `registry` is empty there is nothing
    /// to annotate, and nothing is read.
    pub fn load(
        grading_file: &Utf8Path,
        source_root: &Utf8Path,
        registry: &mut CaseRegistry,
    ) -> Result<Self, RubricParseError> {
        if registry.is_empty() {
            debug!("no cases selected, skipping grading file `{grading_file}`");
            return Ok(Self::default());
        }

        let contents = read_document(grading_file)?;
        let mut rubrics = Vec::new();
        for entry in parse_grading_file(grading_file, &contents)? {
            let path = source_root.join(&entry.rubric_path);
            let contents = read_document(&path)?;
            let rubric = parse_rubric(&path, entry, &contents, registry)?;
            debug!(
                "rubric `{}` ({}%) matched {} cases",
                rubric.path,
                rubric.max_percentage,
                rubric.case_count()
            );
            rubrics.push(rubric);
        }

        Ok(Self { rubrics })
    }

    /// Iterates over the rubrics in grading file order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Rubric> + '_ {
        self.rubrics.iter()
    }

    /// Returns the number of rubrics.
    pub fn len(&self) -> usize {
        self.rubrics.len()
    }

    /// Returns true if there are no rubrics.
    pub fn is_empty(&self) -> bool {
        self.rubrics.is_empty()
    }

    /// Iterates over the cases in `registry` that no rubric annotated.
    pub fn unscored<'a>(
        &self,
        registry: &'a CaseRegistry,
    ) -> impl Iterator<Item = &'a TestCase> + 'a {
        registry.iter().filter(|case| !case.is_annotated())
    }
}

impl<'a> IntoIterator for &'a RubricSet {
    type Item = &'a Rubric;
    type IntoIter = std::slice::Iter<'a, Rubric>;

    fn into_iter(self) -> Self::IntoIter {
        self.rubrics.iter()
    }
}

#[derive(Debug)]
struct GradingEntry {
    max_percentage: f64,
    rubric_path: Utf8PathBuf,
}

fn read_document(path: &Utf8Path) -> Result<String, RubricParseError> {
    std::fs::read_to_string(path).map_err(|error| RubricParseError::Read {
        path: path.to_owned(),
        error,
    })
}

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(before, _)| before).trim()
}

fn parse_grading_file(
    path: &Utf8Path,
    contents: &str,
) -> Result<Vec<GradingEntry>, RubricParseError> {
    let mut entries = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let tokens: Vec<_> = strip_comment(line).split_whitespace().collect();
        let [percentage, rubric_path] = tokens.as_slice() else {
            continue;
        };
        let Some(value) = percentage.strip_suffix('%') else {
            continue;
        };
        let max_percentage = value
            .parse()
            .map_err(|_| RubricParseError::InvalidPercentage {
                path: path.to_owned(),
                line_number: index + 1,
                value: value.to_owned(),
            })?;
        entries.push(GradingEntry {
            max_percentage,
            rubric_path: Utf8PathBuf::from(*rubric_path),
        });
    }
    Ok(entries)
}

fn parse_rubric(
    path: &Utf8Path,
    entry: GradingEntry,
    contents: &str,
    registry: &mut CaseRegistry,
) -> Result<Rubric, RubricParseError> {
    let group = entry
        .rubric_path
        .parent()
        .map_or_else(String::new, |parent| parent.as_str().to_owned());
    let suffix = entry
        .rubric_path
        .as_str()
        .rsplit_once('.')
        .map(|(_, suffix)| suffix.to_owned());

    let mut lines = contents
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, strip_comment(line)))
        .filter(|(_, line)| !line.is_empty());

    let Some((_, title)) = lines.next() else {
        return Err(RubricParseError::MissingTitle {
            path: path.to_owned(),
        });
    };

    let mut subtitles: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut current_subtitle = String::new();
    for (line_number, line) in lines {
        let Some((first, rest)) = line.split_once(char::is_whitespace) else {
            return Err(RubricParseError::MalformedLine {
                path: path.to_owned(),
                line_number,
                line: line.to_owned(),
            });
        };
        let rest = rest.trim();

        if first == "-" {
            current_subtitle = rest.to_owned();
            continue;
        }

        let points = first
            .parse()
            .map_err(|_| RubricParseError::InvalidPoints {
                path: path.to_owned(),
                line_number,
                value: first.to_owned(),
            })?;

        let full_name = full_name(&group, rest);
        let Some(case) = registry.get_mut(&full_name) else {
            continue;
        };
        if case.annotate(points, Some(current_subtitle.clone())) {
            subtitles
                .entry(current_subtitle.clone())
                .or_default()
                .push(full_name);
        }
    }

    Ok(Rubric {
        path: entry.rubric_path,
        group,
        suffix,
        title: title.to_owned(),
        max_percentage: entry.max_percentage,
        subtitles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::DEFAULT_TIMEOUT;
    use camino_tempfile::{Utf8TempDir, tempdir};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const GRADING: &str = indoc! {"
        # Percentage of the testing point total designated for each set of tests.

        20.0%\ttests/threads/Rubric.alarm
        40.0%\ttests/threads/Rubric.priority
        this line is ignored
        10\ttests/threads/Rubric.ignored
    "};

    const ALARM: &str = indoc! {"
        Functionality and robustness of alarm clock:
        4\talarm-single
        4\talarm-multiple
        1\talarm-zero    # not selected below
    "};

    const PRIORITY: &str = indoc! {"
        Functionality of priority scheduler:

        - Basic priority
        3\tpriority-change
        3\tpriority-preempt

        - Donation
        5\tpriority-donate-one
        2\talarm-single
    "};

    fn source_root(files: &[(&str, &str)]) -> Utf8TempDir {
        let dir = tempdir().expect("created temp dir");
        for (path, contents) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().expect("path has a parent"))
                .expect("created parent dir");
            std::fs::write(&path, contents).expect("wrote document");
        }
        dir
    }

    fn registry(names: &[&str]) -> CaseRegistry {
        CaseRegistry::from_cases(
            names
                .iter()
                .map(|name| TestCase::new("tests/threads", *name, DEFAULT_TIMEOUT, false)),
        )
    }

    #[test]
    fn annotates_matching_cases() {
        let root = source_root(&[
            ("tests/threads/Grading", GRADING),
            ("tests/threads/Rubric.alarm", ALARM),
            ("tests/threads/Rubric.priority", PRIORITY),
        ]);
        let mut registry = registry(&[
            "alarm-single",
            "alarm-multiple",
            "priority-change",
            "priority-donate-one",
            "mlfqs-load-1",
        ]);

        let rubrics = RubricSet::load(
            &root.path().join("tests/threads/Grading"),
            root.path(),
            &mut registry,
        )
        .expect("rubrics loaded");

        assert_eq!(rubrics.len(), 2);
        let alarm = rubrics.iter().next().expect("alarm rubric");
        assert_eq!(alarm.group(), "tests/threads");
        assert_eq!(alarm.suffix(), Some("alarm"));
        assert_eq!(alarm.title(), "Functionality and robustness of alarm clock:");
        assert_eq!(alarm.max_percentage(), 20.0);
        assert_eq!(
            alarm.subtitles().get(""),
            Some(&vec![
                "tests/threads/alarm-single".to_owned(),
                "tests/threads/alarm-multiple".to_owned(),
            ])
        );

        let priority = rubrics.iter().nth(1).expect("priority rubric");
        assert_eq!(
            priority.subtitles().keys().collect::<Vec<_>>(),
            ["Basic priority", "Donation"]
        );
        assert_eq!(
            priority.subtitles()["Donation"],
            ["tests/threads/priority-donate-one"],
            "alarm-single keeps its first annotation"
        );

        let case = |name: &str| {
            registry
                .get(&format!("tests/threads/{name}"))
                .expect("case present")
        };
        assert_eq!(case("alarm-single").max_points(), 4);
        assert_eq!(case("alarm-single").subtitle(), None);
        assert_eq!(case("priority-change").max_points(), 3);
        assert_eq!(case("priority-change").subtitle(), Some("Basic priority"));
        assert_eq!(case("priority-donate-one").subtitle(), Some("Donation"));

        let unscored: Vec<_> = rubrics
            .unscored(&registry)
            .map(TestCase::full_name)
            .collect();
        assert_eq!(unscored, ["tests/threads/mlfqs-load-1"]);
        assert_eq!(case("mlfqs-load-1").max_points(), 0);
    }

    #[test]
    fn empty_registry_reads_nothing() {
        let root = tempdir().expect("created temp dir");
        let mut registry = CaseRegistry::default();
        let rubrics = RubricSet::load(
            &root.path().join("does/not/exist"),
            root.path(),
            &mut registry,
        )
        .expect("nothing to read");
        assert!(rubrics.is_empty());
    }

    #[test]
    fn missing_documents_are_fatal() {
        let root = source_root(&[("tests/threads/Grading", GRADING)]);
        let error = RubricSet::load(
            &root.path().join("tests/threads/Grading"),
            root.path(),
            &mut registry(&["alarm-single"]),
        )
        .expect_err("rubric documents are missing");
        match error {
            RubricParseError::Read { path, .. } => {
                assert_eq!(path, root.path().join("tests/threads/Rubric.alarm"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_documents_are_fatal() {
        let bad_percentage = source_root(&[("Grading", "twenty% tests/threads/Rubric.alarm\n")]);
        let error = RubricSet::load(
            &bad_percentage.path().join("Grading"),
            bad_percentage.path(),
            &mut registry(&["alarm-single"]),
        )
        .expect_err("percentage is not a number");
        assert_eq!(
            error.to_string(),
            format!(
                "{}:1: invalid percentage `twenty`",
                bad_percentage.path().join("Grading")
            )
        );

        let cases = [
            ("# only a comment\n", "is missing a title line"),
            ("Title\n- Subtitle\nfour alarm-single\n", ":3: invalid point value `four`"),
            ("Title\n4\n", ":2: expected `<points> <name>` or `- <subtitle>`, found `4`"),
        ];
        for (rubric, expected) in cases {
            let root = source_root(&[
                ("Grading", "100% tests/threads/Rubric.alarm\n"),
                ("tests/threads/Rubric.alarm", rubric),
            ]);
            let error = RubricSet::load(
                &root.path().join("Grading"),
                root.path(),
                &mut registry(&["alarm-single"]),
            )
            .expect_err("rubric is malformed");
            let message = error.to_string();
            assert!(
                message.ends_with(expected),
                "`{message}` ends with `{expected}`"
            );
        }
    }
}
