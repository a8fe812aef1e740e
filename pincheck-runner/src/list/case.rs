// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, time::Duration};
use tracing::warn;

/// The timeout given to a case when nothing more specific is known.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A single discovered case: a subdirectory (group) plus a leaf name.
///
/// Cases are created by [`CaseRegistry`](super::CaseRegistry) and are immutable afterwards,
/// except for rubric annotation, which happens at most once.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCase {
    subdir: String,
    name: String,
    full_name: String,
    timeout: Duration,
    persistence: bool,
    subtitle: Option<String>,
    max_points: u32,
    annotated: bool,
}

impl TestCase {
    /// Creates a new case with no rubric annotation.
    pub fn new(
        subdir: impl Into<String>,
        name: impl Into<String>,
        timeout: Duration,
        persistence: bool,
    ) -> Self {
        let subdir = subdir.into();
        let name = name.into();
        let full_name = full_name(&subdir, &name);
        Self {
            subdir,
            name,
            full_name,
            timeout,
            persistence,
            subtitle: None,
            max_points: 0,
            annotated: false,
        }
    }

    /// Returns the subdirectory (group) this case belongs to.
    pub fn subdir(&self) -> &str {
        &self.subdir
    }

    /// Returns the leaf name of this case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `subdir/name`, the unique key of this case within a registry.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Returns the time budget for one phase of this case.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true if this case has a post-restart persistence phase.
    pub fn persistence(&self) -> bool {
        self.persistence
    }

    /// Returns the rubric subtitle this case is listed under, if any.
    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    /// Returns the rubric weight of this case. Unscored cases have zero points.
    pub fn max_points(&self) -> u32 {
        self.max_points
    }

    /// Returns true if a rubric has annotated this case.
    pub fn is_annotated(&self) -> bool {
        self.annotated
    }

    /// Returns the phases this case is made of, in execution order.
    pub fn phases(&self) -> &'static [CasePhase] {
        if self.persistence {
            &[CasePhase::Primary, CasePhase::Persistence]
        } else {
            &[CasePhase::Primary]
        }
    }

    /// Attaches rubric data. Returns false, leaving the case untouched, if it was already
    /// annotated.
    pub(crate) fn annotate(&mut self, max_points: u32, subtitle: Option<String>) -> bool {
        if self.is_annotated() {
            warn!(
                "`{}` is listed in more than one rubric entry, keeping the first",
                self.full_name
            );
            return false;
        }
        self.max_points = max_points;
        self.subtitle = subtitle.filter(|s| !s.is_empty());
        self.annotated = true;
        true
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Joins a subdirectory and a name into a full case name.
pub(crate) fn full_name(subdir: &str, name: &str) -> String {
    if subdir.is_empty() {
        name.to_owned()
    } else {
        format!("{subdir}/{name}")
    }
}

/// Splits a full case name at its last `/` into `(subdir, name)`.
pub(crate) fn split_full_name(full_name: &str) -> (&str, &str) {
    match full_name.rsplit_once('/') {
        Some((subdir, name)) => (subdir, name),
        None => ("", full_name),
    }
}

/// One of the checks a case performs.
///
/// Ordinary cases have only a primary phase. Persistence cases additionally re-check their
/// on-disk state after a simulated restart.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum CasePhase {
    /// The initial run.
    Primary,

    /// The post-restart durability check.
    Persistence,
}

impl CasePhase {
    /// Returns the name the build system knows this phase of `full_name` by.
    pub fn target_name(self, full_name: &str) -> String {
        match self {
            Self::Primary => full_name.to_owned(),
            Self::Persistence => format!("{full_name}-persistence"),
        }
    }

    /// Returns the file name of the result artifact for this phase of `full_name`.
    pub fn artifact_name(self, full_name: &str) -> String {
        format!("{}.result", self.target_name(full_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("tests/threads/alarm-single", "tests/threads", "alarm-single" ; "nested")]
    #[test_case("tests/userprog/no-vm/multi-oom", "tests/userprog/no-vm", "multi-oom" ; "deep")]
    #[test_case("standalone", "", "standalone" ; "no subdir")]
    fn split_and_join(full: &str, subdir: &str, name: &str) {
        assert_eq!(split_full_name(full), (subdir, name));
        assert_eq!(full_name(subdir, name), full);
    }

    #[test]
    fn artifact_names() {
        let full = "tests/filesys/extended/dir-mk-tree";
        assert_eq!(
            CasePhase::Primary.artifact_name(full),
            "tests/filesys/extended/dir-mk-tree.result"
        );
        assert_eq!(
            CasePhase::Persistence.artifact_name(full),
            "tests/filesys/extended/dir-mk-tree-persistence.result"
        );
    }

    #[test]
    fn annotation_happens_once() {
        let mut case = TestCase::new("tests/threads", "alarm-single", DEFAULT_TIMEOUT, false);
        assert!(!case.is_annotated());
        assert_eq!(case.phases(), &[CasePhase::Primary]);

        assert!(case.annotate(5, Some("Alarm clock".to_owned())));
        assert!(!case.annotate(7, Some("Other".to_owned())));
        assert_eq!(case.max_points(), 5);
        assert_eq!(case.subtitle(), Some("Alarm clock"));
    }

    #[test]
    fn persistence_case_has_two_phases() {
        let case = TestCase::new("tests/filesys/extended", "grow-two-files", DEFAULT_TIMEOUT, true);
        assert_eq!(case.phases(), &[CasePhase::Primary, CasePhase::Persistence]);
        assert_eq!(case.to_string(), "tests/filesys/extended/grow-two-files");
    }
}
