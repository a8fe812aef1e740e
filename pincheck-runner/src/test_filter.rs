// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering cases by subdirectory and name.
//!
//! Patterns are globs: `*` matches zero or more characters, `?` matches exactly one character,
//! and every other character matches itself. The main structure in this module is
//! [`CaseFilter`], created by a [`CaseFilterBuilder`].

/// Returns true if `target` matches the glob `pattern` in its entirety.
///
/// Runs in `O(target × pattern)` time and `O(pattern)` space, so pathological patterns such as
/// `a*a*a*a*b` never cause exponential blowup.
pub fn wildcard_match(target: &str, pattern: &str) -> bool {
    let target: Vec<char> = target.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // prev[j] is true if the target consumed so far matches pattern[..j].
    let mut prev = vec![false; pattern.len() + 1];
    let mut curr = vec![false; pattern.len() + 1];

    prev[0] = true;
    for j in 1..=pattern.len() {
        prev[j] = prev[j - 1] && pattern[j - 1] == '*';
    }

    for &ch in &target {
        curr[0] = false;
        for j in 1..=pattern.len() {
            curr[j] = match pattern[j - 1] {
                '*' => curr[j - 1] || prev[j],
                '?' => prev[j - 1],
                literal => prev[j - 1] && literal == ch,
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[pattern.len()]
}

/// Returns true if `target` matches at least one of `patterns`.
pub fn matches_any<S: AsRef<str>>(target: &str, patterns: &[S]) -> bool {
    patterns
        .iter()
        .any(|pattern| wildcard_match(target, pattern.as_ref()))
}

/// Builder for a [`CaseFilter`].
///
/// Include lists that are left empty match everything.
#[derive(Clone, Debug, Default)]
pub struct CaseFilterBuilder {
    names: Vec<String>,
    subdirs: Vec<String>,
    exclude_names: Vec<String>,
    exclude_subdirs: Vec<String>,
}

impl CaseFilterBuilder {
    /// Sets the patterns a case name must match at least one of.
    pub fn set_names(&mut self, names: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the patterns a case subdirectory must match at least one of.
    pub fn set_subdirs(
        &mut self,
        subdirs: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.subdirs = subdirs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the patterns that exclude a case by name.
    pub fn set_exclude_names(
        &mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.exclude_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the patterns that exclude a case by subdirectory.
    pub fn set_exclude_subdirs(
        &mut self,
        subdirs: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.exclude_subdirs = subdirs.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the filter.
    pub fn build(&self) -> CaseFilter {
        CaseFilter {
            names: or_match_all(&self.names),
            subdirs: or_match_all(&self.subdirs),
            exclude_names: self.exclude_names.clone(),
            exclude_subdirs: self.exclude_subdirs.clone(),
        }
    }
}

fn or_match_all(patterns: &[String]) -> Vec<String> {
    if patterns.is_empty() {
        vec!["*".to_owned()]
    } else {
        patterns.to_vec()
    }
}

/// Include and exclude patterns applied to every discovered case.
#[derive(Clone, Debug)]
pub struct CaseFilter {
    names: Vec<String>,
    subdirs: Vec<String>,
    exclude_names: Vec<String>,
    exclude_subdirs: Vec<String>,
}

impl CaseFilter {
    /// Returns a filter that accepts every case.
    pub fn any() -> Self {
        CaseFilterBuilder::default().build()
    }

    /// Returns true if a case with this subdirectory and name should be run.
    pub fn matches(&self, subdir: &str, name: &str) -> bool {
        matches_any(subdir, &self.subdirs)
            && matches_any(name, &self.names)
            && !matches_any(subdir, &self.exclude_subdirs)
            && !matches_any(name, &self.exclude_names)
    }
}
