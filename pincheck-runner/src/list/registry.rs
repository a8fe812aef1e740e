// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    CaseMetadata, MetadataCache, TestCase,
    case::{full_name, split_full_name},
};
use crate::{
    build_system::{MetadataProbe, ProbeOutcome},
    errors::RegistryBuildError,
    test_filter::CaseFilter,
};
use indexmap::IndexMap;
use std::{collections::HashSet, time::Duration};
use tracing::debug;

/// The catalog of cases selected for a run, in discovery order.
///
/// Full names are unique within a registry.
#[derive(Clone, Debug, Default)]
pub struct CaseRegistry {
    cases: IndexMap<String, TestCase>,
}

impl CaseRegistry {
    /// Builds a registry from the raw discovery list.
    ///
    /// Each entry is split into subdirectory and name and checked against `filter`. Cases found
    /// in `cache` reuse their cached metadata; every other case is probed and the result is
    /// recorded in `cache`. The caller is responsible for flushing the cache afterwards.
    ///
    /// A case the probe reports as not applicable is kept only if `<full_name>-persistence` also
    /// appears in `raw`, in which case it becomes a persistence case with `default_timeout`.
    pub fn build(
        raw: &[String],
        filter: &CaseFilter,
        probe: &impl MetadataProbe,
        cache: &mut MetadataCache,
        default_timeout: Duration,
    ) -> Result<Self, RegistryBuildError> {
        let all_names: HashSet<&str> = raw.iter().map(|name| name.trim()).collect();
        let mut cases = IndexMap::new();

        for entry in raw {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (subdir, name) = split_full_name(entry);
            if !filter.matches(subdir, name) {
                continue;
            }
            let full_name = full_name(subdir, name);
            if cases.contains_key(&full_name) {
                debug!("skipping duplicate case `{full_name}`");
                continue;
            }

            let metadata = match cache.get(&full_name) {
                Some(metadata) => {
                    debug!("cache hit for `{full_name}`");
                    metadata
                }
                None => {
                    let metadata = match probe.probe(&full_name)? {
                        ProbeOutcome::Derived { timeout } => CaseMetadata {
                            timeout,
                            persistence: false,
                        },
                        ProbeOutcome::NotApplicable => {
                            let companion = format!("{full_name}-persistence");
                            if !all_names.contains(companion.as_str()) {
                                debug!("`{full_name}` cannot be run on its own, skipping");
                                continue;
                            }
                            CaseMetadata {
                                timeout: default_timeout,
                                persistence: true,
                            }
                        }
                    };
                    cache.insert(full_name.clone(), metadata);
                    metadata
                }
            };

            let case = TestCase::new(subdir, name, metadata.timeout, metadata.persistence);
            cases.insert(full_name, case);
        }

        Ok(Self { cases })
    }

    /// Creates a registry from already-constructed cases. Later duplicates are dropped.
    pub fn from_cases(cases: impl IntoIterator<Item = TestCase>) -> Self {
        let mut map = IndexMap::new();
        for case in cases {
            map.entry(case.full_name().to_owned()).or_insert(case);
        }
        Self { cases: map }
    }

    /// Iterates over cases in registry order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TestCase> + '_ {
        self.cases.values()
    }

    /// Looks up a case by full name.
    pub fn get(&self, full_name: &str) -> Option<&TestCase> {
        self.cases.get(full_name)
    }

    pub(crate) fn get_mut(&mut self, full_name: &str) -> Option<&mut TestCase> {
        self.cases.get_mut(full_name)
    }

    /// Returns the number of cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if no cases were selected.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Returns the number of persistence cases.
    pub fn persistence_count(&self) -> usize {
        self.iter().filter(|case| case.persistence()).count()
    }

    /// Returns the number of results one full pass over this registry produces.
    ///
    /// Each persistence case contributes two results.
    pub fn expected_result_count(&self) -> usize {
        self.len() + self.persistence_count()
    }
}

impl<'a> IntoIterator for &'a CaseRegistry {
    type Item = &'a TestCase;
    type IntoIter = indexmap::map::Values<'a, String, TestCase>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::ProbeError, list::DEFAULT_TIMEOUT, test_filter::CaseFilterBuilder};
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::HashMap};

    #[derive(Default)]
    struct FakeProbe {
        outcomes: HashMap<&'static str, ProbeOutcome>,
        probed: RefCell<Vec<String>>,
    }

    impl FakeProbe {
        fn with(mut self, full_name: &'static str, outcome: ProbeOutcome) -> Self {
            self.outcomes.insert(full_name, outcome);
            self
        }
    }

    impl MetadataProbe for FakeProbe {
        fn probe(&self, full_name: &str) -> Result<ProbeOutcome, ProbeError> {
            self.probed.borrow_mut().push(full_name.to_owned());
            self.outcomes
                .get(full_name)
                .copied()
                .ok_or_else(|| ProbeError::CommandFailed {
                    full_name: full_name.to_owned(),
                    command: format!("make {full_name}.output --dry-run"),
                    exit_code: Some(2),
                    output: "No rule to make target".to_owned(),
                })
        }
    }

    fn secs(secs: u64) -> ProbeOutcome {
        ProbeOutcome::Derived {
            timeout: Duration::from_secs(secs),
        }
    }

    fn raw(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    fn names(registry: &CaseRegistry) -> Vec<&str> {
        registry.iter().map(TestCase::full_name).collect()
    }

    #[test]
    fn probes_and_caches() {
        let probe = FakeProbe::default()
            .with("tests/threads/alarm-single", secs(60))
            .with("tests/vm/pt-grow-stack", secs(120))
            .with("tests/filesys/extended/grow-seq-lg", ProbeOutcome::NotApplicable)
            .with("tests/filesys/extended/grow-seq-lg-persistence", ProbeOutcome::NotApplicable)
            .with("tests/userprog/no-vm/multi-oom", ProbeOutcome::NotApplicable);
        let mut cache = MetadataCache::new();

        let registry = CaseRegistry::build(
            &raw(&[
                "tests/threads/alarm-single",
                "tests/vm/pt-grow-stack",
                "tests/filesys/extended/grow-seq-lg",
                "tests/filesys/extended/grow-seq-lg-persistence",
                "tests/userprog/no-vm/multi-oom",
            ]),
            &CaseFilter::any(),
            &probe,
            &mut cache,
            DEFAULT_TIMEOUT,
        )
        .expect("registry built");

        assert_eq!(
            names(&registry),
            [
                "tests/threads/alarm-single",
                "tests/vm/pt-grow-stack",
                "tests/filesys/extended/grow-seq-lg",
            ]
        );
        let persistent = registry
            .get("tests/filesys/extended/grow-seq-lg")
            .expect("persistence case present");
        assert!(persistent.persistence());
        assert_eq!(persistent.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(
            registry
                .get("tests/vm/pt-grow-stack")
                .expect("case present")
                .timeout(),
            Duration::from_secs(120)
        );
        assert_eq!(registry.persistence_count(), 1);
        assert_eq!(registry.expected_result_count(), 4);

        // Excluded cases are not cached, included ones are.
        assert_eq!(cache.len(), 3);
        assert_eq!(
            cache.get("tests/filesys/extended/grow-seq-lg"),
            Some(CaseMetadata {
                timeout: DEFAULT_TIMEOUT,
                persistence: true,
            })
        );
        assert_eq!(cache.get("tests/userprog/no-vm/multi-oom"), None);
    }

    #[test]
    fn cache_hits_skip_the_probe() {
        let probe = FakeProbe::default().with("tests/threads/alarm-zero", secs(30));
        let mut cache = MetadataCache::parse("tests/threads/alarm-single 0 90\n");

        let registry = CaseRegistry::build(
            &raw(&["tests/threads/alarm-single", "tests/threads/alarm-zero"]),
            &CaseFilter::any(),
            &probe,
            &mut cache,
            DEFAULT_TIMEOUT,
        )
        .expect("registry built");

        assert_eq!(*probe.probed.borrow(), ["tests/threads/alarm-zero"]);
        assert_eq!(
            registry
                .get("tests/threads/alarm-single")
                .expect("case present")
                .timeout(),
            Duration::from_secs(90)
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn filtered_cases_are_never_probed() {
        let probe = FakeProbe::default().with("tests/threads/alarm-single", secs(60));
        let filter = CaseFilterBuilder::default()
            .set_subdirs(["tests/threads"])
            .set_exclude_names(["priority-*"])
            .build();
        let mut cache = MetadataCache::new();

        let registry = CaseRegistry::build(
            &raw(&[
                "tests/threads/alarm-single",
                "tests/threads/priority-donate-one",
                "tests/userprog/args-none",
                "tests/threads/alarm-single",
            ]),
            &filter,
            &probe,
            &mut cache,
            DEFAULT_TIMEOUT,
        )
        .expect("registry built");

        assert_eq!(names(&registry), ["tests/threads/alarm-single"]);
        assert_eq!(*probe.probed.borrow(), ["tests/threads/alarm-single"]);
    }

    #[test]
    fn probe_failure_is_fatal() {
        let probe = FakeProbe::default();
        let mut cache = MetadataCache::new();

        let error = CaseRegistry::build(
            &raw(&["tests/threads/alarm-single"]),
            &CaseFilter::any(),
            &probe,
            &mut cache,
            DEFAULT_TIMEOUT,
        )
        .expect_err("unknown case fails to probe");
        assert!(matches!(error, RegistryBuildError::Probe(_)));
    }

    #[test]
    fn from_cases_keeps_first_of_duplicates() {
        let registry = CaseRegistry::from_cases([
            TestCase::new("a", "short", Duration::from_secs(10), false),
            TestCase::new("a", "long", Duration::from_secs(300), false),
            TestCase::new("a", "mid", Duration::from_secs(60), true),
            TestCase::new("a", "short", Duration::from_secs(999), false),
        ]);
        assert_eq!(names(&registry), ["a/short", "a/long", "a/mid"]);
        assert_eq!(
            registry.get("a/short").map(TestCase::timeout),
            Some(Duration::from_secs(10))
        );
        assert_eq!(registry.expected_result_count(), 4);
    }
}
