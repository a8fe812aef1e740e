// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::CacheFlushError;
use camino::Utf8Path;
use std::{collections::BTreeMap, io, io::Write, time::Duration};
use swrite::{SWrite, swriteln};
use tracing::{debug, warn};

/// Run metadata derived for a single case.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CaseMetadata {
    /// The time budget for one phase of the case.
    pub timeout: Duration,

    /// Whether the case has a post-restart persistence phase.
    pub persistence: bool,
}

/// Run metadata remembered across invocations, keyed by full case name.
///
/// Deriving metadata means asking the build system how it would run a case, which is slow. The
/// cache is read before the registry is built, updated with every freshly derived entry, and
/// written back out in full afterwards.
///
/// On disk, each line is `full_name persistence timeout`, with `persistence` written as `0` or
/// `1` and `timeout` in whole seconds.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MetadataCache {
    entries: BTreeMap<String, CaseMetadata>,
}

impl MetadataCache {
    /// The default file name of the cache, relative to the build directory.
    pub const FILE_NAME: &'static str = "cache.pincheck";

    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the cache from `path`.
    ///
    /// A missing or unreadable cache is not an error: it only means every case will be probed
    /// again.
    pub fn load(path: &Utf8Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("no metadata cache at `{path}`, starting fresh");
                Self::new()
            }
            Err(error) => {
                warn!("ignoring unreadable metadata cache at `{path}`: {error}");
                Self::new()
            }
        }
    }

    /// Parses cache contents. Malformed lines are skipped.
    pub fn parse(contents: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in contents.lines() {
            let tokens: Vec<_> = line.split_whitespace().collect();
            let [full_name, persistence, timeout] = tokens.as_slice() else {
                continue;
            };
            let (Ok(persistence), Ok(timeout)) = (persistence.parse::<i64>(), timeout.parse())
            else {
                debug!("skipping malformed metadata cache line: {line}");
                continue;
            };
            entries.insert(
                (*full_name).to_owned(),
                CaseMetadata {
                    timeout: Duration::from_secs(timeout),
                    persistence: persistence != 0,
                },
            );
        }
        Self { entries }
    }

    /// Returns the cached metadata for `full_name`.
    pub fn get(&self, full_name: &str) -> Option<CaseMetadata> {
        self.entries.get(full_name).copied()
    }

    /// Records freshly derived metadata for `full_name`, replacing any previous entry.
    pub fn insert(&mut self, full_name: impl Into<String>, metadata: CaseMetadata) {
        self.entries.insert(full_name.into(), metadata);
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the cache in its on-disk format.
    pub fn to_file_contents(&self) -> String {
        let mut out = String::new();
        for (full_name, metadata) in &self.entries {
            swriteln!(
                out,
                "{} {} {}",
                full_name,
                u8::from(metadata.persistence),
                metadata.timeout.as_secs()
            );
        }
        out
    }

    /// Atomically rewrites the cache at `path`.
    pub fn flush(&self, path: &Utf8Path) -> Result<(), CacheFlushError> {
        let contents = self.to_file_contents();
        atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(contents.as_bytes()))
            .map_err(|error| CacheFlushError::new(path, error))?;
        debug!("wrote {} metadata cache entries to `{path}`", self.entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_skips_malformed_lines() {
        let cache = MetadataCache::parse(indoc! {"
            tests/threads/alarm-single 0 60
            tests/filesys/extended/grow-seq-lg 1 300
            tests/vm/pt-grow-stack 0
            tests/vm/page-linear 0 sixty
            tests/vm/page-merge-seq x 60

            tests/userprog/args-none 0 60 extra
        "});

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get("tests/threads/alarm-single"),
            Some(CaseMetadata {
                timeout: Duration::from_secs(60),
                persistence: false,
            })
        );
        assert_eq!(
            cache.get("tests/filesys/extended/grow-seq-lg"),
            Some(CaseMetadata {
                timeout: Duration::from_secs(300),
                persistence: true,
            })
        );
        assert_eq!(cache.get("tests/vm/pt-grow-stack"), None);
    }

    #[test]
    fn flush_then_load() {
        let dir = tempdir().expect("created temp dir");
        let path = dir.path().join(MetadataCache::FILE_NAME);

        assert!(MetadataCache::load(&path).is_empty(), "missing cache is empty");

        let mut cache = MetadataCache::new();
        cache.insert(
            "tests/vm/pt-grow-stack",
            CaseMetadata {
                timeout: Duration::from_secs(120),
                persistence: false,
            },
        );
        cache.insert(
            "tests/filesys/extended/dir-mk-tree",
            CaseMetadata {
                timeout: Duration::from_secs(60),
                persistence: true,
            },
        );
        cache.flush(&path).expect("flushed cache");

        let contents = std::fs::read_to_string(&path).expect("read cache file");
        assert_eq!(
            contents,
            indoc! {"
                tests/filesys/extended/dir-mk-tree 1 60
                tests/vm/pt-grow-stack 0 120
            "}
        );
        assert_eq!(MetadataCache::load(&path), cache);
    }
}
