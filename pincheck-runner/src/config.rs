// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for pincheck.

use crate::errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound, TestThreadsParseError};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::HashMap, fmt, num::NonZeroUsize, str::FromStr, time::Duration};

/// Overall configuration for pincheck.
///
/// Most settings are managed through [profiles](PincheckProfile), obtained through the
/// [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct PincheckConfig {
    inner: PincheckConfigImpl,
}

impl PincheckConfig {
    /// The default location of the config within the source root: `.config/pincheck.toml`.
    pub const CONFIG_PATH: &'static str = ".config/pincheck.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/pincheck.toml` in
    /// the source root.
    ///
    /// If no config file is specified and the source root doesn't have `.config/pincheck.toml`,
    /// uses the default config options.
    pub fn from_sources(
        source_root: impl AsRef<Utf8Path>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = source_root.as_ref().join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;
        Ok(Self { inner })
    }

    /// Returns the profile with the given name, or an error if it is not known.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<PincheckProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = self.inner.profiles.get(name)?;
        Ok(PincheckProfile {
            name: name.to_owned(),
            default_profile: &self.inner.profiles.default,
            custom_profile,
        })
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<PincheckConfigImpl, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        serde_path_to_error::deserialize(config)
            .map_err(|error| ConfigParseErrorKind::DeserializeError(Box::new(error)))
    }
}

/// A configuration profile for pincheck.
///
/// Returned by [`PincheckConfig::profile`].
#[derive(Clone, Debug)]
pub struct PincheckProfile<'cfg> {
    name: String,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl<'cfg> PincheckProfile<'cfg> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of cases to run at the same time.
    pub fn jobs(&self) -> TestThreads {
        self.custom_profile
            .and_then(|profile| profile.jobs)
            .unwrap_or(self.default_profile.jobs)
    }

    /// Returns the number of epochs to run.
    pub fn repeat(&self) -> usize {
        self.custom_profile
            .and_then(|profile| profile.repeat)
            .unwrap_or(self.default_profile.repeat)
            .get()
    }

    /// Returns true if the backlog is sorted by decreasing timeout before each epoch.
    pub fn sort_by_timeout(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.sort_by_timeout)
            .unwrap_or(self.default_profile.sort_by_timeout)
    }

    /// Returns the timeout assumed when the build system does not state one.
    pub fn default_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.default_timeout)
            .unwrap_or(self.default_profile.default_timeout)
    }

    /// Returns the scheduler polling interval.
    pub fn tick_interval(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.tick_interval)
            .unwrap_or(self.default_profile.tick_interval)
    }

    /// Returns the metadata cache path, relative to the build directory.
    pub fn cache_file(&self) -> &'cfg Utf8Path {
        self.custom_profile
            .and_then(|profile| profile.cache_file.as_deref())
            .unwrap_or(&self.default_profile.cache_file)
    }

    /// Returns whether the live status line is drawn.
    pub fn show_progress(&self) -> ShowProgress {
        self.custom_profile
            .and_then(|profile| profile.show_progress)
            .unwrap_or(self.default_profile.show_progress)
    }
}

/// Type for the jobs config key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// Run this many cases at once.
    Count(usize),

    /// Run as many cases at once as there are logical CPUs.
    NumCpus,
}

impl TestThreads {
    /// Gets the actual pool size computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }
        match s.parse::<usize>() {
            Ok(threads) if threads > 0 => Ok(Self::Count(threads)),
            _ => Err(TestThreadsParseError::new(s)),
        }
    }
}

impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = TestThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a positive integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(TestThreads::NumCpus)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match usize::try_from(v) {
                    Ok(threads) if threads > 0 => Ok(TestThreads::Count(threads)),
                    _ => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

/// Type for the show-progress config key.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ShowProgress {
    /// Draw the status line only if standard error is a terminal.
    #[default]
    Auto,

    /// Always draw the status line.
    Line,

    /// Never draw the status line.
    None,
}

impl ShowProgress {
    /// Resolves `Auto` against whether standard error is a terminal.
    pub fn should_draw(self, is_terminal: bool) -> bool {
        match self {
            Self::Auto => is_terminal,
            Self::Line => true,
            Self::None => false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PincheckConfigImpl {
    #[serde(rename = "profile")]
    profiles: PincheckProfilesImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PincheckProfilesImpl {
    default: DefaultProfileImpl,
    #[serde(flatten)]
    other: HashMap<String, CustomProfileImpl>,
}

impl PincheckProfilesImpl {
    fn get(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            PincheckConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(PincheckConfig::DEFAULT_PROFILE))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultProfileImpl {
    jobs: TestThreads,
    repeat: NonZeroUsize,
    sort_by_timeout: bool,
    #[serde(with = "humantime_serde")]
    default_timeout: Duration,
    #[serde(with = "humantime_serde")]
    tick_interval: Duration,
    cache_file: Utf8PathBuf,
    show_progress: ShowProgress,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    jobs: Option<TestThreads>,
    #[serde(default)]
    repeat: Option<NonZeroUsize>,
    #[serde(default)]
    sort_by_timeout: Option<bool>,
    #[serde(default, with = "humantime_serde::option")]
    default_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    tick_interval: Option<Duration>,
    #[serde(default)]
    cache_file: Option<Utf8PathBuf>,
    #[serde(default)]
    show_progress: Option<ShowProgress>,
}
