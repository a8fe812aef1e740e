// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    output::{NO_HEADING_TARGET, OutputContext, OutputOpts},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use pincheck_metadata::PincheckExitCode;
use pincheck_runner::{
    build_system::{CaseDiscovery, MakeBuildSystem},
    config::{PincheckConfig, PincheckProfile, ShowProgress, TestThreads},
    list::{CaseRegistry, MetadataCache},
    reporter::{ReporterStderr, RubricListing, TestReporterBuilder},
    rubric::RubricSet,
    runner::TestRunnerBuilder,
    test_filter::{CaseFilter, CaseFilterBuilder},
};
use std::{
    io::{BufWriter, Write},
    num::NonZeroUsize,
    sync::Arc,
};
use tracing::{info, warn};

/// A parallel test runner and grader for Pintos kernels.
///
/// Run this from a Pintos build directory (for example `src/threads/build`), or point
/// `--build-dir` at one.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct PincheckApp {
    #[clap(flatten)]
    common: CommonOpts,

    #[clap(subcommand)]
    command: Command,
}

impl PincheckApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.common.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::List { filter_opts } => {
                let base = BaseApp::new(output, self.common)?;
                base.exec_list(&filter_opts.build())
            }
            Command::Run(run_opts) => {
                let base = BaseApp::new(output, self.common)?;
                base.exec_run(&run_opts.filter_opts.build(), &run_opts.runner_opts)
            }
        }
    }
}

#[derive(Debug, Args)]
struct CommonOpts {
    /// Pintos build directory [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    build_dir: Option<Utf8PathBuf>,

    /// Config file [default: <source-root>/.config/pincheck.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Configuration profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        env = "PINCHECK_PROFILE",
        default_value = PincheckConfig::DEFAULT_PROFILE
    )]
    profile: String,

    #[clap(flatten)]
    output: OutputOpts,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the selected cases, grouped by rubric
    ///
    /// Cases are discovered and probed exactly as for `run`, but nothing is executed.
    List {
        #[clap(flatten)]
        filter_opts: FilterOpts,
    },

    /// Run the selected cases and report the results
    Run(RunOpts),
}

#[derive(Debug, Args)]
struct RunOpts {
    #[clap(flatten)]
    filter_opts: FilterOpts,

    #[clap(flatten)]
    runner_opts: RunnerOpts,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Filter options")]
struct FilterOpts {
    /// Only run cases whose name matches one of these patterns (`*` and `?` are wildcards)
    #[arg(value_name = "PATTERNS")]
    names: Vec<String>,

    /// Only run cases in subdirectories matching this pattern
    #[arg(long, short = 's', value_name = "PATTERN")]
    subdir: Vec<String>,

    /// Skip cases whose name matches this pattern
    #[arg(long, short = 'e', value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Skip cases in subdirectories matching this pattern
    #[arg(long, value_name = "PATTERN")]
    exclude_subdir: Vec<String>,
}

impl FilterOpts {
    fn build(&self) -> CaseFilter {
        CaseFilterBuilder::default()
            .set_names(self.names.iter().cloned())
            .set_subdirs(self.subdir.iter().cloned())
            .set_exclude_names(self.exclude.iter().cloned())
            .set_exclude_subdirs(self.exclude_subdir.iter().cloned())
            .build()
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of cases to run at once: a positive integer or "num-cpus"
    #[arg(long, short = 'j', value_name = "N", env = "PINCHECK_JOBS")]
    jobs: Option<TestThreads>,

    /// Number of times to run every case; each full pass is an epoch
    #[arg(long, short = 'r', value_name = "N")]
    repeat: Option<NonZeroUsize>,

    /// Start the cases with the longest timeouts first
    #[arg(long, short = 'S')]
    sort_by_timeout: bool,

    /// Whether to draw the live status line
    #[arg(long, value_enum, value_name = "WHEN")]
    show_progress: Option<ShowProgressOpt>,
}

impl RunnerOpts {
    fn to_builder(&self) -> TestRunnerBuilder {
        let mut builder = TestRunnerBuilder::default();
        if let Some(jobs) = self.jobs {
            builder.set_test_threads(jobs);
        }
        if let Some(repeat) = self.repeat {
            builder.set_repeat(repeat.get());
        }
        if self.sort_by_timeout {
            builder.set_sort_by_timeout(true);
        }
        builder
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ShowProgressOpt {
    Auto,
    Line,
    None,
}

impl From<ShowProgressOpt> for ShowProgress {
    fn from(opt: ShowProgressOpt) -> Self {
        match opt {
            ShowProgressOpt::Auto => ShowProgress::Auto,
            ShowProgressOpt::Line => ShowProgress::Line,
            ShowProgressOpt::None => ShowProgress::None,
        }
    }
}

/// State shared by every command: the build system and the loaded configuration.
#[derive(Debug)]
struct BaseApp {
    output: OutputContext,
    build_system: MakeBuildSystem,
    source_root: Utf8PathBuf,
    config: PincheckConfig,
    profile_name: String,
}

impl BaseApp {
    fn new(output: OutputContext, common: CommonOpts) -> Result<Self> {
        let build_dir = match common.build_dir {
            Some(build_dir) => build_dir,
            None => current_dir()?,
        };
        if !build_dir.is_dir() {
            return Err(ExpectedError::BuildDirNotFound { build_dir });
        }

        let build_system = MakeBuildSystem::new(build_dir);
        let source_root = build_system.source_root();
        let config = PincheckConfig::from_sources(&source_root, common.config_file.as_deref())?;

        let base = Self {
            output,
            build_system,
            source_root,
            config,
            profile_name: common.profile,
        };
        // Fail early on unknown profiles.
        base.load_profile()?;

        if output.verbose {
            info!("build directory: {}", base.build_system.build_dir());
            info!("source root: {}", base.source_root);
        }
        Ok(base)
    }

    fn load_profile(&self) -> Result<PincheckProfile<'_>> {
        Ok(self.config.profile(&self.profile_name)?)
    }

    /// Discovers, filters and probes cases, then attaches rubric data to them.
    fn build_registry(
        &self,
        filter: &CaseFilter,
        profile: &PincheckProfile<'_>,
    ) -> Result<(CaseRegistry, RubricSet)> {
        let mut build_system = self.build_system.clone();
        build_system.set_default_timeout(profile.default_timeout());

        let raw = build_system.discover_cases()?;
        let cache_path = build_system.build_dir().join(profile.cache_file());
        let mut cache = MetadataCache::load(&cache_path);
        let mut registry = CaseRegistry::build(
            &raw,
            filter,
            &build_system,
            &mut cache,
            profile.default_timeout(),
        )?;
        if let Err(error) = cache.flush(&cache_path) {
            warn!("{error}");
        }

        if registry.is_empty() {
            return Ok((registry, RubricSet::default()));
        }

        let grading_file = build_system.build_dir().join(build_system.grading_file()?);
        if self.output.verbose {
            info!("grading file: {grading_file}");
        }
        let rubrics = RubricSet::load(&grading_file, &self.source_root, &mut registry)?;
        if self.output.verbose && !rubrics.is_empty() {
            info!(
                "rubrics: {}",
                rubrics.iter().map(|rubric| rubric.path()).join(", ")
            );
        }

        Ok((registry, rubrics))
    }

    fn exec_list(&self, filter: &CaseFilter) -> Result<i32> {
        let profile = self.load_profile()?;
        let (registry, rubrics) = self.build_registry(filter, &profile)?;
        if registry.is_empty() {
            warn!("no cases match the given filters");
            return Ok(PincheckExitCode::OK);
        }

        let mut listing = RubricListing::new(&rubrics, &registry);
        if self
            .output
            .color
            .should_colorize(supports_color::Stream::Stdout)
        {
            listing.colorize();
        }

        let mut writer = BufWriter::new(std::io::stdout().lock());
        listing
            .write(&mut writer)
            .map_err(ExpectedError::write_output_error)?;
        writer.flush().map_err(ExpectedError::write_output_error)?;
        Ok(PincheckExitCode::OK)
    }

    fn exec_run(&self, filter: &CaseFilter, runner_opts: &RunnerOpts) -> Result<i32> {
        let profile = self.load_profile()?;
        let (registry, _rubrics) = self.build_registry(filter, &profile)?;
        if registry.is_empty() {
            warn!("no cases to run");
            return Ok(PincheckExitCode::NO_TESTS_RUN);
        }
        if self.output.verbose {
            self.log_selected_cases(&registry);
        }

        let mut build_system = self.build_system.clone();
        build_system.set_default_timeout(profile.default_timeout());
        let mut runner =
            runner_opts
                .to_builder()
                .build(&registry, &profile, Arc::new(build_system))?;

        let mut reporter_builder = TestReporterBuilder::default();
        reporter_builder.set_verbose(self.output.verbose);
        if let Some(show_progress) = runner_opts.show_progress {
            reporter_builder.set_show_progress(show_progress.into());
        }
        let mut reporter = reporter_builder.build(&profile, ReporterStderr::Terminal);
        if self
            .output
            .color
            .should_colorize(supports_color::Stream::Stderr)
        {
            reporter.colorize();
        }

        let run_result = runner.try_execute(|event| reporter.report_event(event));
        reporter.finish();
        let stats = run_result?;

        if stats.is_success() {
            Ok(PincheckExitCode::OK)
        } else {
            Err(ExpectedError::TestRunFailed {
                epochs_failed: stats.epochs_failed(),
                epochs: stats.epochs,
            })
        }
    }

    fn log_selected_cases(&self, registry: &CaseRegistry) {
        info!(
            "selected {} cases ({} with a persistence check)",
            registry.len(),
            registry.persistence_count()
        );
        for case in registry {
            let subtitle = case
                .subtitle()
                .map(|subtitle| format!(" [{subtitle}]"))
                .unwrap_or_default();
            info!(
                target: NO_HEADING_TARGET,
                "    {:>3} {}{subtitle}",
                case.max_points(),
                case.full_name()
            );
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let current_dir =
        std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::from_path_buf(current_dir)
        .map_err(|path| ExpectedError::CurrentDirInvalidUtf8 { path })
}
