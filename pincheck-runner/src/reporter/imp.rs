// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestEvent, TestEventKind, render_status_line};
use crate::{
    config::{PincheckProfile, ShowProgress},
    errors::WriteEventError,
    helpers::{FormattedDuration, plural},
    runner::{EpochStats, ExecutionResult, ResultStatus, RunStats},
};
use debug_ignore::DebugIgnore;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, BufWriter, IsTerminal, Write},
    time::Duration,
};

/// The width assumed for the status line when the terminal size is unknown.
const FALLBACK_WIDTH: usize = 80;

/// Where a [`TestReporter`] writes its output.
pub enum ReporterStderr<'a> {
    /// Standard error, drawing the live status line if enabled.
    Terminal,

    /// An in-memory buffer. The status line is never drawn.
    Buffer(&'a mut Vec<u8>),
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct TestReporterBuilder {
    verbose: bool,
    show_progress: Option<ShowProgress>,
    status_width: Option<usize>,
}

impl TestReporterBuilder {
    /// Sets verbose output: failure details in the final listing and subtitles on passing rows.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Sets whether the live status line is drawn.
    pub fn set_show_progress(&mut self, show_progress: ShowProgress) -> &mut Self {
        self.show_progress = Some(show_progress);
        self
    }

    /// Sets the width the status line is fitted to, instead of the terminal's.
    pub fn set_status_width(&mut self, status_width: usize) -> &mut Self {
        self.status_width = Some(status_width);
        self
    }

    /// Creates a new test reporter.
    pub fn build<'a>(
        &self,
        profile: &PincheckProfile<'_>,
        output: ReporterStderr<'a>,
    ) -> TestReporter<'a> {
        let show_progress = self
            .show_progress
            .unwrap_or_else(|| profile.show_progress());

        let stderr = match output {
            ReporterStderr::Terminal
                if show_progress.should_draw(io::stderr().is_terminal()) =>
            {
                let progress_bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("{msg}") {
                    progress_bar.set_style(style);
                }
                progress_bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
                ReporterStderrImpl::TerminalWithBar(progress_bar)
            }
            ReporterStderr::Terminal => ReporterStderrImpl::TerminalWithoutBar,
            ReporterStderr::Buffer(buf) => ReporterStderrImpl::Buffer(buf),
        };

        TestReporter {
            inner: TestReporterImpl {
                verbose: self.verbose,
                status_width: self.status_width,
                styles: Box::default(),
            },
            stderr: DebugIgnore(stderr),
        }
    }
}

enum ReporterStderrImpl<'a> {
    TerminalWithBar(ProgressBar),
    TerminalWithoutBar,
    Buffer(&'a mut Vec<u8>),
}

/// Functionality to report run events to stderr.
#[derive(Debug)]
pub struct TestReporter<'a> {
    inner: TestReporterImpl,
    stderr: DebugIgnore<ReporterStderrImpl<'a>>,
}

impl TestReporter<'_> {
    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.inner.styles.colorize();
    }

    /// Report a run event.
    pub fn report_event(&mut self, event: TestEvent<'_>) -> Result<(), WriteEventError> {
        match &mut *self.stderr {
            ReporterStderrImpl::TerminalWithBar(progress_bar) => {
                let mut buf: Vec<u8> = Vec::new();
                self.inner
                    .write_event_impl(&event, &mut buf)
                    .map_err(WriteEventError::Io)?;
                if !buf.is_empty() {
                    // ProgressBar::println doesn't print lines while the bar is hidden. The
                    // suspend method prints them in both cases.
                    progress_bar.suspend(|| {
                        _ = io::stderr().write_all(&buf);
                    });
                }
                self.inner.update_progress_bar(&event, progress_bar);
            }
            ReporterStderrImpl::TerminalWithoutBar => {
                let mut writer = BufWriter::new(io::stderr());
                self.inner
                    .write_event_impl(&event, &mut writer)
                    .map_err(WriteEventError::Io)?;
                writer.flush().map_err(WriteEventError::Io)?;
            }
            ReporterStderrImpl::Buffer(buf) => {
                self.inner
                    .write_event_impl(&event, &mut **buf)
                    .map_err(WriteEventError::Io)?;
            }
        }
        Ok(())
    }

    /// Mark the reporter done, clearing the status line.
    pub fn finish(&mut self) {
        if let ReporterStderrImpl::TerminalWithBar(progress_bar) = &*self.stderr {
            progress_bar.finish_and_clear();
        }
    }
}

#[derive(Debug)]
struct TestReporterImpl {
    verbose: bool,
    status_width: Option<usize>,
    styles: Box<Styles>,
}

impl TestReporterImpl {
    fn write_event_impl(&self, event: &TestEvent<'_>, mut writer: impl Write) -> io::Result<()> {
        match &event.kind {
            TestEventKind::RunStarted {
                case_count,
                expected_result_count,
                pool_size,
                epochs,
            } => {
                write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;
                write!(
                    writer,
                    "{} {} ({} results per epoch) with {} slots",
                    case_count.style(self.styles.count),
                    plural::cases_str(*case_count),
                    expected_result_count.style(self.styles.count),
                    pool_size.style(self.styles.count),
                )?;
                if *epochs > 1 {
                    write!(
                        writer,
                        ", {} {}",
                        epochs.style(self.styles.count),
                        plural::epochs_str(*epochs)
                    )?;
                }
                writeln!(writer)?;
            }
            TestEventKind::EpochStarted {
                epoch,
                epochs,
                epochs_passed,
            } => {
                if *epochs > 1 {
                    let epochs_failed = epoch - epochs_passed - 1;
                    writeln!(writer)?;
                    writeln!(
                        writer,
                        "{} (so far: {} passed, {} failed)",
                        format!("Epoch {epoch} of {epochs}").style(self.styles.count),
                        epochs_passed.style(self.styles.pass_output),
                        epochs_failed.style(self.styles.fail_output),
                    )?;
                }
            }
            TestEventKind::CaseFinished { result } => {
                self.write_result_row(result, true, &mut writer)?;
            }
            TestEventKind::PoolStatus { .. } => {}
            TestEventKind::EpochFinished { stats, results, .. } => {
                self.write_epoch_summary(stats, results, &mut writer)?;
            }
            TestEventKind::RunFinished { stats } => {
                self.write_run_summary(stats, event.elapsed, &mut writer)?;
            }
        }

        Ok(())
    }

    fn update_progress_bar(&self, event: &TestEvent<'_>, progress_bar: &ProgressBar) {
        match &event.kind {
            TestEventKind::PoolStatus { snapshot } => {
                let width = self.status_width.unwrap_or_else(terminal_width);
                progress_bar.set_message(render_status_line(snapshot, width, &self.styles));
            }
            TestEventKind::EpochFinished { .. } | TestEventKind::RunFinished { .. } => {
                progress_bar.set_message("");
            }
            _ => {}
        }
    }

    fn write_result_row(
        &self,
        result: &ExecutionResult,
        detail: bool,
        mut writer: impl Write,
    ) -> io::Result<()> {
        let (label, style) = match result.status() {
            ResultStatus::Pass => ("pass", self.styles.pass),
            ResultStatus::Fail => ("FAIL", self.styles.fail),
            ResultStatus::Error => ("ERROR", self.styles.error),
        };
        write!(writer, "{:>12} ", label.style(style))?;
        self.write_duration(result.time_taken, &mut writer)?;
        write!(writer, "{}", result.display_name())?;

        if (!result.passed || self.verbose)
            && let Some(subtitle) = result.case.subtitle()
        {
            write!(
                writer,
                " {}",
                format!("[{subtitle}]").style(self.styles.subtitle)
            )?;
        }
        writeln!(writer)?;

        if !result.passed && detail {
            self.write_failure_detail(result, &mut writer)?;
        }
        Ok(())
    }

    fn write_failure_detail(
        &self,
        result: &ExecutionResult,
        mut writer: impl Write,
    ) -> io::Result<()> {
        let header_style = self.styles.fail;
        let name = result.display_name();

        writeln!(
            writer,
            "{}",
            format!("--- DUMP: {name} (exit code {}) ---", result.exit_code).style(header_style)
        )?;
        if !result.dump.is_empty() {
            {
                // Kernel output may carry its own escapes.
                let mut no_color = strip_ansi_escapes::Writer::new(&mut writer);
                no_color.write_all(result.dump.as_bytes())?;
            }
            if !result.dump.ends_with('\n') {
                writeln!(writer)?;
            }
        }

        if let Some(note) = &result.failure_note {
            writeln!(
                writer,
                "{}",
                format!("--- INTERNAL ERROR: {name} ---").style(header_style)
            )?;
            writeln!(writer, "{note}")?;
        }
        Ok(())
    }

    fn write_epoch_summary(
        &self,
        stats: &EpochStats,
        results: &[ExecutionResult],
        mut writer: impl Write,
    ) -> io::Result<()> {
        let not_passed = stats.expected_count.saturating_sub(stats.passed);

        writeln!(writer)?;
        writeln!(
            writer,
            "Finished total {} {}.",
            stats.expected_count.style(self.styles.count),
            plural::tests_str(stats.expected_count),
        )?;

        if !stats.is_success() {
            writeln!(writer)?;
            writeln!(writer, "{}", "-- Failed tests --".style(self.styles.failed_header))?;
            for result in results.iter().filter(|result| !result.passed) {
                self.write_result_row(result, self.verbose, &mut writer)?;
            }
            writeln!(writer)?;
        }

        let passed_style = if stats.passed > 0 {
            self.styles.pass
        } else {
            self.styles.pass_output
        };
        let failed_style = if not_passed > 0 {
            self.styles.fail
        } else {
            self.styles.fail_output
        };
        writeln!(
            writer,
            "{} {}\t{} {}",
            "Pass:".style(self.styles.pass_output),
            stats.passed.style(passed_style),
            "Fail:".style(self.styles.fail_output),
            not_passed.style(failed_style),
        )?;

        if stats.is_success() {
            writeln!(writer)?;
            writeln!(writer, "{}", "Correct!".style(self.styles.correct))?;
        }
        Ok(())
    }

    fn write_run_summary(
        &self,
        stats: &RunStats,
        elapsed: Duration,
        mut writer: impl Write,
    ) -> io::Result<()> {
        if stats.epochs > 1 {
            writeln!(writer)?;
            writeln!(
                writer,
                "{}",
                format!("All {} trials done.", stats.epochs).style(self.styles.count)
            )?;
            writeln!(
                writer,
                "{} {}",
                "All passing epochs:".style(self.styles.pass_output),
                stats.epochs_passed.style(self.styles.pass),
            )?;
            writeln!(
                writer,
                "{} {}",
                "Failed epochs:".style(self.styles.fail_output),
                stats.epochs_failed().style(self.styles.fail),
            )?;
            if stats.is_success() {
                writeln!(writer)?;
                writeln!(
                    writer,
                    "{}",
                    "Succeeded for all trials!".style(self.styles.correct)
                )?;
            }
        }

        let summary_style = if stats.is_success() {
            self.styles.pass
        } else {
            self.styles.fail
        };
        writeln!(writer)?;
        write!(writer, "{:>12} ", "Summary".style(summary_style))?;
        self.write_duration(elapsed, &mut writer)?;
        writeln!(
            writer,
            "{} {} run in {}: {} passed, {} failed",
            stats.finished_epochs.style(self.styles.count),
            plural::epochs_str(stats.finished_epochs),
            FormattedDuration(elapsed),
            stats.epochs_passed.style(self.styles.pass),
            stats.epochs_failed().style(self.styles.fail),
        )
    }

    fn write_duration(&self, duration: Duration, mut writer: impl Write) -> io::Result<()> {
        // * > means right-align.
        // * 8 is the number of characters to pad to.
        // * .3 means print three digits after the decimal point.
        write!(writer, "[{:>8.3?}s] ", duration.as_secs_f64())
    }
}

fn terminal_width() -> usize {
    console::Term::stderr()
        .size_checked()
        .map_or(FALLBACK_WIDTH, |(_, cols)| usize::from(cols))
}

#[derive(Debug, Default)]
pub(crate) struct Styles {
    pub(crate) count: Style,
    pub(crate) pass: Style,
    pub(crate) fail: Style,
    pub(crate) error: Style,
    pub(crate) pass_output: Style,
    pub(crate) fail_output: Style,
    pub(crate) subtitle: Style,
    pub(crate) persistence: Style,
    pub(crate) running: Style,
    pub(crate) running_prefix: Style,
    pub(crate) failed_header: Style,
    pub(crate) correct: Style,
    pub(crate) title: Style,
    pub(crate) points: Style,
}

impl Styles {
    pub(crate) fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.error = Style::new().bright_red().bold();
        self.pass_output = Style::new().green();
        self.fail_output = Style::new().red();
        self.subtitle = Style::new().magenta();
        self.persistence = Style::new().magenta();
        self.running = Style::new().yellow();
        self.running_prefix = Style::new().yellow().bold();
        self.failed_header = Style::new().bright_red();
        self.correct = Style::new().blue().bold();
        self.title = Style::new().bold();
        self.points = Style::new().cyan();
    }
}
