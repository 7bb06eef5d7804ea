//! Spinner, colored output, and summary formatting.
//!
//! This module provides visual feedback while the branch is prepared and CI
//! is awaited, and prints the run summary.

use crate::ci::CiVerdict;
use crate::config::Config;
use crate::constants::PROGRESS_TICK_MS;
use crate::orchestrator::{MergeRequestOutcome, Phase, RunCallbacks, RunReport};
use crate::repo::{PrepareError, UpdateStep};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// No-op callbacks for when progress tracking is not needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoOpCallbacks;

impl RunCallbacks for NoOpCallbacks {
    fn on_step(&self, _step: &UpdateStep) {}
    fn on_complete(&self, _report: &RunReport) {}
}

/// Prints a step progress message in verbose mode.
pub fn print_step(config: &Config, step: &UpdateStep) {
    if !config.is_verbose() {
        return;
    }
    eprintln!("  {}...", step.to_string().dimmed());
}

/// Spinner plus verbose step lines for a single run.
/// The spinner is `None` in quiet and verbose modes.
pub struct ConsoleCallbacks {
    spinner: Option<ProgressBar>,
    config: Config,
}

impl ConsoleCallbacks {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let spinner = if config.is_quiet() || config.is_verbose() {
            None
        } else {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
            {
                spinner.set_style(style);
            }
            spinner.enable_steady_tick(Duration::from_millis(PROGRESS_TICK_MS));
            Some(spinner)
        };
        Self {
            spinner,
            config: config.clone(),
        }
    }

    #[must_use]
    pub fn spinner(&self) -> Option<&ProgressBar> {
        self.spinner.as_ref()
    }

    fn set_message(&self, message: String) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(message);
        }
    }

    fn finish(&self, message: String) {
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        }
    }
}

impl RunCallbacks for ConsoleCallbacks {
    fn on_phase(&self, phase: Phase) {
        if phase == Phase::CreateMergeRequest {
            self.set_message("Creating pull request...".to_string());
        }
    }

    fn on_step(&self, step: &UpdateStep) {
        self.set_message(format!("{step}..."));
        print_step(&self.config, step);
    }

    fn on_wait(&self, description: &str) {
        self.set_message(format!("Pushed, {description}..."));
        if self.config.is_verbose() {
            eprintln!("  {}...", description.dimmed());
        }
    }

    fn on_complete(&self, report: &RunReport) {
        let symbol = if report.merge_request_created() {
            "✓".green()
        } else {
            "•".yellow()
        };
        self.finish(format!("{} {} finished", symbol, self.config.identity.slug()));
    }

    fn on_failure(&self, error: &PrepareError) {
        self.finish(format!("{} {} failed at {}", "✗".red(), self.config.identity.slug(), error.step));
    }
}

pub fn print_working_dir(path: &Path, config: &Config) {
    if config.is_quiet() {
        return;
    }
    println!(
        "{} {}",
        "Working in:".cyan(),
        path.display().to_string().white().bold()
    )
}

pub fn print_summary(report: &RunReport, config: &Config) {
    if config.is_quiet() {
        print_quiet_summary(report);
    } else {
        print_normal_summary(report, config);
    }
}

fn print_quiet_summary(report: &RunReport) {
    let created = usize::from(report.merge_request_created());
    println!("{}/1 pull requests created", created);
    if let MergeRequestOutcome::Failed { reason } = &report.merge_request {
        eprintln!("error: {}", reason);
    }
}

fn print_normal_summary(report: &RunReport, config: &Config) {
    print_section("Summary");
    let identity = &config.identity;

    let lockfile = if report.prepared.committed {
        "regenerated and committed".green()
    } else {
        "unchanged".yellow()
    };
    println!(
        "  {} {} -> {} ({})",
        "Branch".white().bold(),
        identity.update_branch.cyan(),
        identity.base_branch.cyan(),
        lockfile
    );
    println!("  {} {}", "CI".white().bold(), format_verdict(&report.ci));
    println!("  {} {}", "PR".white().bold(), format_merge_request(&report.merge_request));
    println!(
        "\n{}: {} in {}",
        "Total".white().bold(),
        identity.slug(),
        format_duration(report.duration)
    );
}

pub fn print_failure(error: &PrepareError, config: &Config) {
    if config.is_quiet() {
        eprintln!("error: {}: {:#}", config.identity.slug(), error.error);
        return;
    }
    println!(
        "  {} {} {}",
        "FAIL".red().bold(),
        config.identity.slug().white(),
        format!("at {}: {:#}", error.step, error.error).red(),
    );
}

fn format_verdict(verdict: &CiVerdict) -> String {
    match verdict {
        CiVerdict::Passed => "passed".green().to_string(),
        CiVerdict::Pending { .. } | CiVerdict::NoBuilds => verdict.to_string().yellow().to_string(),
        _ => verdict.to_string().red().to_string(),
    }
}

fn format_merge_request(outcome: &MergeRequestOutcome) -> String {
    match outcome {
        MergeRequestOutcome::NotAttempted => "not opened".dimmed().to_string(),
        MergeRequestOutcome::Created(record) => match (record.number(), record.html_url()) {
            (Some(number), Some(url)) => format!("#{} {}", number, url).green().to_string(),
            (_, Some(url)) => url.green().to_string(),
            (Some(number), None) => format!("#{}", number).green().to_string(),
            (None, None) => "created".green().to_string(),
        },
        MergeRequestOutcome::Failed { reason } => format!("failed: {}", reason).red().to_string(),
    }
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f32())
}

fn print_section(title: &str) {
    let line = "=".repeat(50).cyan().dimmed();
    let padding = (50 - title.len()) / 2;
    let centered = format!("{:>width$}", title, width = padding + title.len());
    println!("\n{}\n{}\n{}\n", line, centered.cyan().bold(), line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::MergeRequestRecord;
    use crate::repo::PrepareSuccess;
    use std::path::PathBuf;

    fn report(merge_request: MergeRequestOutcome) -> RunReport {
        RunReport {
            prepared: PrepareSuccess {
                repo_dir: PathBuf::from("/ws/widgets"),
                cloned: false,
                committed: true,
            },
            ci: CiVerdict::Passed,
            merge_request,
            duration: Duration::from_millis(1234),
        }
    }

    #[test]
    fn test_format_duration_rounds_to_two_decimals() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.23s");
        assert_eq!(format_duration(Duration::from_secs(42)), "42.00s");
    }

    #[test]
    fn test_format_merge_request_prefers_number_and_url() {
        colored::control::set_override(false);
        let created = MergeRequestOutcome::Created(MergeRequestRecord(serde_json::json!({
            "number": 5,
            "html_url": "https://github.com/acme/widgets/pull/5",
        })));
        assert_eq!(
            format_merge_request(&created),
            "#5 https://github.com/acme/widgets/pull/5"
        );
        assert_eq!(
            format_merge_request(&MergeRequestOutcome::NotAttempted),
            "not opened"
        );
        assert_eq!(
            format_merge_request(&MergeRequestOutcome::Failed {
                reason: "forge API error (422): exists".to_string()
            }),
            "failed: forge API error (422): exists"
        );
    }

    #[test]
    fn test_no_op_callbacks_implements_all_required_methods() {
        let callbacks = NoOpCallbacks;
        callbacks.on_phase(Phase::Start);
        callbacks.on_step(&UpdateStep::Started);
        callbacks.on_wait("checking CI now");
        callbacks.on_complete(&report(MergeRequestOutcome::NotAttempted));
    }

    #[test]
    fn test_quiet_summary_does_not_panic() {
        print_quiet_summary(&report(MergeRequestOutcome::NotAttempted));
        print_quiet_summary(&report(MergeRequestOutcome::Failed {
            reason: "boom".to_string(),
        }));
    }
}
