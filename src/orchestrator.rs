//! Sequences one package update run.
//!
//! ```text
//! START -> PREPARE_BRANCH -> AWAIT_CI -> CREATE_MERGE_REQUEST -> END
//!                                    \-> END (CI did not pass)
//! ```
//!
//! A failed branch preparation aborts the run before CI is consulted.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::ci::{BuildStatusSource, CiVerdict};
use crate::config::Config;
use crate::forge::{MergeRequestCreator, MergeRequestRecord};
use crate::repo::{self, PrepareError, PrepareSuccess, UpdateStep};
use crate::shell::Shell;
use crate::wait::WaitStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    PrepareBranch,
    AwaitCi,
    CreateMergeRequest,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::PrepareBranch => "prepare branch",
            Self::AwaitCi => "await CI",
            Self::CreateMergeRequest => "create merge request",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeRequestOutcome {
    /// CI did not pass, so no request was sent.
    NotAttempted,
    Created(MergeRequestRecord),
    Failed { reason: String },
}

/// Result of a run that got past branch preparation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub prepared: PrepareSuccess,
    pub ci: CiVerdict,
    pub merge_request: MergeRequestOutcome,
    pub duration: Duration,
}

impl RunReport {
    #[must_use]
    pub fn merge_request_created(&self) -> bool {
        matches!(self.merge_request, MergeRequestOutcome::Created(_))
    }
}

/// Progress notifications emitted during a run.
pub trait RunCallbacks {
    fn on_phase(&self, _phase: Phase) {}
    fn on_step(&self, step: &UpdateStep);
    /// Called right before the wait strategy takes over.
    fn on_wait(&self, _description: &str) {}
    fn on_complete(&self, report: &RunReport);
    fn on_failure(&self, _error: &PrepareError) {}
}

/// Collaborators for one run, all borrowed.
pub struct Orchestrator<'a> {
    pub config: &'a Config,
    pub shell: &'a dyn Shell,
    pub ci: &'a dyn BuildStatusSource,
    pub forge: &'a dyn MergeRequestCreator,
    pub wait: &'a dyn WaitStrategy,
    pub callbacks: &'a dyn RunCallbacks,
}

impl Orchestrator<'_> {
    /// Runs the whole sequence once.
    ///
    /// CI and forge failures are folded into the report; only a failed
    /// branch preparation is returned as an error.
    pub fn run(&self) -> Result<RunReport, PrepareError> {
        let started = Instant::now();
        let identity = &self.config.identity;
        self.enter(Phase::Start);
        info!(repo = %identity.slug(), "Start Package Update Script");

        self.enter(Phase::PrepareBranch);
        let prepared = repo::prepare_update_branch(self.config, self.shell, |step| {
            self.callbacks.on_step(step);
        })
        .inspect_err(|e| {
            error!(step = %e.step, "branch preparation failed, aborting: {:#}", e.error);
            self.callbacks.on_failure(e);
            self.enter(Phase::End);
        })?;
        info!("Done with branching, proceed with testing on CI now");

        self.enter(Phase::AwaitCi);
        let description = self.wait.describe();
        info!("Will check the CI result: {description}");
        self.callbacks.on_wait(&description);
        let ci = self.wait.wait_for_ci(&mut || {
            self.ci.last_build_status(&self.config.ci, identity)
        });

        let merge_request = if ci.is_passed() {
            self.enter(Phase::CreateMergeRequest);
            match self.forge.create_merge_request(identity) {
                Ok(record) => MergeRequestOutcome::Created(record),
                Err(e) => MergeRequestOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        } else {
            warn!(verdict = %ci, "CI did not pass, skipping merge request");
            MergeRequestOutcome::NotAttempted
        };

        self.enter(Phase::End);
        let report = RunReport {
            prepared,
            ci,
            merge_request,
            duration: started.elapsed(),
        };
        info!("That's all, bye");
        self.callbacks.on_complete(&report);
        Ok(report)
    }

    fn enter(&self, phase: Phase) {
        tracing::debug!(%phase, "entering phase");
        self.callbacks.on_phase(phase);
    }
}
