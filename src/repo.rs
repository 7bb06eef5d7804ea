// Working copy preparation: clone or refresh, rebuild the update branch,
// regenerate the lockfile, commit and force push.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::constants::COMMIT_MESSAGE;
use crate::git;
use crate::shell::{Shell, ShellError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStep {
    Started,
    Cloning { url: String },
    CheckingOut { branch: String },
    Pulling,
    RecreatingBranch { branch: String },
    Installing,
    Updating,
    Committing,
    Pushing { branch: String },
    ReturningToBase { branch: String },
    Completed,
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "Starting package update"),
            Self::Cloning { url } => write!(f, "Cloning {url}"),
            Self::CheckingOut { branch } => write!(f, "Checking out {branch}"),
            Self::Pulling => write!(f, "Pulling the latest changes"),
            Self::RecreatingBranch { branch } => write!(f, "Recreating {branch} branch"),
            Self::Installing => write!(f, "Installing new packages when required"),
            Self::Updating => write!(f, "Updating packages"),
            Self::Committing => write!(f, "Committing the lockfile"),
            Self::Pushing { branch } => write!(f, "Force pushing {branch} remote branch"),
            Self::ReturningToBase { branch } => write!(f, "Returning to {branch}"),
            Self::Completed => write!(f, "Done with branching"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareSuccess {
    pub repo_dir: PathBuf,
    /// The working copy was cloned during this run.
    pub cloned: bool,
    /// False when the regenerated lockfile matched the base branch.
    pub committed: bool,
}

/// A step of branch preparation failed; later steps did not run.
#[derive(Debug, Error)]
#[error("{step} failed: {error:#}")]
pub struct PrepareError {
    pub step: UpdateStep,
    pub error: anyhow::Error,
}

impl PrepareError {
    /// The failed command, when the step failed inside the shell.
    #[must_use]
    pub fn shell_error(&self) -> Option<&ShellError> {
        self.error.downcast_ref::<ShellError>()
    }
}

fn at_step<T>(step: &UpdateStep, result: anyhow::Result<T>) -> Result<T, PrepareError> {
    result.map_err(|error| PrepareError {
        step: step.clone(),
        error,
    })
}

/// Leaves the working copy on the base branch with the update branch pushed.
///
/// Safe to repeat: the update branch is recreated from the base branch and
/// force pushed every time, and the commit is skipped when the lockfile did
/// not change. At most one run per working copy at a time.
pub fn prepare_update_branch<F>(
    config: &Config,
    shell: &dyn Shell,
    on_step: F,
) -> Result<PrepareSuccess, PrepareError>
where
    F: Fn(&UpdateStep),
{
    let identity = &config.identity;
    let base = identity.base_branch.as_str();
    let branch = identity.update_branch.as_str();
    let repo_dir = config.repo_dir();

    let step = |s: UpdateStep| {
        info!("{s}");
        on_step(&s);
        s
    };

    step(UpdateStep::Started);

    let cloned = !repo_dir.exists();
    if cloned {
        let url = config.clone_url();
        let s = step(UpdateStep::Cloning { url: url.clone() });
        at_step(&s, clone_into_workspace(config, shell, &url))?;
    }

    let s = step(UpdateStep::CheckingOut {
        branch: base.to_string(),
    });
    at_step(&s, git::checkout(shell, &repo_dir, base))?;

    if !cloned {
        let s = step(UpdateStep::Pulling);
        at_step(&s, git::pull(shell, &repo_dir))?;
    }

    let s = step(UpdateStep::RecreatingBranch {
        branch: branch.to_string(),
    });
    at_step(&s, git::force_branch(shell, &repo_dir, branch))?;

    let manager = &config.package_manager;
    let s = step(UpdateStep::Installing);
    at_step(&s, shell.execute(&repo_dir, &manager.install).map_err(Into::into))?;

    let s = step(UpdateStep::Updating);
    at_step(&s, shell.execute(&repo_dir, &manager.update).map_err(Into::into))?;

    let s = step(UpdateStep::Committing);
    at_step(&s, git::add(shell, &repo_dir, &manager.lockfile))?;
    let committed = at_step(&s, git::has_staged_changes(shell, &repo_dir))?;
    if committed {
        at_step(&s, git::commit(shell, &repo_dir, COMMIT_MESSAGE))?;
    } else {
        info!(lockfile = %manager.lockfile, "lockfile unchanged, nothing to commit");
    }

    let s = step(UpdateStep::Pushing {
        branch: branch.to_string(),
    });
    at_step(&s, git::push_force(shell, &repo_dir, branch))?;

    let s = step(UpdateStep::ReturningToBase {
        branch: base.to_string(),
    });
    at_step(&s, git::checkout(shell, &repo_dir, base))?;

    step(UpdateStep::Completed);

    Ok(PrepareSuccess {
        repo_dir,
        cloned,
        committed,
    })
}

fn clone_into_workspace(config: &Config, shell: &dyn Shell, url: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.workspace).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create workspace {}: {}",
            config.workspace.display(),
            e
        )
    })?;
    git::clone(shell, &config.workspace, url)?;
    if !config.repo_dir().is_dir() {
        anyhow::bail!(
            "clone of {} did not create {}",
            url,
            config.repo_dir().display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_messages_name_the_branch() {
        assert_eq!(
            UpdateStep::RecreatingBranch {
                branch: "pkg-update".to_string()
            }
            .to_string(),
            "Recreating pkg-update branch"
        );
        assert_eq!(
            UpdateStep::Pushing {
                branch: "pkg-update".to_string()
            }
            .to_string(),
            "Force pushing pkg-update remote branch"
        );
    }

    #[test]
    fn test_prepare_error_exposes_shell_failure() {
        let err = PrepareError {
            step: UpdateStep::Updating,
            error: ShellError::NonZeroExit {
                command: "bundle update".to_string(),
                code: Some(7),
                stdout: String::new(),
                stderr: "Could not find gem".to_string(),
            }
            .into(),
        };
        assert!(matches!(
            err.shell_error(),
            Some(ShellError::NonZeroExit { code: Some(7), .. })
        ));
        let message = err.to_string();
        assert!(message.starts_with("Updating packages failed"));
        assert!(message.contains("Could not find gem"));
    }
}
