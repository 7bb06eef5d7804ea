//! Runtime configuration, built once at startup and passed by reference.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_CLONE_URL;

/// Errors raised while assembling the configuration. All of them abort the
/// run before any shell command or network request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Please set the {0} environment variable")]
    MissingEnv(&'static str),
    #[error("cannot determine a workspace directory: pass one, or set WORKSPACE or HOME")]
    NoWorkspace,
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Forge-side identity of the repository being updated.
#[derive(Clone, PartialEq, Eq)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub update_branch: String,
    pub base_branch: String,
}

impl RepositoryIdentity {
    /// `owner/repo`, as used in log lines.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Debug for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryIdentity")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &"<redacted>")
            .field("update_branch", &self.update_branch)
            .field("base_branch", &self.base_branch)
            .finish()
    }
}

/// CI provider credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct CiAccount {
    pub token: String,
}

impl fmt::Debug for CiAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CiAccount")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Commands that regenerate the lockfile, run inside the working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManager {
    pub install: String,
    pub update: String,
    pub lockfile: String,
}

/// How the orchestrator waits for CI before reading the build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Sleep once, then check once.
    FixedDelay(Duration),
    /// Check repeatedly until the build settles or the timeout elapses.
    Polling { interval: Duration, timeout: Duration },
}

/// Runtime configuration derived from CLI arguments and the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub identity: RepositoryIdentity,
    pub ci: CiAccount,
    /// Directory holding the working copies.
    pub workspace: PathBuf,
    /// Clone URL template, `{owner}` and `{repo}` are substituted.
    pub clone_url: String,
    pub package_manager: PackageManager,
    pub wait: WaitPolicy,
    pub command_timeout: Duration,
    pub ci_api_url: String,
    pub forge_api_url: String,
    pub verbosity: Verbosity,
}

impl Config {
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Local working copy of the repository.
    #[must_use]
    pub fn repo_dir(&self) -> PathBuf {
        self.workspace.join(&self.identity.repo)
    }

    /// The clone URL with owner and repository filled in.
    #[must_use]
    pub fn clone_url(&self) -> String {
        render_clone_url(&self.clone_url, &self.identity)
    }
}

fn render_clone_url(template: &str, identity: &RepositoryIdentity) -> String {
    let template = if template.is_empty() {
        DEFAULT_CLONE_URL
    } else {
        template
    };
    template
        .replace("{owner}", &identity.owner)
        .replace("{repo}", &identity.repo)
}

/// Verbosity level for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RepositoryIdentity {
        RepositoryIdentity {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            token: "gh-secret".to_string(),
            update_branch: "pkg-update".to_string(),
            base_branch: "master".to_string(),
        }
    }

    #[test]
    fn test_debug_output_redacts_tokens() {
        let rendered = format!("{:?} {:?}", identity(), CiAccount {
            token: "ci-secret".to_string(),
        });
        assert!(!rendered.contains("gh-secret"));
        assert!(!rendered.contains("ci-secret"));
        assert!(rendered.contains("widgets"));
    }

    #[test]
    fn test_clone_url_substitutes_owner_and_repo() {
        assert_eq!(
            render_clone_url(DEFAULT_CLONE_URL, &identity()),
            "git@github.com:acme/widgets.git"
        );
        assert_eq!(
            render_clone_url("/srv/git/{repo}.git", &identity()),
            "/srv/git/widgets.git"
        );
        assert_eq!(
            render_clone_url("", &identity()),
            "git@github.com:acme/widgets.git"
        );
    }

    #[test]
    fn test_slug_joins_owner_and_repo() {
        assert_eq!(identity().slug(), "acme/widgets");
    }
}
