//! Command-line surface and conversion into [`Config`].

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{
    CiAccount, Config, ConfigError, PackageManager, RepositoryIdentity, Verbosity, WaitPolicy,
};
use crate::constants::{
    self, CI_DELAY_ENV, CI_TOKEN_ENV, DEFAULT_BASE_BRANCH, DEFAULT_CI_DELAY_SECS,
    DEFAULT_CLONE_URL, DEFAULT_INSTALL_COMMAND, DEFAULT_LOCKFILE, DEFAULT_LOG_FILE,
    DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_UPDATE_BRANCH, DEFAULT_UPDATE_COMMAND,
    DEFAULT_WORKSPACE_DIR, FORGE_TOKEN_ENV, HOME_ENV, WORKSPACE_ENV,
};
use crate::git;

#[derive(Debug, Parser)]
#[command(
    name = "pkg-update",
    version,
    about = "Regenerate a repository's lockfile on a branch and open a pull request once CI passes",
    after_help = "Requires CIRCLE_TOKEN and GITHUB_TOKEN in the environment.\n\
                  E.g. : pkg-update acme widgets /home/user/Workspace"
)]
pub struct Cli {
    /// Repository owner on the forge.
    pub owner: String,

    /// Repository name; also the working copy's directory name.
    pub repo: String,

    /// Directory holding working copies [default: $WORKSPACE, then ~/Workspace]
    pub workspace: Option<PathBuf>,

    /// Branch the update is merged into.
    #[arg(long, default_value = DEFAULT_BASE_BRANCH)]
    pub base_branch: String,

    /// Disposable branch carrying the regenerated lockfile.
    #[arg(long, default_value = DEFAULT_UPDATE_BRANCH)]
    pub update_branch: String,

    /// Command installing missing packages.
    #[arg(long, default_value = DEFAULT_INSTALL_COMMAND)]
    pub install_cmd: String,

    /// Command regenerating the lockfile.
    #[arg(long, default_value = DEFAULT_UPDATE_COMMAND)]
    pub update_cmd: String,

    /// Lockfile committed on the update branch.
    #[arg(long, default_value = DEFAULT_LOCKFILE)]
    pub lockfile: String,

    /// Clone URL template; `{owner}` and `{repo}` are substituted.
    #[arg(long, default_value = DEFAULT_CLONE_URL)]
    pub clone_url: String,

    /// Seconds to wait after pushing before checking CI [default: 6, or $PKG_UPDATE_CI_DELAY]
    #[arg(long, value_name = "SECS")]
    pub ci_delay: Option<u64>,

    /// Poll CI every SECS seconds instead of checking once after a fixed delay.
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Give up polling after SECS seconds.
    #[arg(long, value_name = "SECS", requires = "poll_interval")]
    pub poll_timeout: Option<u64>,

    /// Run log path; rotated daily with a `.YYYY-MM-DD` suffix.
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    #[arg(long, hide = true, default_value = constants::CIRCLE_CI_API_URL)]
    pub ci_api_url: String,

    #[arg(long, hide = true, default_value = constants::GITHUB_API_URL)]
    pub forge_api_url: String,

    /// Only print errors and the final count.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print every step and log line.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Resolves credentials and defaults against `env` and builds the
    /// configuration. Tokens are checked CI first, forge second.
    pub fn into_config(self, env: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let ci_token = require_env(&env, CI_TOKEN_ENV)?;
        let forge_token = require_env(&env, FORGE_TOKEN_ENV)?;

        validate_name("owner", &self.owner)?;
        validate_name("repo", &self.repo)?;
        let branches = [
            ("base branch", &self.base_branch),
            ("update branch", &self.update_branch),
        ];
        for (name, branch) in branches {
            git::validate_branch_name(branch).map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })?;
        }
        if self.base_branch == self.update_branch {
            return Err(ConfigError::Invalid {
                name: "update branch",
                reason: "must differ from the base branch".to_string(),
            });
        }

        let workspace = match self.workspace.clone() {
            Some(path) => path,
            None => resolve_workspace(&env)?,
        };

        let wait = match self.poll_interval {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "poll interval",
                    reason: "must be at least one second".to_string(),
                });
            }
            Some(interval) => WaitPolicy::Polling {
                interval: Duration::from_secs(interval),
                timeout: Duration::from_secs(self.poll_timeout.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS)),
            },
            None => WaitPolicy::FixedDelay(Duration::from_secs(ci_delay_secs(self.ci_delay, &env)?)),
        };

        Ok(Config {
            verbosity: self.verbosity(),
            identity: RepositoryIdentity {
                owner: self.owner,
                repo: self.repo,
                token: forge_token,
                update_branch: self.update_branch,
                base_branch: self.base_branch,
            },
            ci: CiAccount { token: ci_token },
            workspace,
            clone_url: self.clone_url,
            package_manager: PackageManager {
                install: self.install_cmd,
                update: self.update_cmd,
                lockfile: self.lockfile,
            },
            wait,
            command_timeout: constants::command_timeout(&env),
            ci_api_url: self.ci_api_url,
            forge_api_url: self.forge_api_url,
        })
    }
}

fn require_env(env: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<String, ConfigError> {
    env(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingEnv(name))
}

fn resolve_workspace(env: &impl Fn(&str) -> Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(workspace) = env(WORKSPACE_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(workspace));
    }
    env(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(DEFAULT_WORKSPACE_DIR))
        .ok_or(ConfigError::NoWorkspace)
}

fn ci_delay_secs(flag: Option<u64>, env: &impl Fn(&str) -> Option<String>) -> Result<u64, ConfigError> {
    if let Some(secs) = flag {
        return Ok(secs);
    }
    match env(CI_DELAY_ENV) {
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
            name: CI_DELAY_ENV,
            reason: e.to_string(),
        }),
        None => Ok(DEFAULT_CI_DELAY_SECS),
    }
}

/// Owner and repo end up in a URL path and a directory name.
fn validate_name(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')));
    if bad {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("{value:?} is not a valid repository path segment"),
        });
    }
    Ok(())
}
