//! Application-wide constants.
//!
//! Centralized defaults so the reference behavior lives in one place.

use std::time::Duration;

/// Default timeout for a single shell command (in seconds).
/// Package manager updates routinely take minutes.
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;

/// Environment variable overriding the shell command timeout.
pub const COMMAND_TIMEOUT_ENV: &str = "PKG_UPDATE_COMMAND_TIMEOUT";

/// Returns the shell command timeout.
///
/// Can be customized via the PKG_UPDATE_COMMAND_TIMEOUT environment variable (in seconds).
/// Falls back to 600 seconds if not set or invalid.
///
/// Example: `PKG_UPDATE_COMMAND_TIMEOUT=1200 pkg-update acme widgets`
pub fn command_timeout(lookup: impl Fn(&str) -> Option<String>) -> Duration {
    lookup(COMMAND_TIMEOUT_ENV)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS))
}

/// Seconds to wait after pushing before asking CI for the build result.
pub const DEFAULT_CI_DELAY_SECS: u64 = 6;
pub const CI_DELAY_ENV: &str = "PKG_UPDATE_CI_DELAY";

/// Upper bound for the polling wait strategy when no timeout is given.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

/// Credentials and workspace variables.
pub const CI_TOKEN_ENV: &str = "CIRCLE_TOKEN";
pub const FORGE_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const WORKSPACE_ENV: &str = "WORKSPACE";
pub const HOME_ENV: &str = "HOME";
pub const DEFAULT_WORKSPACE_DIR: &str = "Workspace";

/// Branch names.
pub const DEFAULT_UPDATE_BRANCH: &str = "pkg-update";
pub const DEFAULT_BASE_BRANCH: &str = "master";

/// Package manager defaults (Bundler).
pub const DEFAULT_INSTALL_COMMAND: &str = "bundle install";
pub const DEFAULT_UPDATE_COMMAND: &str = "bundle update";
pub const DEFAULT_LOCKFILE: &str = "Gemfile.lock";

/// Clone URL template, `{owner}` and `{repo}` are substituted.
pub const DEFAULT_CLONE_URL: &str = "git@github.com:{owner}/{repo}.git";

pub const COMMIT_MESSAGE: &str = "Auto Commit: Package Update";
pub const MERGE_REQUEST_TITLE: &str = "Merge Package Update";
pub const MERGE_REQUEST_BODY: &str = "This is an automated merge request.";

/// Remote API roots.
pub const CIRCLE_CI_API_URL: &str = "https://circleci.com/api/v1";
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Build status reported by CircleCI for a green build.
pub const CI_SUCCESS_STATUS: &str = "success";

/// Default log file, relative to the current directory. Rotated daily;
/// each day's file carries a `.YYYY-MM-DD` suffix.
pub const DEFAULT_LOG_FILE: &str = "pkg-update.log";

/// Rotated log files kept before the oldest is deleted.
pub const MAX_LOG_FILES: usize = 14;

/// Progress spinner tick interval in milliseconds.
pub const PROGRESS_TICK_MS: u64 = 80;

/// Exit code for usage, configuration and run failures.
pub const EXIT_FAILURE: i32 = 1;
