//! Automated dependency refresh for a git repository.
//!
//! This crate updates a repository's packages by:
//! - Cloning or refreshing the working copy on the base branch
//! - Recreating the update branch and regenerating the lockfile
//! - Committing and force pushing the update branch
//! - Waiting for CI and reading the branch's last build status
//! - Opening a pull request when that build passed

pub mod ci;
pub mod cli;
pub mod config;
pub mod constants;
pub mod forge;
pub mod git;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod repo;
pub mod shell;
pub mod wait;
