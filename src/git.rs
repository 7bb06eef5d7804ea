//! Git command wrappers.
//!
//! Thin wrappers that build git command lines and hand them to a [`Shell`],
//! adding validation and error context.

use anyhow::Context;
use std::path::Path;

use crate::shell::{Shell, quote};

fn run_git(shell: &dyn Shell, dir: &Path, args: &str) -> anyhow::Result<String> {
    let result = shell.execute(dir, &format!("git {args}"))?;
    Ok(result.stdout.trim().to_string())
}

/// Rejects names git would misread or the shell would split.
pub fn validate_branch_name(branch: &str) -> anyhow::Result<()> {
    let bad = branch.is_empty()
        || branch.starts_with('-')
        || branch.contains("..")
        || branch.ends_with(".lock")
        || branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\'\";&|$`<>(){}".contains(c));
    if bad {
        anyhow::bail!("Invalid branch name: {:?}", branch);
    }
    Ok(())
}

pub fn checkout(shell: &dyn Shell, dir: &Path, branch: &str) -> anyhow::Result<()> {
    validate_branch_name(branch)?;
    run_git(shell, dir, &format!("checkout {branch}"))
        .with_context(|| format!("Failed to checkout branch '{}'", branch))?;
    Ok(())
}

pub fn pull(shell: &dyn Shell, dir: &Path) -> anyhow::Result<()> {
    run_git(shell, dir, "pull").context("Failed to pull from remote")?;
    Ok(())
}

/// Clones `url` into `workspace`; git picks the directory name from the URL.
pub fn clone(shell: &dyn Shell, workspace: &Path, url: &str) -> anyhow::Result<()> {
    run_git(shell, workspace, &format!("clone {}", quote(url)))
        .with_context(|| format!("Failed to clone {}", url))?;
    Ok(())
}

/// Creates `branch` at HEAD, resetting it if it already exists.
pub fn force_branch(shell: &dyn Shell, dir: &Path, branch: &str) -> anyhow::Result<()> {
    validate_branch_name(branch)?;
    run_git(shell, dir, &format!("checkout -B {branch}"))
        .with_context(|| format!("Failed to recreate branch '{}'", branch))?;
    Ok(())
}

pub fn add(shell: &dyn Shell, dir: &Path, path: &str) -> anyhow::Result<()> {
    run_git(shell, dir, &format!("add {}", quote(path)))
        .with_context(|| format!("Failed to stage {}", path))?;
    Ok(())
}

pub fn has_staged_changes(shell: &dyn Shell, dir: &Path) -> anyhow::Result<bool> {
    run_git(shell, dir, "diff --cached --name-only")
        .map(|output| !output.is_empty())
        .context("Failed to check for staged changes")
}

pub fn commit(shell: &dyn Shell, dir: &Path, message: &str) -> anyhow::Result<()> {
    run_git(shell, dir, &format!("commit -m {}", quote(message))).context("Failed to commit")?;
    Ok(())
}

/// Pushes `branch` to origin, overwriting whatever the remote holds.
pub fn push_force(shell: &dyn Shell, dir: &Path, branch: &str) -> anyhow::Result<()> {
    validate_branch_name(branch)?;
    run_git(shell, dir, &format!("push -u origin {branch} --force"))
        .with_context(|| format!("Failed to force push '{}'", branch))?;
    Ok(())
}
