//! Test infrastructure for pkg-update integration tests.
#![allow(dead_code)]

use anyhow::{Context, Result};
use pkg_update::ci::{BuildStatusSource, CiVerdict};
use pkg_update::config::{
    CiAccount, Config, PackageManager, RepositoryIdentity, Verbosity, WaitPolicy,
};
use pkg_update::forge::{ForgeError, MergeRequestCreator, MergeRequestRecord};
use pkg_update::shell::{Shell, ShellError, ShellResult, SystemShell};
use std::cell::{Cell, RefCell};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;

/// Runs git directly, outside the code under test.
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .context("Failed to spawn git command")?;
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub const SEED_LOCKFILE: &str = "rack (3.0.0)\n";

/// A bare "forge" remote holding a master branch with a lockfile,
/// plus an empty workspace for the tool to clone into.
/// Everything is cleaned up when dropped.
pub struct TestRemote {
    _root: TempDir,
    remote: PathBuf,
    workspace: PathBuf,
}

impl TestRemote {
    pub fn new() -> Result<Self> {
        let root = TempDir::new()?;
        let remote = root.path().join("forge").join("widgets.git");
        std::fs::create_dir_all(&remote)?;
        git(&remote, &["init", "--bare", "-b", "master"])?;

        let seed = root.path().join("seed");
        std::fs::create_dir_all(&seed)?;
        git(&seed, &["init", "-b", "master"])?;
        git(&seed, &["config", "user.email", "test@example.com"])?;
        git(&seed, &["config", "user.name", "Test User"])?;
        std::fs::write(seed.join("README.md"), "# Widgets\n")?;
        std::fs::write(seed.join("Gemfile.lock"), SEED_LOCKFILE)?;
        git(&seed, &["add", "README.md", "Gemfile.lock"])?;
        git(&seed, &["commit", "-m", "Initial commit"])?;
        git(&seed, &["remote", "add", "origin", remote.to_str().unwrap()])?;
        git(&seed, &["push", "-u", "origin", "master"])?;

        let workspace = root.path().join("workspace");

        Ok(Self {
            _root: root,
            remote,
            workspace,
        })
    }

    pub fn remote(&self) -> &Path {
        &self.remote
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.workspace.join("widgets")
    }

    /// Commit sha of `branch` on the remote, if it exists.
    pub fn remote_head(&self, branch: &str) -> Result<Option<String>> {
        let refname = format!("refs/heads/{branch}");
        let output = git(&self.remote, &["for-each-ref", "--format=%(objectname)", &refname])?;
        Ok(if output.is_empty() { None } else { Some(output) })
    }

    /// Contents of `path` at `branch` on the remote.
    pub fn remote_file(&self, branch: &str, path: &str) -> Result<String> {
        git(&self.remote, &["show", &format!("{branch}:{path}")])
    }

    pub fn config(&self, update_cmd: &str) -> Config {
        let mut config = test_config(&self.workspace);
        config.clone_url = self.remote.to_str().unwrap().to_string();
        config.package_manager.update = update_cmd.to_string();
        config
    }
}

/// A real shell with a fixed committer identity.
pub fn test_shell() -> SystemShell {
    SystemShell::new(Duration::from_secs(60))
        .with_env("GIT_AUTHOR_NAME", "Test User")
        .with_env("GIT_AUTHOR_EMAIL", "test@example.com")
        .with_env("GIT_COMMITTER_NAME", "Test User")
        .with_env("GIT_COMMITTER_EMAIL", "test@example.com")
}

pub fn identity() -> RepositoryIdentity {
    RepositoryIdentity {
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        token: "gh-token".to_string(),
        update_branch: "pkg-update".to_string(),
        base_branch: "master".to_string(),
    }
}

pub fn test_config(workspace: &Path) -> Config {
    Config {
        identity: identity(),
        ci: CiAccount {
            token: "ci-token".to_string(),
        },
        workspace: workspace.to_path_buf(),
        clone_url: "git@github.com:{owner}/{repo}.git".to_string(),
        package_manager: PackageManager {
            install: "true".to_string(),
            update: "true".to_string(),
            lockfile: "Gemfile.lock".to_string(),
        },
        wait: WaitPolicy::FixedDelay(Duration::ZERO),
        command_timeout: Duration::from_secs(60),
        ci_api_url: "http://127.0.0.1:9".to_string(),
        forge_api_url: "http://127.0.0.1:9".to_string(),
        verbosity: Verbosity::Quiet,
    }
}

/// Records every command line and answers without running anything.
#[derive(Default)]
pub struct RecordingShell {
    pub lines: RefCell<Vec<String>>,
    /// Report the lockfile as staged so the commit runs.
    pub staged: bool,
    /// Fail the first command containing this text.
    pub fail_on: Option<String>,
}

impl RecordingShell {
    pub fn staged() -> Self {
        Self {
            staged: true,
            ..Self::default()
        }
    }

    pub fn failing_on(text: &str) -> Self {
        Self {
            staged: true,
            fail_on: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl Shell for RecordingShell {
    fn execute(&self, _dir: &Path, command_line: &str) -> Result<ShellResult, ShellError> {
        self.lines.borrow_mut().push(command_line.to_string());
        if let Some(text) = &self.fail_on {
            if command_line.contains(text.as_str()) {
                return Err(ShellError::NonZeroExit {
                    command: command_line.to_string(),
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "simulated failure".to_string(),
                });
            }
        }
        let stdout = if self.staged && command_line.starts_with("git diff --cached") {
            "Gemfile.lock\n".to_string()
        } else {
            String::new()
        };
        Ok(ShellResult {
            stdout,
            stderr: String::new(),
        })
    }
}

/// Returns a fixed verdict and counts queries.
pub struct FakeCi {
    pub verdict: CiVerdict,
    pub calls: Cell<usize>,
}

impl FakeCi {
    pub fn new(verdict: CiVerdict) -> Self {
        Self {
            verdict,
            calls: Cell::new(0),
        }
    }
}

impl BuildStatusSource for FakeCi {
    fn last_build_status(&self, _account: &CiAccount, _identity: &RepositoryIdentity) -> CiVerdict {
        self.calls.set(self.calls.get() + 1);
        self.verdict.clone()
    }
}

/// Counts merge request creations; fails them when `fail` is set.
#[derive(Default)]
pub struct FakeForge {
    pub calls: Cell<usize>,
    pub fail: bool,
}

impl MergeRequestCreator for FakeForge {
    fn create_merge_request(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<MergeRequestRecord, ForgeError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(ForgeError::Api {
                status: 422,
                body: r#"{"message":"Validation Failed"}"#.to_string(),
            });
        }
        Ok(MergeRequestRecord(serde_json::json!({
            "number": 1,
            "head": { "ref": identity.update_branch },
        })))
    }
}

/// One HTTP request as seen by [`StubServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query string.
    pub target: String,
    /// Header names lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Minimal HTTP/1.1 server answering a fixed list of responses in order,
/// one connection each, then shutting down.
pub struct StubServer {
    pub url: String,
    handle: JoinHandle<Vec<RecordedRequest>>,
}

impl StubServer {
    pub fn serve(responses: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let responses: Vec<(u16, String)> = responses
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();

        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (stream, _) = listener.accept().expect("accept");
                seen.push(handle_one(stream, status, &body));
            }
            seen
        });
        Self { url, handle }
    }

    /// Waits for every scripted response to be served.
    pub fn requests(self) -> Vec<RecordedRequest> {
        self.handle.join().expect("stub server thread panicked")
    }
}

fn handle_one(mut stream: std::net::TcpStream, status: u16, body: &str) -> RecordedRequest {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

    let mut request_line = String::new();
    reader.read_line(&mut request_line).expect("read request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("read header");
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut raw_body = vec![0; length];
    reader.read_exact(&mut raw_body).expect("read body");

    let reason = if status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).expect("write response");
    stream.flush().expect("flush response");

    RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&raw_body).into_owned(),
    }
}

/// An address nothing listens on.
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}
