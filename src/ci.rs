//! CI status lookups against the CircleCI v1 REST API.

use std::fmt;

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{CiAccount, RepositoryIdentity};
use crate::constants::{CI_SUCCESS_STATUS, CIRCLE_CI_API_URL};

/// Statuses CircleCI reports while a build has not finished.
const PENDING_STATUSES: &[&str] = &["running", "queued", "scheduled", "not_running", "retried"];

/// One entry of the project tree response. Only `status` is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildSummary {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub build_num: Option<u64>,
}

/// What CI said about the most recent build of the update branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiVerdict {
    Passed,
    Failed { status: Option<String> },
    Pending { status: String },
    NoBuilds,
    Unreachable { reason: String },
}

impl CiVerdict {
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// False while the build is running or not yet visible.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending { .. } | Self::NoBuilds)
    }
}

impl fmt::Display for CiVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed { status: Some(status) } => write!(f, "failed ({status})"),
            Self::Failed { status: None } => write!(f, "failed (no status)"),
            Self::Pending { status } => write!(f, "pending ({status})"),
            Self::NoBuilds => write!(f, "no build found"),
            Self::Unreachable { reason } => write!(f, "unreachable: {reason}"),
        }
    }
}

/// Judges the most recent build, which CircleCI lists first.
///
/// Only an exact, case-sensitive `"success"` counts as a pass.
#[must_use]
pub fn evaluate_builds(builds: &[BuildSummary]) -> CiVerdict {
    let Some(last_build) = builds.first() else {
        return CiVerdict::NoBuilds;
    };
    match last_build.status.as_deref() {
        Some(CI_SUCCESS_STATUS) => CiVerdict::Passed,
        Some(status) if PENDING_STATUSES.contains(&status) => CiVerdict::Pending {
            status: status.to_string(),
        },
        status => CiVerdict::Failed {
            status: status.map(str::to_string),
        },
    }
}

/// Source of build results for the update branch.
pub trait BuildStatusSource {
    /// Never fails: transport and data errors become a non-passing verdict.
    fn last_build_status(&self, account: &CiAccount, identity: &RepositoryIdentity) -> CiVerdict;

    fn last_build_passed(&self, account: &CiAccount, identity: &RepositoryIdentity) -> bool {
        self.last_build_status(account, identity).is_passed()
    }
}

#[derive(Debug, Error)]
pub enum CiClientError {
    #[error("invalid CI API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Blocking CircleCI client.
#[derive(Debug, Clone)]
pub struct CircleCiClient {
    api_url: Url,
    http: reqwest::blocking::Client,
}

impl CircleCiClient {
    pub fn new(api_url: &str) -> Result<Self, CiClientError> {
        let invalid = |reason: String| CiClientError::InvalidUrl {
            url: api_url.to_string(),
            reason,
        };
        let api_url = Url::parse(api_url).map_err(|e| invalid(e.to_string()))?;
        if api_url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { api_url, http })
    }

    pub fn circle_ci() -> Result<Self, CiClientError> {
        Self::new(CIRCLE_CI_API_URL)
    }

    /// Branch names may hold `/` or `#`; each path segment is percent-encoded.
    fn tree_url(&self, identity: &RepositoryIdentity) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "project",
                identity.owner.as_str(),
                identity.repo.as_str(),
                "tree",
                identity.update_branch.as_str(),
            ]);
        }
        url
    }

    fn fetch_builds(
        &self,
        account: &CiAccount,
        identity: &RepositoryIdentity,
    ) -> Result<Vec<BuildSummary>, reqwest::Error> {
        self.http
            .get(self.tree_url(identity))
            .query(&[("circle-token", account.token.as_str()), ("limit", "1")])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?
            .error_for_status()?
            .json::<Vec<BuildSummary>>()
    }
}

impl BuildStatusSource for CircleCiClient {
    fn last_build_status(&self, account: &CiAccount, identity: &RepositoryIdentity) -> CiVerdict {
        let builds = match self.fetch_builds(account, identity) {
            Ok(builds) => builds,
            Err(e) => {
                // reqwest keeps the full URL, token included, in its errors.
                let e = e.without_url();
                match e.status() {
                    Some(status) => error!(status = status.as_u16(), "CI status request failed"),
                    None => error!(err = %e, "CI status request failed"),
                }
                return CiVerdict::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        let verdict = evaluate_builds(&builds);
        match &verdict {
            CiVerdict::Passed => info!(branch = %identity.update_branch, "Last test build passed"),
            CiVerdict::NoBuilds => warn!(branch = %identity.update_branch, "No last build found"),
            CiVerdict::Pending { status } => {
                warn!(branch = %identity.update_branch, status = %status, "Last build has not finished");
            }
            other => warn!(branch = %identity.update_branch, verdict = %other, "Package update failed the tests"),
        }
        verdict
    }
}
