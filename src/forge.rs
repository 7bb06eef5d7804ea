//! Pull request creation through the GitHub REST API.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::config::RepositoryIdentity;
use crate::constants::{GITHUB_API_URL, MERGE_REQUEST_BODY, MERGE_REQUEST_TITLE};

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Errors emitted while creating a merge request.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Request transport failed.
    #[error("forge transport error: {0}")]
    Transport(String),

    /// API request failed with a structured status code.
    #[error("forge API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// API payload parse failed.
    #[error("forge parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ForgeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.without_url().to_string())
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Request body for `POST /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMergeRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

impl CreateMergeRequest {
    /// The fixed request merging the update branch into the base branch.
    #[must_use]
    pub fn for_update(identity: &RepositoryIdentity) -> Self {
        Self {
            title: MERGE_REQUEST_TITLE.to_string(),
            body: MERGE_REQUEST_BODY.to_string(),
            head: identity.update_branch.clone(),
            base: identity.base_branch.clone(),
        }
    }
}

/// The forge's JSON response for a created pull request.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequestRecord(pub Value);

impl MergeRequestRecord {
    #[must_use]
    pub fn number(&self) -> Option<u64> {
        self.0.get("number").and_then(Value::as_u64)
    }

    #[must_use]
    pub fn html_url(&self) -> Option<&str> {
        self.0.get("html_url").and_then(Value::as_str)
    }
}

/// Opens merge requests from the update branch.
pub trait MergeRequestCreator {
    fn create_merge_request(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<MergeRequestRecord, ForgeError>;
}

/// Blocking GitHub client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    api_url: String,
    http: reqwest::blocking::Client,
}

impl GitHubClient {
    /// Builds a client rooted at `api_url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be initialized.
    pub fn new(api_url: impl Into<String>) -> Result<Self, ForgeError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Builds a client for api.github.com.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be initialized.
    pub fn github() -> Result<Self, ForgeError> {
        Self::new(GITHUB_API_URL)
    }

    fn pulls_url(&self, identity: &RepositoryIdentity) -> String {
        format!(
            "{}/repos/{}/{}/pulls",
            self.api_url, identity.owner, identity.repo
        )
    }

    fn send(&self, identity: &RepositoryIdentity) -> Result<MergeRequestRecord, ForgeError> {
        let response = self
            .http
            .post(self.pulls_url(identity))
            .header(reqwest::header::ACCEPT, GITHUB_MEDIA_TYPE)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", identity.token),
            )
            .json(&CreateMergeRequest::for_update(identity))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ForgeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(MergeRequestRecord(serde_json::from_str(&body)?))
    }
}

impl MergeRequestCreator for GitHubClient {
    fn create_merge_request(
        &self,
        identity: &RepositoryIdentity,
    ) -> Result<MergeRequestRecord, ForgeError> {
        match self.send(identity) {
            Ok(record) => {
                info!(
                    repo = %identity.slug(),
                    number = ?record.number(),
                    url = record.html_url().unwrap_or_default(),
                    "Pull request created"
                );
                Ok(record)
            }
            Err(ForgeError::Api { status, body }) => {
                error!(status, "pull request creation rejected");
                error!("{body}");
                Err(ForgeError::Api { status, body })
            }
            Err(e) => {
                error!(err = %e, "pull request creation failed");
                Err(e)
            }
        }
    }
}
