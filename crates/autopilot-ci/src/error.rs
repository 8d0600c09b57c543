//! Error types for autopilot-ci

use thiserror::Error;

/// Errors from remote workflow and pull request operations.
#[derive(Error, Debug)]
pub enum CiError {
    /// No workflow is configured for this agent name
    #[error("No workflow configured for agent: {0}")]
    UnknownAgent(String),

    #[error("Workflow run not found: {0}")]
    RunNotFound(u64),

    #[error("Pull request not found: #{0}")]
    PullRequestNotFound(u64),

    #[error("Pull request #{0} is not open")]
    PullRequestNotOpen(u64),

    /// The dispatch was accepted but no new run showed up in time
    #[error("Dispatched workflow for agent {0} never appeared")]
    DispatchNotObserved(String),

    #[error("Timed out after {timeout_secs}s waiting for workflow run {id}")]
    WaitTimeout { id: u64, timeout_secs: u64 },

    /// Credentials env var unset or empty
    #[error("GitHub token not found in env var {0}")]
    MissingToken(String),

    #[error("Invalid CI configuration: {0}")]
    InvalidConfig(String),

    /// Non-success response from the API (body sanitized)
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CiError {
    fn from(err: reqwest::Error) -> Self {
        CiError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CiError>;
