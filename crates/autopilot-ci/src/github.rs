//! GitHub Actions / pull request backend.
//!
//! Agents run remotely as `workflow_dispatch` workflows that receive the
//! agent name as the `agent` input. Pull requests opened by those runs live
//! on branches starting with the configured prefix.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::backend::CiBackend;
use crate::error::{CiError, Result};
use crate::pull_request::{PrStatus, PullRequest};
use crate::workflow::{WorkflowRun, WorkflowStatus};

const API_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("autopilot/", env!("CARGO_PKG_VERSION"));

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

const DEFAULT_DISPATCH_POLL_ATTEMPTS: u32 = 10;
const DEFAULT_DISPATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_ref() -> String {
    "main".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_branch_prefix() -> String {
    "autopilot/".to_string()
}

fn default_merge_method() -> String {
    "squash".to_string()
}

/// The `[github]` table of `autopilot.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Branch or tag the workflows are dispatched on.
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,

    /// Env var holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Head-branch prefix of autonomous pull requests.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// `merge`, `squash` or `rebase`.
    #[serde(default = "default_merge_method")]
    pub merge_method: String,

    /// Agent name → workflow file (e.g. `security = "autopilot-security.yml"`).
    #[serde(default)]
    pub workflows: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ConfigFile {
    github: Option<GitHubConfig>,
}

impl GitHubConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            api_url: default_api_url(),
            git_ref: default_ref(),
            token_env: default_token_env(),
            branch_prefix: default_branch_prefix(),
            merge_method: default_merge_method(),
            workflows: BTreeMap::new(),
        }
    }

    pub fn with_workflow(mut self, agent: impl Into<String>, file: impl Into<String>) -> Self {
        self.workflows.insert(agent.into(), file.into());
        self
    }

    /// Read the `[github]` table from a full config document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let config = file
            .github
            .ok_or_else(|| CiError::InvalidConfig("missing [github] section".to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            return Err(CiError::InvalidConfig(
                "github.owner and github.repo are required".to_string(),
            ));
        }
        if !matches!(self.merge_method.as_str(), "merge" | "squash" | "rebase") {
            return Err(CiError::InvalidConfig(format!(
                "unsupported merge_method: {}",
                self.merge_method
            )));
        }
        if let Some((agent, _)) = self.workflows.iter().find(|(_, f)| f.trim().is_empty()) {
            return Err(CiError::InvalidConfig(format!(
                "workflow file for agent {} is empty",
                agent
            )));
        }
        Ok(())
    }

    /// Agents that can be triggered remotely.
    pub fn agent_names(&self) -> Vec<String> {
        self.workflows.keys().cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiWorkflowRun {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_title: Option<String>,
    #[serde(default)]
    path: Option<String>,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiWorkflowRuns {
    workflow_runs: Vec<ApiWorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct ApiBranchRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    head: ApiBranchRef,
}

impl From<ApiPullRequest> for PullRequest {
    fn from(pr: ApiPullRequest) -> Self {
        let status = if pr.merged_at.is_some() {
            PrStatus::Merged
        } else if pr.state == "open" {
            PrStatus::Open
        } else {
            PrStatus::Closed
        };
        PullRequest {
            number: pr.number,
            title: pr.title,
            head_branch: pr.head.git_ref,
            status,
            html_url: pr.html_url,
        }
    }
}

/// Truncate an API error body and redact anything that looks like a
/// credential.
fn sanitize_error_body(body: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",
        "gho_",
        "ghu_",
        "github_pat_",
    ];

    let truncated = if body.chars().count() > MAX_ERROR_BODY_LEN {
        let head: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}... (truncated)", head)
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    if SECRET_PATTERNS.iter().any(|p| lower.contains(p)) {
        return "(error details redacted - may contain sensitive data)".to_string();
    }
    truncated
}

fn workflow_file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// [`CiBackend`] over the GitHub REST API.
pub struct GitHubBackend {
    config: GitHubConfig,
    token: String,
    client: reqwest::Client,
    /// Agent names of runs dispatched by this backend.
    dispatched: Mutex<HashMap<u64, String>>,
    dispatch_poll_attempts: u32,
    dispatch_poll_interval: Duration,
}

impl GitHubBackend {
    pub fn new(config: GitHubConfig, token: impl Into<String>) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            config,
            token: token.into(),
            client,
            dispatched: Mutex::new(HashMap::new()),
            dispatch_poll_attempts: DEFAULT_DISPATCH_POLL_ATTEMPTS,
            dispatch_poll_interval: DEFAULT_DISPATCH_POLL_INTERVAL,
        })
    }

    /// Read the token from the env var named by `config.token_env`.
    pub fn from_env(config: GitHubConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CiError::MissingToken(config.token_env.clone()))?;
        Self::new(config, token)
    }

    /// How long to look for the run created by a dispatch.
    pub fn with_dispatch_polling(mut self, attempts: u32, interval: Duration) -> Self {
        self.dispatch_poll_attempts = attempts.max(1);
        self.dispatch_poll_interval = interval;
        self
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.repo_url(path))
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CiError::Api {
            status: status.as_u16(),
            message: sanitize_error_body(&body),
        })
    }

    fn workflow_file(&self, agent: &str) -> Result<&str> {
        self.config
            .workflows
            .get(agent)
            .map(String::as_str)
            .ok_or_else(|| CiError::UnknownAgent(agent.to_string()))
    }

    /// Newest `workflow_dispatch` run of `file`, if any.
    async fn latest_dispatch_run(&self, file: &str) -> Result<Option<ApiWorkflowRun>> {
        let path = format!(
            "/actions/workflows/{}/runs?event=workflow_dispatch&per_page=1",
            file
        );
        let response = self.send(self.request(Method::GET, &path)).await?;
        let runs: ApiWorkflowRuns = response.json().await?;
        Ok(runs.workflow_runs.into_iter().next())
    }

    fn agent_for(&self, run: &ApiWorkflowRun) -> String {
        if let Some(agent) = self.dispatched.lock().ok().and_then(|d| d.get(&run.id).cloned()) {
            return agent;
        }

        // Unambiguous reverse lookup when each agent has its own workflow.
        if let Some(file) = run.path.as_deref().map(workflow_file_name) {
            let mut matches = self.config.workflows.iter().filter(|(_, f)| f.as_str() == file);
            if let (Some((agent, _)), None) = (matches.next(), matches.next()) {
                return agent.clone();
            }
        }

        run.display_title
            .clone()
            .or_else(|| run.name.clone())
            .unwrap_or_default()
    }

    fn to_workflow_run(&self, run: ApiWorkflowRun) -> WorkflowRun {
        WorkflowRun {
            id: run.id,
            agent_name: self.agent_for(&run),
            status: WorkflowStatus::from_github(&run.status, run.conclusion.as_deref()),
            html_url: run.html_url,
        }
    }
}

#[async_trait]
impl CiBackend for GitHubBackend {
    async fn dispatch(&self, agent: &str) -> Result<WorkflowRun> {
        let file = self.workflow_file(agent)?;
        let previous = self.latest_dispatch_run(file).await?.map(|r| r.id);

        let body = json!({
            "ref": self.config.git_ref,
            "inputs": { "agent": agent },
        });
        self.send(
            self.request(Method::POST, &format!("/actions/workflows/{}/dispatches", file))
                .json(&body),
        )
        .await?;
        info!(agent = %agent, workflow = %file, "Workflow dispatched");

        // The dispatch endpoint returns no run id; wait for a newer run.
        for attempt in 0..self.dispatch_poll_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.dispatch_poll_interval).await;
            }
            if let Some(run) = self.latest_dispatch_run(file).await? {
                if previous.map_or(true, |prev| run.id > prev) {
                    if let Ok(mut dispatched) = self.dispatched.lock() {
                        dispatched.insert(run.id, agent.to_string());
                    }
                    return Ok(self.to_workflow_run(run));
                }
            }
            debug!(agent = %agent, attempt = attempt + 1, "Dispatched run not visible yet");
        }

        Err(CiError::DispatchNotObserved(agent.to_string()))
    }

    async fn get_run(&self, id: u64) -> Result<WorkflowRun> {
        let response = self
            .send(self.request(Method::GET, &format!("/actions/runs/{}", id)))
            .await
            .map_err(|e| match e {
                CiError::Api { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                    CiError::RunNotFound(id)
                }
                other => other,
            })?;
        let run: ApiWorkflowRun = response.json().await?;
        Ok(self.to_workflow_run(run))
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let response = self
            .send(self.request(Method::GET, "/pulls?state=open&per_page=100"))
            .await?;
        let pulls: Vec<ApiPullRequest> = response.json().await?;
        Ok(pulls
            .into_iter()
            .map(PullRequest::from)
            .filter(|pr| pr.is_open() && pr.head_branch.starts_with(&self.config.branch_prefix))
            .collect())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        let body = json!({ "merge_method": self.config.merge_method });
        self.send(
            self.request(Method::PUT, &format!("/pulls/{}/merge", number))
                .json(&body),
        )
        .await
        .map_err(|e| pr_error(e, number))?;
        info!(pr = number, "Pull request merged");
        Ok(())
    }

    async fn close_pull_request(&self, number: u64) -> Result<()> {
        self.send(
            self.request(Method::PATCH, &format!("/pulls/{}", number))
                .json(&json!({ "state": "closed" })),
        )
        .await
        .map_err(|e| pr_error(e, number))?;
        info!(pr = number, "Pull request closed");
        Ok(())
    }
}

fn pr_error(err: CiError, number: u64) -> CiError {
    match err {
        CiError::Api { status: 404, .. } => CiError::PullRequestNotFound(number),
        other => other,
    }
}
