//! Workflow/PR coordinator facade used by the dashboard and CLI.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use crate::backend::CiBackend;
use crate::error::{CiError, Result};
use crate::pull_request::PullRequest;
use crate::workflow::WorkflowRun;

/// Maps agent names to remote runs and pull requests over a [`CiBackend`].
pub struct Coordinator {
    backend: Arc<dyn CiBackend>,
    agents: BTreeSet<String>,
}

impl Coordinator {
    /// `agents` are the names that may be triggered remotely.
    pub fn new<I, S>(backend: Arc<dyn CiBackend>, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend,
            agents: agents.into_iter().map(Into::into).collect(),
        }
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(String::as_str)
    }

    /// Start a remote run of `agent`.
    pub async fn trigger(&self, agent: &str) -> Result<WorkflowRun> {
        if !self.agents.contains(agent) {
            return Err(CiError::UnknownAgent(agent.to_string()));
        }
        let run = self.backend.dispatch(agent).await?;
        info!(agent = %agent, run_id = run.id, "Remote run triggered");
        Ok(run)
    }

    pub async fn status(&self, id: u64) -> Result<WorkflowRun> {
        self.backend.get_run(id).await
    }

    /// Poll several runs concurrently; results are in `ids` order.
    pub async fn statuses(&self, ids: &[u64]) -> Vec<Result<WorkflowRun>> {
        join_all(ids.iter().map(|id| self.backend.get_run(*id))).await
    }

    /// Poll `id` every `poll_interval` until it reaches a terminal status.
    pub async fn wait_for_completion(
        &self,
        id: u64,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<WorkflowRun> {
        tokio::time::timeout(timeout, self.poll_until_terminal(id, poll_interval))
            .await
            .map_err(|_| CiError::WaitTimeout {
                id,
                timeout_secs: timeout.as_secs(),
            })?
    }

    async fn poll_until_terminal(&self, id: u64, poll_interval: Duration) -> Result<WorkflowRun> {
        loop {
            let run = self.backend.get_run(id).await?;
            if run.status.is_terminal() {
                return Ok(run);
            }
            debug!(run_id = id, status = run.status.as_str(), "Waiting for run");
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        self.backend.list_open_pull_requests().await
    }

    pub async fn merge(&self, number: u64) -> Result<()> {
        self.backend.merge_pull_request(number).await
    }

    pub async fn close(&self, number: u64) -> Result<()> {
        self.backend.close_pull_request(number).await
    }
}
