//! The CI/VCS boundary.

use async_trait::async_trait;

use crate::error::Result;
use crate::pull_request::PullRequest;
use crate::workflow::WorkflowRun;

/// Remote CI and pull request operations.
///
/// Implementations are thin pass-throughs; the coordinator adds validation
/// and polling on top.
#[async_trait]
pub trait CiBackend: Send + Sync {
    /// Start the workflow mapped to `agent` and return the new run.
    async fn dispatch(&self, agent: &str) -> Result<WorkflowRun>;

    async fn get_run(&self, id: u64) -> Result<WorkflowRun>;

    /// Open pull requests created by autonomous runs.
    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>>;

    async fn merge_pull_request(&self, number: u64) -> Result<()>;

    async fn close_pull_request(&self, number: u64) -> Result<()>;
}
