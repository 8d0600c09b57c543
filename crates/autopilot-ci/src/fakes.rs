//! In-memory CI backend (testing only)
//!
//! `MemoryCiBackend` keeps runs and pull requests in a mutex-guarded map.
//! Each run can be given a sequence of statuses that `get_run` steps
//! through, which makes polling code testable without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::CiBackend;
use crate::error::{CiError, Result};
use crate::pull_request::{PrStatus, PullRequest};
use crate::workflow::{WorkflowRun, WorkflowStatus};

#[derive(Debug, Default)]
struct State {
    next_run_id: u64,
    runs: BTreeMap<u64, WorkflowRun>,
    /// Statuses applied one per `get_run` call.
    progressions: BTreeMap<u64, VecDeque<WorkflowStatus>>,
    pulls: BTreeMap<u64, PullRequest>,
    dispatched: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryCiBackend {
    state: Mutex<State>,
}

impl MemoryCiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an open pull request on `head_branch`.
    pub fn add_pull_request(&self, number: u64, title: &str, head_branch: &str) {
        self.state.lock().unwrap().pulls.insert(
            number,
            PullRequest {
                number,
                title: title.to_string(),
                head_branch: head_branch.to_string(),
                status: PrStatus::Open,
                html_url: None,
            },
        );
    }

    /// Queue the statuses successive `get_run(id)` calls will observe.
    pub fn script_run(&self, id: u64, statuses: Vec<WorkflowStatus>) {
        self.state
            .lock()
            .unwrap()
            .progressions
            .insert(id, statuses.into());
    }

    pub fn pull_request(&self, number: u64) -> Option<PullRequest> {
        self.state.lock().unwrap().pulls.get(&number).cloned()
    }

    /// Agent names dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<String> {
        self.state.lock().unwrap().dispatched.clone()
    }

    fn transition(&self, number: u64, to: PrStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let pr = state
            .pulls
            .get_mut(&number)
            .ok_or(CiError::PullRequestNotFound(number))?;
        if !pr.is_open() {
            return Err(CiError::PullRequestNotOpen(number));
        }
        pr.status = to;
        Ok(())
    }
}

#[async_trait]
impl CiBackend for MemoryCiBackend {
    async fn dispatch(&self, agent: &str) -> Result<WorkflowRun> {
        let mut state = self.state.lock().unwrap();
        state.next_run_id += 1;
        let run = WorkflowRun {
            id: state.next_run_id,
            agent_name: agent.to_string(),
            status: WorkflowStatus::Queued,
            html_url: None,
        };
        state.runs.insert(run.id, run.clone());
        state.dispatched.push(agent.to_string());
        Ok(run)
    }

    async fn get_run(&self, id: u64) -> Result<WorkflowRun> {
        let mut state = self.state.lock().unwrap();
        let next = state.progressions.get_mut(&id).and_then(|q| q.pop_front());
        let run = state.runs.get_mut(&id).ok_or(CiError::RunNotFound(id))?;
        if let Some(status) = next {
            run.status = status;
        }
        Ok(run.clone())
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<PullRequest>> {
        let state = self.state.lock().unwrap();
        Ok(state.pulls.values().filter(|pr| pr.is_open()).cloned().collect())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        self.transition(number, PrStatus::Merged)
    }

    async fn close_pull_request(&self, number: u64) -> Result<()> {
        self.transition(number, PrStatus::Closed)
    }
}
