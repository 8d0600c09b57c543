//! Remote workflow runs and their status.

use autopilot_core::RunStatus;
use serde::{Deserialize, Serialize};

/// Status of a remote workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Map GitHub's `status` / `conclusion` pair.
    ///
    /// A completed run without a recognised successful conclusion counts as
    /// failed.
    pub fn from_github(status: &str, conclusion: Option<&str>) -> Self {
        match status {
            "completed" => match conclusion {
                Some("success") | Some("neutral") => WorkflowStatus::Succeeded,
                Some("cancelled") | Some("skipped") => WorkflowStatus::Cancelled,
                _ => WorkflowStatus::Failed,
            },
            "queued" | "requested" | "waiting" | "pending" => WorkflowStatus::Queued,
            _ => WorkflowStatus::Running,
        }
    }

    /// The status shape shared with in-process runs.
    pub fn run_status(&self) -> RunStatus {
        match self {
            WorkflowStatus::Queued | WorkflowStatus::Running => RunStatus::InProgress,
            WorkflowStatus::Succeeded => RunStatus::Succeeded,
            WorkflowStatus::Failed => RunStatus::Failed,
            WorkflowStatus::Cancelled => RunStatus::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.run_status().is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Queued => "queued",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Succeeded => "succeeded",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

/// One remote run of an agent's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub agent_name: String,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

impl WorkflowRun {
    pub fn run_status(&self) -> RunStatus {
        self.status.run_status()
    }
}
