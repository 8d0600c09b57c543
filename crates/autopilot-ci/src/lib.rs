//! Autopilot CI - remote agent runs and autonomous pull requests
//!
//! Provides the boundary the dashboard uses to:
//! - Trigger an agent as a remote workflow and poll its status
//! - List, merge and close the pull requests those runs open
//!
//! Remote statuses map onto the core `RunStatus`, so local and remote runs
//! summarise the same way.

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod fakes;
pub mod github;
pub mod pull_request;
pub mod workflow;

// Re-export key types
pub use backend::CiBackend;
pub use coordinator::Coordinator;
pub use error::{CiError, Result};
pub use github::{GitHubBackend, GitHubConfig};
pub use pull_request::{PrStatus, PullRequest};
pub use workflow::{WorkflowRun, WorkflowStatus};
