//! Domain models for Autopilot.
//!
//! Canonical definitions for the core entities:
//! - `Rule` / `Finding` / `Vulnerability`: what the scanner and audit produce
//! - `AgentReport`: result of one agent invocation
//! - `RunReport`: aggregate result of one orchestrator run

pub mod error;
pub mod finding;
pub mod report;

// Re-export main types and errors
pub use error::{AutopilotError, Result, RunnerError};
pub use finding::{Finding, FindingKind, Rule, Severity, Vulnerability};
pub use report::{
    AgentOutcome, AgentRecord, AgentReport, AgentStatus, FixOutcome, Phase, RunReport, RunStatus,
    RunSummary, TraceStep,
};
