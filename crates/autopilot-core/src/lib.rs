//! Autopilot Core Library
//!
//! Scanner, command runner, agents and the orchestrator that drives them
//! behind a verify-before-keep safety gate.

pub mod agent;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod obs;
pub mod orchestrator;
pub mod reporting;
pub mod runner;
pub mod safety;
pub mod scanner;
pub mod telemetry;

pub use agent::{build_agents, Agent, AgentContext, MaintenanceAgent, SecurityAgent, SECURITY_AGENT_NAME};

pub use config::{
    AutopilotConfig, MaintenanceConfig, RuleConfig, RuleSetConfig, SecurityConfig,
    DEFAULT_CONFIG_FILE,
};

pub use domain::{
    AgentOutcome, AgentRecord, AgentReport, AgentStatus, AutopilotError, Finding, FindingKind,
    FixOutcome, Phase, Result, Rule, RunReport, RunStatus, RunSummary, RunnerError, Severity,
    TraceStep, Vulnerability,
};

pub use git::{head_sha, is_git_repo};

pub use orchestrator::Orchestrator;

pub use reporting::{render_run_report_md, write_run_report_json, write_run_report_md};

pub use runner::{CommandResult, CommandRunner, RunOptions, ShellRunner};

pub use safety::{guarded_fix, RollbackPlan};

pub use scanner::{
    anti_pattern_rule_set, scan, secret_rule_set, PatternScanner, RuleSet, ScanMode, ScanStats,
    SkipList,
};

pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
