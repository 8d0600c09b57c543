//! Maintenance agents.
//!
//! An [`Agent`] is a self-contained routine (scan, optional fix, verify,
//! report) with a uniform `run(context) -> AgentReport` contract, so the
//! orchestrator can drive any agent without knowing its internals.

pub mod audit;
pub mod maintenance;
pub mod security;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AutopilotConfig;
use crate::domain::{AgentReport, Result, RunnerError};
use crate::runner::{CommandResult, CommandRunner, RunOptions};
use crate::safety::RollbackPlan;

pub use maintenance::MaintenanceAgent;
pub use security::SecurityAgent;

/// Registered name of the built-in security agent.
pub const SECURITY_AGENT_NAME: &str = "security";

/// Everything an agent may use to touch the outside world.
#[derive(Clone)]
pub struct AgentContext {
    project_root: PathBuf,
    test_command: String,
    runner: Arc<dyn CommandRunner>,
}

impl AgentContext {
    pub fn new(
        project_root: impl Into<PathBuf>,
        test_command: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            test_command: test_command.into(),
            runner,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn test_command(&self) -> &str {
        &self.test_command
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Options that run a command in the project root.
    pub fn run_options(&self) -> RunOptions {
        RunOptions::in_dir(&self.project_root)
    }

    /// Run an arbitrary command in the project root.
    pub async fn run_command(&self, command: &str) -> std::result::Result<CommandResult, RunnerError> {
        self.runner.run(command, &self.run_options()).await
    }

    /// Run the project's test suite.
    pub async fn run_tests(&self) -> std::result::Result<CommandResult, RunnerError> {
        self.run_command(&self.test_command).await
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("project_root", &self.project_root)
            .field("test_command", &self.test_command)
            .finish_non_exhaustive()
    }
}

/// A maintenance routine the orchestrator can run.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique registered name.
    fn name(&self) -> &str;

    /// One-line description for listings.
    fn description(&self) -> &str {
        ""
    }

    /// How to undo anything this agent may have changed.
    fn rollback_plan(&self) -> RollbackPlan {
        RollbackPlan::default()
    }

    /// Run to completion. An `Err` is a fatal agent failure; verification
    /// failures are reported through the returned report instead.
    async fn run(&self, ctx: &AgentContext) -> Result<AgentReport>;
}

/// Build the configured agents: security first, then maintenance agents in
/// configuration order.
pub fn build_agents(config: &AutopilotConfig) -> Result<Vec<Arc<dyn Agent>>> {
    let mut agents: Vec<Arc<dyn Agent>> = vec![Arc::new(SecurityAgent::from_config(config)?)];
    for maintenance in &config.maintenance {
        agents.push(Arc::new(MaintenanceAgent::new(maintenance.clone())));
    }
    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaintenanceConfig;
    use crate::fakes::ScriptedRunner;

    #[test]
    fn build_agents_registers_security_then_maintenance() {
        let mut config = AutopilotConfig::default();
        config.maintenance.push(MaintenanceConfig {
            name: "format".to_string(),
            check_command: Some("npx prettier --check .".to_string()),
            fix_command: "npx prettier --write .".to_string(),
            rollback_paths: vec!["src".to_string()],
            install_command: None,
        });

        let agents = build_agents(&config).unwrap();
        let names: Vec<_> = agents.iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec![SECURITY_AGENT_NAME, "format"]);
    }

    #[tokio::test]
    async fn context_runs_tests_with_configured_command() {
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = AgentContext::new("/repo", "yarn test", runner.clone());
        ctx.run_tests().await.unwrap();
        assert_eq!(runner.calls(), vec!["yarn test"]);
        assert_eq!(ctx.run_options().cwd.as_deref(), Some(Path::new("/repo")));
    }
}
