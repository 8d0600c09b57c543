//! Orchestrator and safety controller.
//!
//! Runs the selected agents one after another against the single shared
//! workspace and folds their outcomes into a [`RunReport`]. Each agent runs
//! in its own task so an `Err` or a panic becomes a failed record instead of
//! ending the run. After each agent the verify-before-keep invariant is
//! re-checked via [`safety::enforce_verified`].

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::Instrument;

use crate::agent::{build_agents, Agent, AgentContext};
use crate::config::AutopilotConfig;
use crate::domain::{AgentRecord, AutopilotError, Result, RunReport};
use crate::git;
use crate::obs;
use crate::runner::CommandRunner;
use crate::safety;

pub struct Orchestrator {
    agents: Vec<Arc<dyn Agent>>,
    ctx: AgentContext,
    config_digest: String,
    cancel: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    pub fn new(agents: Vec<Arc<dyn Agent>>, ctx: AgentContext) -> Self {
        Self {
            agents,
            ctx,
            config_digest: String::new(),
            cancel: None,
        }
    }

    /// Register every configured agent, running commands through `runner`.
    pub fn from_config(config: &AutopilotConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let ctx = AgentContext::new(&config.project_root, &config.test_command, runner);
        Ok(Self::new(build_agents(config)?, ctx).with_config_digest(config.digest()?))
    }

    pub fn with_config_digest(mut self, digest: impl Into<String>) -> Self {
        self.config_digest = digest.into();
        self
    }

    /// Stop before the next agent once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn agents(&self) -> &[Arc<dyn Agent>] {
        &self.agents
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    /// Run every registered agent.
    pub async fn run_all(&self) -> Result<RunReport> {
        self.run_agents(&[]).await
    }

    /// Run the agents named in `selection`, in registration order. An empty
    /// selection runs every agent.
    ///
    /// Unknown names are rejected before anything runs. Agent failures never
    /// surface here; they are recorded in the report.
    pub async fn run_agents(&self, selection: &[String]) -> Result<RunReport> {
        let selected = self.select(selection)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.execute(run_id, selected).instrument(span).await
    }

    fn select(&self, selection: &[String]) -> Result<Vec<Arc<dyn Agent>>> {
        if let Some(unknown) = selection
            .iter()
            .find(|name| !self.agents.iter().any(|a| a.name() == name.as_str()))
        {
            return Err(AutopilotError::UnknownAgent(unknown.clone()));
        }

        Ok(self
            .agents
            .iter()
            .filter(|a| selection.is_empty() || selection.iter().any(|n| n == a.name()))
            .cloned()
            .collect())
    }

    async fn execute(&self, run_id: String, selected: Vec<Arc<dyn Agent>>) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let names: Vec<String> = selected.iter().map(|a| a.name().to_string()).collect();
        obs::emit_run_started(&run_id, &names);

        let git_sha = git::head_sha(self.ctx.runner(), &self.ctx.run_options()).await;

        let mut records = Vec::with_capacity(selected.len());
        let mut partial = false;
        for (index, agent) in selected.iter().enumerate() {
            if self.is_cancelled() {
                obs::emit_run_cancelled(&run_id, index, selected.len() - index);
                partial = true;
                break;
            }
            records.push(self.run_one(Arc::clone(agent)).await);
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            git_sha,
            config_digest: self.config_digest.clone(),
            partial,
            records,
        };
        obs::emit_run_finished(
            &report.run_id,
            clock.elapsed().as_millis() as u64,
            &report.summary(),
        );
        Ok(report)
    }

    async fn run_one(&self, agent: Arc<dyn Agent>) -> AgentRecord {
        let name = agent.name().to_string();
        let plan = agent.rollback_plan();
        obs::emit_agent_started(&name);

        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move { agent.run(&ctx).await }.in_current_span());

        let mut report = match task.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                obs::emit_agent_failed(&name, &e);
                return AgentRecord::failed(name, e.to_string());
            }
            Err(join_error) => {
                let error = if join_error.is_panic() {
                    format!("agent panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    format!("agent task aborted: {join_error}")
                };
                obs::emit_agent_failed(&name, &error);
                return AgentRecord::failed(name, error);
            }
        };

        // Records are keyed by registered name regardless of what the agent
        // wrote into its report.
        report.agent_name = name.clone();
        safety::enforce_verified(&self.ctx, &plan, &mut report).await;

        obs::emit_agent_finished(
            &name,
            report.status(),
            report.findings.len(),
            report.changes_applied.len(),
        );
        AgentRecord::completed(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
