//! In-memory fakes for the process boundary (testing only)
//!
//! Provides `ScriptedRunner`, a `CommandRunner` that answers from a script
//! instead of spawning processes and records every command it was asked to
//! run.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::RunnerError;
use crate::runner::{CommandResult, CommandRunner, RunOptions};

#[derive(Debug, Clone)]
enum Scripted {
    Result(CommandResult),
    NotFound,
}

/// Command runner driven by prefix-matched scripted responses.
///
/// Commands without a matching script succeed with empty output. When
/// several prefixes match, the first registered wins; re-registering a
/// prefix replaces its response. The project root reports itself as a git
/// work tree unless [`ScriptedRunner::outside_work_tree`] is used.
#[derive(Debug)]
pub struct ScriptedRunner {
    script: Mutex<Vec<(String, Scripted)>>,
    calls: Mutex<Vec<String>>,
}

const WORK_TREE_CHECK: &str = "git rev-parse --is-inside-work-tree";

impl Default for ScriptedRunner {
    fn default() -> Self {
        let runner = Self {
            script: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        };
        runner.respond(WORK_TREE_CHECK, CommandResult::success("", "true\n"));
        runner
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the work-tree check as git does outside a repository.
    pub fn outside_work_tree(self) -> Self {
        self.respond(
            WORK_TREE_CHECK,
            CommandResult::failure("", "fatal: not a git repository"),
        );
        self
    }

    /// Answer commands starting with `prefix` with `result`.
    pub fn respond(&self, prefix: &str, result: CommandResult) {
        self.set(prefix, Scripted::Result(result));
    }

    /// Fail commands starting with `prefix` as if the binary were missing.
    pub fn fail_with_not_found(&self, prefix: &str) {
        self.set(prefix, Scripted::NotFound);
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any recorded command starts with `prefix`.
    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c.starts_with(prefix))
    }

    fn set(&self, prefix: &str, response: Scripted) {
        let mut script = self.script.lock().unwrap();
        match script.iter_mut().find(|(p, _)| p == prefix) {
            Some(entry) => entry.1 = response,
            None => script.push((prefix.to_string(), response)),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &str,
        _options: &RunOptions,
    ) -> Result<CommandResult, RunnerError> {
        self.calls.lock().unwrap().push(command.to_string());

        let scripted = self
            .script
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, s)| s.clone());

        match scripted {
            Some(Scripted::Result(mut result)) => {
                result.command = command.to_string();
                Ok(result)
            }
            Some(Scripted::NotFound) => Err(RunnerError::NotFound {
                command: command.to_string(),
            }),
            None => Ok(CommandResult::success(command, "")),
        }
    }
}
