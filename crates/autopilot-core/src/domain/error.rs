//! Domain-level error taxonomy for Autopilot.

/// Errors raised at the process boundary by a [`CommandRunner`].
///
/// A non-zero exit status is *not* an error; it is reported through
/// [`CommandResult::exit_success`]. These variants cover environment-level
/// failures only.
///
/// [`CommandRunner`]: crate::runner::CommandRunner
/// [`CommandResult::exit_success`]: crate::runner::CommandResult::exit_success
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("command not found: {command}")]
    NotFound { command: String },

    #[error("command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Autopilot domain errors.
#[derive(Debug, thiserror::Error)]
pub enum AutopilotError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid rule {name}: {reason}")]
    InvalidRule { name: String, reason: String },

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent {agent} failed: {reason}")]
    AgentFailed { agent: String, reason: String },

    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Autopilot domain operations.
pub type Result<T> = std::result::Result<T, AutopilotError>;
