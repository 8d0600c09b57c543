//! Autopilot CLI
//!
//! The `autopilot` command runs maintenance agents against a project behind a
//! verify-before-keep safety gate, and drives their remote counterparts.
//!
//! ## Commands
//!
//! - `run`: run agents locally and report
//! - `scan`: run the pattern scanner only
//! - `agents`: list registered agents
//! - `workflow`: trigger and poll remote agent runs
//! - `pr`: list, merge and close autonomous pull requests

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn, Level};

use autopilot_ci::{Coordinator, GitHubBackend, GitHubConfig, WorkflowRun};
use autopilot_core::{
    anti_pattern_rule_set, build_agents, render_run_report_md, secret_rule_set,
    write_run_report_json, write_run_report_md, AutopilotConfig, Finding, Orchestrator,
    PatternScanner, ShellRunner, DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "autopilot")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Autonomous maintenance agents with verified fixes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: <root>/autopilot.toml)
    #[arg(short, long, global = true, env = "AUTOPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Project root; overrides `project_root` from the config
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run agents against the project
    Run {
        /// Agent to run (repeatable; default: all)
        #[arg(short, long = "agent")]
        agents: Vec<String>,

        /// Write the run report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Write the run report as markdown
        #[arg(long)]
        report_md: Option<PathBuf>,
    },

    /// Scan for secrets and anti-patterns without running agents
    Scan {
        /// Only the secret rule set
        #[arg(long, conflicts_with = "patterns")]
        secrets: bool,

        /// Only the anti-pattern rule set
        #[arg(long)]
        patterns: bool,
    },

    /// List registered agents
    Agents,

    /// Remote agent runs
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Autonomous pull requests
    Pr {
        #[command(subcommand)]
        action: PrAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Dispatch the workflow mapped to an agent
    Trigger { agent: String },

    /// Show a run's status
    Status { id: u64 },

    /// Poll a run until it finishes
    Wait {
        id: u64,

        /// Seconds between polls
        #[arg(long, default_value = "10")]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long, default_value = "3600")]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum PrAction {
    /// List open autonomous pull requests
    List,

    /// Merge a pull request
    Merge { number: u64 },

    /// Close a pull request without merging
    Close { number: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autopilot_core::init_tracing(cli.json, level);

    let config_path = config_path(&cli);

    match cli.command {
        Commands::Run {
            ref agents,
            ref report_json,
            ref report_md,
        } => {
            let config = load_config(&cli, &config_path)?;
            cmd_run(&config, agents, report_json.as_deref(), report_md.as_deref()).await
        }
        Commands::Scan { secrets, patterns } => {
            let config = load_config(&cli, &config_path)?;
            cmd_scan(&config, secrets, patterns).await
        }
        Commands::Agents => cmd_agents(&load_config(&cli, &config_path)?),
        Commands::Workflow { ref action } => {
            let coordinator = coordinator(&config_path)?;
            match action {
                WorkflowAction::Trigger { agent } => {
                    let run = coordinator.trigger(agent).await?;
                    print_run(&run);
                    Ok(())
                }
                WorkflowAction::Status { id } => {
                    print_run(&coordinator.status(*id).await?);
                    Ok(())
                }
                WorkflowAction::Wait {
                    id,
                    interval,
                    timeout,
                } => {
                    let run = coordinator
                        .wait_for_completion(
                            *id,
                            Duration::from_secs(*interval),
                            Duration::from_secs(*timeout),
                        )
                        .await?;
                    print_run(&run);
                    if run.status.run_status() != autopilot_core::RunStatus::Succeeded {
                        anyhow::bail!("Workflow run {} did not succeed", run.id);
                    }
                    Ok(())
                }
            }
        }
        Commands::Pr { ref action } => {
            let coordinator = coordinator(&config_path)?;
            match action {
                PrAction::List => {
                    let pulls = coordinator.open_pull_requests().await?;
                    if pulls.is_empty() {
                        println!("No open autopilot pull requests.");
                    }
                    for pr in pulls {
                        println!("#{:<6} {:<32} {}", pr.number, pr.head_branch, pr.title);
                    }
                    Ok(())
                }
                PrAction::Merge { number } => {
                    coordinator.merge(*number).await?;
                    println!("Merged #{}", number);
                    Ok(())
                }
                PrAction::Close { number } => {
                    coordinator.close(*number).await?;
                    println!("Closed #{}", number);
                    Ok(())
                }
            }
        }
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    match &cli.config {
        Some(path) => path.clone(),
        None => cli
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE),
    }
}

/// An explicitly named config must exist; the default one is optional.
fn load_config(cli: &Cli, path: &Path) -> Result<AutopilotConfig> {
    let mut config = if cli.config.is_some() {
        AutopilotConfig::load(path)
    } else {
        AutopilotConfig::load_or_default(path)
    }
    .with_context(|| format!("Failed to load config {:?}", path))?;

    if let Some(root) = &cli.root {
        config.project_root = root.clone();
    }
    Ok(config)
}

fn coordinator(config_path: &Path) -> Result<Coordinator> {
    let config = GitHubConfig::load(config_path)
        .with_context(|| format!("Failed to load [github] from {:?}", config_path))?;
    let agents = config.agent_names();
    let backend = GitHubBackend::from_env(config)?;
    Ok(Coordinator::new(Arc::new(backend), agents))
}

async fn cmd_run(
    config: &AutopilotConfig,
    agents: &[String],
    report_json: Option<&Path>,
    report_md: Option<&Path>,
) -> Result<()> {
    info!(
        version = autopilot_core::VERSION,
        root = %config.project_root.display(),
        "Starting autopilot run"
    );

    let runner = Arc::new(ShellRunner::new(
        &config.project_root,
        config.command_timeout_secs,
    ));

    // Ctrl-C stops the run before the next agent starts; a second one exits.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut interrupts = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            interrupts += 1;
            match on_interrupt(interrupts, &cancel_tx) {
                Interrupt::Stop => warn!("Interrupt received; stopping after the current agent"),
                Interrupt::Exit => {
                    warn!("Second interrupt; exiting now");
                    std::process::exit(130);
                }
            }
        }
    });

    let orchestrator = Orchestrator::from_config(config, runner)
        .context("Failed to set up agents")?
        .with_cancellation(cancel_rx);
    let report = orchestrator.run_agents(agents).await?;

    if let Some(path) = report_json {
        write_run_report_json(path, &report)?;
        info!(path = %path.display(), "Wrote JSON report");
    }
    if let Some(path) = report_md {
        write_run_report_md(path, &report)?;
        info!(path = %path.display(), "Wrote markdown report");
    }

    print!("{}", render_run_report_md(&report));

    let summary = report.summary();
    if !summary.pass {
        anyhow::bail!("Autopilot run {} did not pass", summary.status.as_str());
    }
    Ok(())
}

async fn cmd_scan(config: &AutopilotConfig, secrets_only: bool, patterns_only: bool) -> Result<()> {
    let scanner = PatternScanner::from_patterns(&config.skip)?;
    let mut rule_sets = Vec::new();
    if !patterns_only {
        rule_sets.push(secret_rule_set(&config.secrets)?);
    }
    if !secrets_only {
        rule_sets.push(anti_pattern_rule_set(&config.anti_patterns)?);
    }

    let root = config.project_root.clone();
    let findings: Vec<Finding> =
        tokio::task::spawn_blocking(move || scanner.scan_all(&root, &rule_sets))
            .await
            .context("Scan task failed")?;

    for f in &findings {
        println!(
            "{}:{}\t{:<8}\t{}\t{}",
            f.file,
            f.line,
            f.severity.as_str(),
            f.rule_name,
            f.excerpt
        );
    }
    println!("{} finding(s)", findings.len());
    Ok(())
}

fn cmd_agents(config: &AutopilotConfig) -> Result<()> {
    for agent in build_agents(config)? {
        println!("{:<16} {}", agent.name(), agent.description());
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Stop,
    Exit,
}

fn on_interrupt(count: u32, cancel: &watch::Sender<bool>) -> Interrupt {
    if count > 1 {
        return Interrupt::Exit;
    }
    let _ = cancel.send(true);
    Interrupt::Stop
}

fn print_run(run: &WorkflowRun) {
    println!(
        "run {}  agent={}  status={}",
        run.id,
        run.agent_name,
        run.status.as_str()
    );
    if let Some(url) = &run.html_url {
        println!("{}", url);
    }
}
