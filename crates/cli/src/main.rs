// SPDX-License-Identifier: MIT

//! `akctl`: wires the Journal, Permission Engine, Tool Runtime and Kernel
//! crates into a runnable, single-process session.

mod approval;
mod config;
mod exit_error;
mod manifests;
mod plan_file;

use ak_core::{Clock, ExecutionMode, Limits, Session, SystemClock};
use ak_journal::{Journal, JournalOptions};
use ak_kernel::{AbortHandle, Kernel, ScriptedPlanner};
use ak_permissions::PermissionEngine;
use ak_tools::{Policy, ShellHandler, ToolRuntime};
use anyhow::Context;
use clap::Parser;
use config::ApprovalMode;
use exit_error::ExitError;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "akctl", about = "Run and inspect task-kernel sessions")]
struct Cli {
    /// Path to a TOML config file. Defaults to the platform config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run a task to completion against a literal plan file.
    Run {
        /// Human-readable description of the task, stored on the session.
        #[arg(long)]
        task: String,
        /// JSON file of steps. See `plan_file` for the expected shape.
        #[arg(long)]
        plan: PathBuf,
        /// Execution mode for every step in this run.
        #[arg(long, value_enum, default_value = "mock")]
        mode: ModeArg,
        /// Keep planning after the plan file's steps finish, stopping only
        /// on an empty plan. Without this flag the run is single-shot.
        #[arg(long)]
        agentic: bool,
        #[arg(long)]
        max_tokens: Option<u64>,
        #[arg(long)]
        max_iterations: Option<u32>,
        #[arg(long)]
        max_steps: Option<u32>,
        #[arg(long)]
        policy_profile: Option<String>,
        /// Command basenames the shell tool is allowed to run.
        #[arg(long = "allow-command")]
        allowed_commands: Vec<String>,
        /// Overrides the config file's approval_mode for this run.
        #[arg(long, value_enum)]
        approval_mode: Option<ApprovalMode>,
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Verify the journal's hash chain is unbroken.
    Verify,
    /// Report whether the journal's directory is writable, with free space.
    Health,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
enum ModeArg {
    #[default]
    Mock,
    DryRun,
    Live,
}

impl From<ModeArg> for ExecutionMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Mock => ExecutionMode::Mock,
            ModeArg::DryRun => ExecutionMode::DryRun,
            ModeArg::Live => ExecutionMode::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        if let Some(exit) = error.downcast_ref::<ExitError>() {
            eprintln!("error: {exit}");
            std::process::exit(exit.code);
        }
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Command::Run {
            task,
            plan,
            mode,
            agentic,
            max_tokens,
            max_iterations,
            max_steps,
            policy_profile,
            allowed_commands,
            approval_mode,
            output,
        } => {
            let mut config = config;
            if let Some(approval_mode) = approval_mode {
                config.approval_mode = approval_mode;
            }
            run_session(RunArgs {
                config,
                task,
                plan,
                mode: mode.into(),
                agentic,
                max_tokens,
                max_iterations,
                max_steps,
                policy_profile,
                allowed_commands,
                output,
            })
            .await
        }
        Command::Verify => verify(&config),
        Command::Health => health(&config),
    }
}

struct RunArgs {
    config: config::KernelConfig,
    task: String,
    plan: PathBuf,
    mode: ExecutionMode,
    agentic: bool,
    max_tokens: Option<u64>,
    max_iterations: Option<u32>,
    max_steps: Option<u32>,
    policy_profile: Option<String>,
    allowed_commands: Vec<String>,
    output: OutputFormat,
}

async fn run_session(args: RunArgs) -> anyhow::Result<()> {
    let options = JournalOptions {
        fsync: args.config.fsync,
        redact: args.config.redact,
        patterns: ak_core::compile_default_patterns().into_iter().map(Arc::new).collect(),
    };
    let journal = Arc::new(
        Journal::init(args.config.journal_path.clone(), options)
            .with_context(|| format!("opening journal at {}", args.config.journal_path.display()))?,
    );

    let approval: Box<dyn ak_permissions::ApprovalCallback + Send + Sync> = match args.config.approval_mode {
        ApprovalMode::AutoDeny => Box::new(approval::AutoDeny),
        ApprovalMode::Interactive => {
            if !std::io::stdin().is_terminal() {
                return Err(ExitError::config(
                    "approval_mode = interactive requires a TTY on stdin; use auto_deny for non-interactive runs",
                )
                .into());
            }
            Box::new(approval::Interactive)
        }
    };
    let permissions = Arc::new(PermissionEngine::new(approval));

    let manifest_map = manifests::load(args.config.tool_manifest_dir.as_deref())?;
    let tools = Arc::new(ToolRuntime::new(manifest_map, permissions.clone(), journal.clone()));
    tools.register_handler("shell", Arc::new(ShellHandler::new()));

    let clock = Arc::new(SystemClock);
    let created_at_ms = clock.epoch_ms();
    let plan = plan_file::load(&args.plan, &args.task, created_at_ms)?;

    let mut script = vec![Ok((plan, ak_core::PlannerUsage::default()))];
    if args.agentic {
        script.push(Ok((empty_plan(&args.task, created_at_ms), ak_core::PlannerUsage::default())));
    }
    let planner: Box<dyn ak_kernel::Planner> = Box::new(ScriptedPlanner::new(script));

    let limits = Limits {
        max_tokens: args.max_tokens.or(args.config.max_tokens),
        max_cost_usd: args.config.max_cost_usd,
        max_duration_ms: args.config.max_duration_ms,
        max_iterations: args.max_iterations.or(args.config.max_iterations),
        max_steps: args.max_steps.or(args.config.max_steps),
    };
    let policy_profile = args.policy_profile.unwrap_or_else(|| "default".to_string());
    let session = Session::new(args.task, created_at_ms, limits, policy_profile);

    let policy = Policy { allowed_commands: args.allowed_commands, ..Policy::default() };

    let kernel = Kernel::new(journal.clone(), permissions, tools, planner);
    let (finished, findings) = kernel
        .run(session, args.mode, args.agentic, policy, AbortHandle::new())
        .await
        .map_err(|e| anyhow::Error::new(ExitError::session_failed(format!("session could not be journaled: {e}"))))?;

    match args.output {
        OutputFormat::Text => {
            println!("session {} finished: {}", finished.id, finished.status);
            for finding in &findings {
                println!(
                    "  [{}] {} -> {}",
                    if finding.succeeded { "ok" } else { "FAIL" },
                    finding.tool,
                    finding.output
                );
            }
        }
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "session_id": finished.id.to_string(),
                "status": finished.status.to_string(),
                "aggregates": finished.aggregates,
                "findings": findings.iter().map(|f| serde_json::json!({
                    "step_id": f.step_id,
                    "tool": f.tool,
                    "succeeded": f.succeeded,
                    "output": f.output,
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    if finished.status == ak_core::SessionStatus::Failed {
        return Err(ExitError::session_failed(format!("session {} failed", finished.id)).into());
    }
    Ok(())
}

fn empty_plan(goal: &str, created_at_ms: u64) -> ak_core::Plan {
    ak_core::Plan {
        id: ak_core::PlanId::new(),
        schema_version: 1,
        goal: goal.to_string(),
        assumptions: vec![],
        steps: vec![],
        created_at_ms,
    }
}

fn verify(config: &config::KernelConfig) -> anyhow::Result<()> {
    let journal = Journal::init(config.journal_path.clone(), JournalOptions::default())
        .with_context(|| format!("opening journal at {}", config.journal_path.display()))?;
    match journal.verify_integrity()? {
        ak_journal::IntegrityReport::Valid => {
            println!("journal is intact");
            Ok(())
        }
        ak_journal::IntegrityReport::BrokenAt(seq) => {
            Err(ExitError::new(1, format!("hash chain broken at sequence {seq}")).into())
        }
    }
}

fn health(config: &config::KernelConfig) -> anyhow::Result<()> {
    let journal = Journal::init(config.journal_path.clone(), JournalOptions::default())
        .with_context(|| format!("opening journal at {}", config.journal_path.display()))?;
    let report = journal.check_health();
    println!("writable: {}", report.writable);
    if let (Some(free), Some(total)) = (report.free_bytes, report.total_bytes) {
        println!("free space: {free} / {total} bytes");
    }
    if !report.writable {
        return Err(ExitError::new(1, "journal directory is not writable").into());
    }
    Ok(())
}
