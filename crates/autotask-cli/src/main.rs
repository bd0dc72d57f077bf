use std::sync::Arc;

use anyhow::Context;
use autotask_core::AutotaskConfig;
use autotask_schedule::CronPattern;
use autotask_store::{TaskEntry, TaskStatus, TaskStore};
use autotask_supervisor::{listen, CommandProcessManager, Role, Supervisor};
use autotask_tasks::{DelayedOptions, PeriodicOptions, TaskArgs, TaskTarget, Tasks};
use chrono::TimeDelta;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

mod builtin;

#[derive(Parser, Debug)]
#[command(name = "autotask")]
#[command(about = "Database-backed task queue: supervisor, workers and queue inspection")]
#[command(version)]
struct Cli {
    /// Config file path (default ~/.autotask/autotask.toml).
    #[arg(short, long, global = true, env = "AUTOTASK_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Become the leader for this database and run the worker pool.
    Supervisor,
    /// Run one task-handler loop; normally spawned by the supervisor.
    Worker,
    /// Print every task entry.
    List {
        /// Only entries with this status.
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Enqueue a call to a registered task.
    Enqueue {
        /// Target as `module.function`, e.g. `autotask.builtin.echo`.
        target: String,
        /// Positional arguments as JSON values.
        #[arg(long = "arg")]
        args: Vec<String>,
        /// Seconds before the first attempt.
        #[arg(long, default_value_t = 0)]
        delay: i64,
        #[arg(long, default_value_t = 0)]
        retries: u32,
        /// Re-run every N seconds instead of once.
        #[arg(long, conflicts_with_all = ["cron", "delay", "retries"])]
        every: Option<i64>,
        /// Five-field crontab expression instead of a one-shot run.
        #[arg(long, conflicts_with_all = ["delay", "retries"])]
        cron: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autotask=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AutotaskConfig::load(cli.config.as_deref())
        .with_context(|| format!("loading config {:?}", cli.config))?;

    match cli.command {
        Command::Supervisor => run_supervisor(&config, cli.config.as_deref()).await,
        Command::Worker => run_worker(&config).await,
        Command::List { status } => list(&config, status),
        Command::Enqueue {
            target,
            args,
            delay,
            retries,
            every,
            cron,
        } => enqueue(&config, &target, &args, delay, retries, every, cron.as_deref()),
    }
}

async fn run_supervisor(config: &AutotaskConfig, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut manager = CommandProcessManager::from_config(config)?;
    if let (Some(path), None) = (config_path, &config.worker.executable) {
        // re-executed workers must read the same file
        manager = manager.with_leading_args(["--config".to_string(), path.to_string()]);
    }

    let store = Arc::new(TaskStore::open(&config.database)?);
    let cancel = CancellationToken::new();
    let _signals = listen(Role::Supervisor, cancel.clone());

    let led = Supervisor::from_config(config, store, manager)
        .run(cancel)
        .await?;
    if !led {
        info!("exiting, another supervisor owns this database");
    }
    Ok(())
}

async fn run_worker(config: &AutotaskConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let _signals = listen(Role::Worker, cancel.clone());
    autotask_worker::run_worker(config, builtin::registry(), cancel).await?;
    Ok(())
}

fn list(config: &AutotaskConfig, status: Option<TaskStatus>) -> anyhow::Result<()> {
    let store = TaskStore::open(&config.database)?;
    let entries: Vec<TaskEntry> = store
        .list()?
        .into_iter()
        .filter(|e| status.map_or(true, |s| e.status == s))
        .collect();

    println!(
        "{:<36}  {:<17}  {:<8}  {:<27}  {:>7}  {}",
        "ID", "STATUS", "KIND", "SCHEDULED", "RETRIES", "TASK"
    );
    for e in &entries {
        let kind = if e.is_leader_marker() {
            "marker"
        } else if e.is_cron() {
            "cron"
        } else if e.is_periodic {
            "periodic"
        } else {
            "once"
        };
        println!(
            "{:<36}  {:<17}  {:<8}  {:<27}  {:>7}  {}",
            e.id,
            e.status,
            kind,
            autotask_core::time::format_ts(e.scheduled_at),
            e.retries,
            e.display_name()
        );
        if !e.error_message.is_empty() {
            println!("    error: {}", e.error_message);
        }
    }
    println!("{} task(s)", entries.len());
    Ok(())
}

fn enqueue(
    config: &AutotaskConfig,
    target: &str,
    raw_args: &[String],
    delay: i64,
    retries: u32,
    every: Option<i64>,
    cron: Option<&str>,
) -> anyhow::Result<()> {
    let (module, function) = target
        .rsplit_once('.')
        .with_context(|| format!("target {target:?} is not module.function"))?;
    let target = TaskTarget::new(module, function);

    let mut args = TaskArgs::new();
    for raw in raw_args {
        let value: serde_json::Value =
            serde_json::from_str(raw).with_context(|| format!("--arg {raw:?} is not JSON"))?;
        args = args.arg(value);
    }

    let tasks = Tasks::new(Arc::new(TaskStore::open(&config.database)?));
    let handle = match (every, cron) {
        (Some(secs), _) => tasks.periodic(
            target,
            PeriodicOptions {
                interval: TimeDelta::seconds(secs),
                start_now: true,
            },
            args,
        )?,
        (None, Some(expr)) => tasks.cron(target, &CronPattern::parse(expr)?, args)?,
        (None, None) => Some(
            tasks
                .delayed(
                    target,
                    DelayedOptions {
                        delay: TimeDelta::seconds(delay),
                        retries,
                        ..Default::default()
                    },
                )?
                .call(args)?,
        ),
    };

    match handle {
        Some(handle) => println!("{}", handle.id()),
        None => println!("already registered"),
    }
    Ok(())
}
