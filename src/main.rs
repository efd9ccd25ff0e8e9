use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use mise::config::Config;
use mise::core::{Schedule, ScheduleCalculator, TaskGraph};
use mise::orchestration::{format_clock, LogNotifier, OrchestratorEvent, TimerOrchestrator};
use mise::steps::{load_steps, parse_target_time};
use mise::{Error, Result};

/// Mise - backward-scheduled cooking timers
#[derive(Parser, Debug)]
#[command(name = "mise")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    MISE_LOG=<filter>   Log filter, e.g. mise=debug\n    MISE_DEBUG=1        Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (written to stderr)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Check a step file for missing, duplicate or circular dependencies
    Validate {
        /// Step file (.toml or .json)
        file: PathBuf,
    },

    /// Print start times so every step finishes by the target time
    Plan {
        /// Step file (.toml or .json)
        file: PathBuf,

        /// Target completion time (RFC 3339 or HH:MM today)
        #[arg(long)]
        at: String,

        /// Seconds between a step's prerequisites finishing and the step starting
        #[arg(long)]
        buffer: Option<u64>,

        /// Print the schedule as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the timers live, auto-starting each step on schedule
    Run {
        /// Step file (.toml or .json)
        file: PathBuf,

        /// Target completion time (RFC 3339 or HH:MM today)
        #[arg(long)]
        at: String,

        /// Seconds between a step's prerequisites finishing and the step starting
        #[arg(long)]
        buffer: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    mise::log::init_with_debug(cli.debug);
    debug!(command = ?cli.command, "mise starting");

    match cli.command {
        Command::Validate { file } => run_validate(&file),
        Command::Plan {
            file,
            at,
            buffer,
            json,
        } => run_plan(&file, &at, buffer, json),
        Command::Run { file, at, buffer } => run_timers(&file, &at, buffer),
    }
}

fn load_config(buffer: Option<u64>) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(secs) = buffer {
        config.buffer_secs = secs;
    }
    Ok(config)
}

fn run_validate(file: &Path) -> Result<()> {
    let tasks = load_steps(file)?;
    if tasks.is_empty() {
        return Err(Error::NoTasks);
    }

    let graph = TaskGraph::assemble(&tasks);
    let issues = graph.validate();
    if !issues.is_empty() {
        return Err(Error::InvalidDependencies(issues));
    }

    let critical: Vec<String> = graph
        .critical_path()
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!(
        "{}: {} steps, {} dependencies",
        file.display(),
        graph.task_count(),
        graph.dependency_count()
    );
    println!(
        "Critical path: {} ({})",
        critical.join(" -> "),
        format_clock(graph.critical_path_duration())
    );
    Ok(())
}

fn run_plan(file: &Path, at: &str, buffer: Option<u64>, json: bool) -> Result<()> {
    let config = load_config(buffer)?;
    let tasks = load_steps(file)?;
    let target = parse_target_time(at, &Local::now())?;

    let schedule = ScheduleCalculator::new(config.buffer()).schedule(&tasks, target)?;
    if schedule.is_target_in_past(Utc::now()) {
        eprintln!("warning: target {} is already in the past", local_time(target));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&schedule)?);
        return Ok(());
    }

    print_plan(&schedule, &config);
    Ok(())
}

fn print_plan(schedule: &Schedule, config: &Config) {
    println!(
        "Target {}  (buffer {}s, critical path {})",
        local_time(schedule.target),
        schedule.buffer.num_seconds(),
        format_clock(schedule.critical_duration)
    );
    println!();
    println!("  {:<8}  {:<8}  {:<7}  {:<6}  STEP", "START", "END", "LENGTH", "KIND");
    for scheduled in &schedule.tasks {
        let marker = if schedule.is_critical(scheduled.id().as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<8}  {:<8}  {:<7}  {:<6}  {}",
            marker,
            local_time(scheduled.start),
            local_time(scheduled.end),
            format_clock(scheduled.duration()),
            scheduled.task.category.to_string(),
            scheduled.task.display_name()
        );
    }

    let groups: Vec<_> = schedule
        .parallel_groups(config.group_window())
        .into_iter()
        .filter(|group| group.len() > 1)
        .collect();
    if !groups.is_empty() {
        println!();
        println!("Together:");
        for group in groups {
            let ids: Vec<String> = group.ids().iter().map(|id| id.to_string()).collect();
            println!("  {}  {}", local_time(group.start), ids.join(", "));
        }
    }
    println!();
    println!("* critical path");
}

fn run_timers(file: &Path, at: &str, buffer: Option<u64>) -> Result<()> {
    let config = load_config(buffer)?;
    let tasks = load_steps(file)?;
    let target = parse_target_time(at, &Local::now())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let orchestrator = TimerOrchestrator::new(config.orchestrator())
            .with_notifier(Arc::new(LogNotifier));
        let mut events = orchestrator.subscribe();

        let schedule_id = orchestrator.load_schedule(tasks, target).await?;
        orchestrator.start_all().await?;
        info!(schedule = %schedule_id, "running");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let cancelled = orchestrator.cancel_all().await;
                    println!("Interrupted; cancelled {} timers", cancelled);
                    break;
                }
                event = events.recv() => {
                    match event {
                        Ok(OrchestratorEvent::AllTimersFinished { .. }) => {
                            println!("All steps done.");
                            break;
                        }
                        Ok(event) => print_event(&orchestrator, &event).await,
                        Err(RecvError::Lagged(skipped)) => debug!(skipped, "event receiver lagged"),
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }

        orchestrator.shutdown().await;
        Ok::<(), Error>(())
    })
}

async fn print_event(orchestrator: &TimerOrchestrator, event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::TimerStateChanged { task_id, to, .. } => {
            let Some(view) = orchestrator.timer_view(task_id.as_str()).await else {
                return;
            };
            println!(
                "{}  {:<24} {:<10} {}",
                local_time(Utc::now()),
                view.name,
                to.to_string(),
                view.status_line()
            );
        }
        OrchestratorEvent::TimerTicked {
            task_id, remaining, ..
        } => {
            debug!(task = %task_id, remaining = %format_clock(*remaining), "tick");
        }
        other => debug!(event = ?other, "orchestrator event"),
    }
}

fn local_time(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format("%H:%M:%S").to_string()
}
