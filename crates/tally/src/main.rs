use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use tally::config::{Config, ENV_CONFIG};
use tally::coordinator::TaskMutationCoordinator;
use tally::hooks::HookPipeline;
use tally::models::{NewTask, RecurrenceStrategy, RecurrenceTrigger, TaskPatch, TaskStatus};
use tally::recurrence::dates::parse_timestamp;
use tally::storage::sqlite::SqliteBackend;
use tally::{db, Result};

#[derive(Parser)]
#[command(name = "tally", about = "Personal task tracker with recurring tasks and hooks")]
struct Cli {
    /// Config file (defaults to <config dir>/tally/config.toml)
    #[arg(long, global = true, env = ENV_CONFIG)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, hooks directory and database
    Init,
    /// Add a task
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        defer: Option<String>,
        /// RRULE text, e.g. "FREQ=WEEKLY;INTERVAL=2"
        #[arg(long)]
        recurrence: Option<String>,
        #[arg(long, value_parser = parse_trigger)]
        trigger: Option<RecurrenceTrigger>,
        #[arg(long, value_parser = parse_strategy)]
        strategy: Option<RecurrenceStrategy>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Estimated minutes
        #[arg(long)]
        estimate: Option<i64>,
    },
    /// Change fields of a task. An empty string clears an optional field.
    Modify {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        defer: Option<String>,
        #[arg(long)]
        recurrence: Option<String>,
        #[arg(long, value_parser = parse_trigger)]
        trigger: Option<RecurrenceTrigger>,
        #[arg(long, value_parser = parse_strategy)]
        strategy: Option<RecurrenceStrategy>,
        /// Replaces the tag list
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        estimate: Option<i64>,
        /// Actual minutes spent
        #[arg(long)]
        actual: Option<i64>,
    },
    /// Mark a task done
    Done { id: String },
    /// Mark a task dropped
    Drop { id: String },
    /// Delete a task permanently
    Delete { id: String },
    /// Print one task
    Show { id: String },
    /// List open tasks
    List {
        /// Include done and dropped tasks
        #[arg(long)]
        all: bool,
    },
    /// Generate instances for clock-driven recurring tasks that are due
    Sweep {
        /// Evaluate as of this RFC 3339 timestamp instead of the current time
        #[arg(long)]
        now: Option<String>,
    },
}

fn parse_status(s: &str) -> std::result::Result<TaskStatus, String> {
    TaskStatus::from_str(s).ok_or_else(|| format!("unknown status '{s}'"))
}

fn parse_trigger(s: &str) -> std::result::Result<RecurrenceTrigger, String> {
    RecurrenceTrigger::from_str(s).ok_or_else(|| format!("unknown trigger '{s}'"))
}

fn parse_strategy(s: &str) -> std::result::Result<RecurrenceStrategy, String> {
    RecurrenceStrategy::from_str(s).ok_or_else(|| format!("unknown strategy '{s}'"))
}

/// `None` leaves the field alone, `""` clears it.
fn clearable(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| if v.is_empty() { None } else { Some(v) })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open(config: &Config) -> Result<TaskMutationCoordinator> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let conn = db::init_db(&config.database_path().to_string_lossy())?;
    let hooks = HookPipeline::from_dir(config.hooks_path(), data_dir, config.hook_timeout());
    Ok(TaskMutationCoordinator::new(Arc::new(SqliteBackend::from_connection(conn)), hooks)
        .with_sweep_policy(config.sweep.on_error))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let now = chrono::Utc::now();

    match cli.command {
        Commands::Init => {
            let data_dir = config.data_dir();
            std::fs::create_dir_all(&data_dir)?;
            std::fs::create_dir_all(config.hooks_path())?;
            let db_path = config.database_path();
            drop(db::init_db(&db_path.to_string_lossy())?);
            eprintln!("Database initialized at {}", db_path.display());
            eprintln!("Hooks directory: {}", config.hooks_path().display());
        }
        Commands::Add {
            title,
            description,
            status,
            due,
            defer,
            recurrence,
            trigger,
            strategy,
            tags,
            area,
            project,
            priority,
            estimate,
        } => {
            let input = NewTask {
                title,
                description,
                status,
                area,
                project,
                tags: (!tags.is_empty()).then_some(tags),
                priority,
                notes: None,
                estimated_minutes: estimate,
                due,
                defer_until: defer,
                recurrence,
                recurrence_trigger: trigger,
                recurrence_strategy: strategy,
            };
            let task = open(&config)?.create_task(input, now).await?;
            print_json(&task)?;
        }
        Commands::Modify {
            id,
            title,
            description,
            status,
            due,
            defer,
            recurrence,
            trigger,
            strategy,
            tags,
            area,
            project,
            priority,
            estimate,
            actual,
        } => {
            let patch = TaskPatch {
                title,
                description: clearable(description),
                status,
                area: clearable(area),
                project: clearable(project),
                tags,
                priority: clearable(priority),
                notes: None,
                estimated_minutes: estimate.map(Some),
                actual_minutes: actual.map(Some),
                due: clearable(due),
                defer_until: clearable(defer),
                recurrence: clearable(recurrence),
                recurrence_trigger: trigger,
                recurrence_strategy: strategy,
            };
            let task = open(&config)?.modify_task(&id, patch, now).await?;
            print_json(&task)?;
        }
        Commands::Done { id } => {
            let outcome = open(&config)?.complete_task(&id, now).await?;
            print_json(&outcome)?;
        }
        Commands::Drop { id } => {
            let task = open(&config)?.drop_task(&id, now).await?;
            print_json(&task)?;
        }
        Commands::Delete { id } => {
            let task = open(&config)?.delete_task(&id).await?;
            print_json(&task)?;
        }
        Commands::Show { id } => {
            let task = open(&config)?.get_task(&id)?;
            print_json(&task)?;
        }
        Commands::List { all } => {
            let tasks = open(&config)?.list_tasks(all)?;
            print_json(&tasks)?;
        }
        Commands::Sweep { now: at } => {
            let at = match at {
                Some(s) => parse_timestamp(&s)?,
                None => now,
            };
            let report = open(&config)?.process_due_recurrences(at)?;
            print_json(&report)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tally::init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
