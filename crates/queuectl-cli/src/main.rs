mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use queuectl_core::impls::{ShellExecutor, SqliteJobStore};
use queuectl_core::ports::{IdGenerator, SystemClock, UlidGenerator};
use queuectl_core::{Job, JobDefinition, JobId, JobQueue, JobState, WorkerPool};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::{ConfigKey, Home};

#[derive(Parser)]
#[command(name = "queuectl", version, about = "Persistent background job queue")]
struct Cli {
    /// Directory holding queuectl.db and config.json (default: ~/.queuectl)
    #[arg(long, env = "QUEUECTL_HOME", global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a job, e.g. '{"id":"job1","command":"echo hi"}'
    Enqueue {
        /// Job definition as JSON
        #[arg(required_unless_present = "command", conflicts_with = "command")]
        json: Option<String>,

        /// Shell command to run (instead of a JSON definition)
        #[arg(long)]
        command: Option<String>,

        /// Job id (generated when omitted)
        #[arg(long, requires = "command")]
        id: Option<String>,

        #[arg(long, requires = "command", allow_negative_numbers = true)]
        max_retries: Option<i64>,
    },

    /// List jobs as JSON, oldest first
    List {
        /// pending, processing, completed, failed or dead
        #[arg(long, short)]
        state: Option<JobState>,
    },

    /// Job counts per state
    Status,

    /// Dead letter queue
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },

    /// Run workers in the foreground until Ctrl-C / SIGTERM
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },

    /// Read or change config.json
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Delete the queue database
    Reset,
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List dead jobs
    List,
    /// Move a dead job back to pending
    Retry { id: String },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Start workers (default count: worker-count from config)
    Start {
        #[arg(long, short)]
        count: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    Get { key: ConfigKey },
    Set { key: ConfigKey, value: String },
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "queuectl=info,queuectl_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let home = Home::resolve(cli.home)?;

    match cli.command {
        Commands::Enqueue {
            json,
            command,
            id,
            max_retries,
        } => {
            let definition = match (json, command) {
                (Some(json), _) => JobDefinition::from_json(&json)?,
                (None, Some(command)) => {
                    let id = match id {
                        Some(id) => JobId::new(id),
                        None => UlidGenerator::new(SystemClock).generate_job_id(),
                    };
                    let definition = JobDefinition::new(id.into_inner(), command);
                    match max_retries {
                        Some(n) => definition.with_max_retries(n),
                        None => definition,
                    }
                }
                (None, None) => anyhow::bail!("either a JSON definition or --command is required"),
            };
            let queue = open_queue(&home).await?;
            let id = queue.enqueue(definition).await.context("failed to enqueue job")?;
            println!("Job '{id}' enqueued");
        }

        Commands::List { state } => {
            let queue = open_queue(&home).await?;
            let jobs = queue.list_jobs(state).await?;
            print_jobs(&jobs)?;
        }

        Commands::Status => {
            let queue = open_queue(&home).await?;
            let counts = queue.stats().await?;
            println!("Job Queue Status");
            println!("================");
            for (state, n) in counts.iter() {
                println!("{:<11} {n}", format!("{state}:"));
            }
            println!("{:<11} {}", "total:", counts.total());
        }

        Commands::Dlq { command } => {
            let queue = open_queue(&home).await?;
            match command {
                DlqCommands::List => {
                    let jobs = queue.list_dead().await?;
                    if jobs.is_empty() {
                        println!("No jobs in the dead letter queue");
                    } else {
                        print_jobs(&jobs)?;
                    }
                }
                DlqCommands::Retry { id } => {
                    let id = JobId::new(id);
                    queue
                        .requeue_dead(&id)
                        .await
                        .with_context(|| format!("failed to retry job '{id}'"))?;
                    println!("Job '{id}' moved back to pending");
                }
            }
        }

        Commands::Worker {
            command: WorkerCommands::Start { count },
        } => {
            let queue = open_queue(&home).await?;
            let count = count.unwrap_or(queue.config().worker_count);
            let pool = WorkerPool::new(queue, Arc::new(ShellExecutor::new()));
            pool.start(count).context("failed to start workers")?;
            println!("Started {count} worker(s), press Ctrl-C to stop");

            shutdown_signal().await?;
            info!("Shutdown requested, waiting for running jobs");
            pool.stop().await.context("failed to stop workers")?;
            println!("Workers stopped");
        }

        Commands::Config { command } => {
            let mut config = home.load_config()?;
            match command {
                ConfigCommands::Get { key } => println!("{}", key.get(&config)),
                ConfigCommands::Set { key, value } => {
                    key.set(&mut config, &value)?;
                    home.save_config(&config)?;
                    println!("{key} = {}", key.get(&config));
                }
                ConfigCommands::Show => {
                    for key in ConfigKey::ALL {
                        println!("{key} = {}", key.get(&config));
                    }
                }
            }
        }

        Commands::Reset => {
            let db_path = home.db_path();
            if !db_path.exists() {
                println!("Database does not exist, nothing to reset");
                return Ok(());
            }
            for suffix in ["", "-wal", "-shm"] {
                let mut path = db_path.clone().into_os_string();
                path.push(suffix);
                let path = PathBuf::from(path);
                if path.exists() {
                    std::fs::remove_file(&path).with_context(|| {
                        format!("failed to delete {} (are workers running?)", path.display())
                    })?;
                }
            }
            println!("Database reset, all jobs removed");
        }
    }

    Ok(())
}

async fn open_queue(home: &Home) -> anyhow::Result<JobQueue> {
    home.ensure_exists()?;
    let config = home.load_config()?;
    let db_path = home.db_path();
    let store = SqliteJobStore::open_path(&db_path)
        .await
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    let queue = JobQueue::new(Arc::new(store), config).context("invalid configuration")?;
    Ok(queue)
}

fn print_jobs(jobs: &[Job]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(jobs)?);
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
