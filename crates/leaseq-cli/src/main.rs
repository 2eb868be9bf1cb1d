use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use leaseq_core::app::HandlerError;
use leaseq_core::{
    Message, MessageHandler, Queue, QueueConfig, QueueError, ScopedError, SqliteStore, Store,
    StoreConfig, WorkerConfig, WorkerGroup,
};

#[derive(Parser)]
#[command(name = "leaseq")]
#[command(about = "Lease-based message queue over a SQLite file")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file
    #[arg(long, default_value = "leaseq.db")]
    db: PathBuf,

    /// Queue name
    #[arg(long, short = 'q', default_value = "default", global = true)]
    queue: String,

    /// Print received messages as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the message table if missing
    Create,
    /// Drop the message table (every queue in it)
    Drop,
    /// Drop and recreate the message table
    Reset,
    /// Enqueue one message
    Send {
        payload: String,

        /// Lease granted to whoever receives it (default: one day)
        #[arg(long)]
        lease_secs: Option<u64>,
    },
    /// Lease one message, print it, and ack it
    Receive,
    /// Print and ack messages until the queue is empty
    Drain,
    /// Pending / leased / stale counts as JSON
    Counts,
    /// Delete every message of the queue
    Purge,
    /// Run workers that print each message, until Ctrl-C
    Work {
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Pause after finding the queue empty
        #[arg(long, default_value_t = 1_000)]
        poll_ms: u64,
    },
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "leaseq_core=debug,leaseq_cli=debug,info"
    } else {
        "leaseq_core=info,leaseq_cli=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn render(message: &Message, json: bool) -> Result<String, serde_json::Error> {
    if json {
        return serde_json::to_string(message);
    }
    Ok(match message.as_str() {
        Some(text) => format!("{}\t{text}", message.id),
        None => format!("{}\t<{} bytes>", message.id, message.payload.len()),
    })
}

struct Printer {
    json: bool,
}

#[async_trait]
impl MessageHandler for Printer {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        println!("{}", render(message, self.json)?);
        Ok(())
    }
}

async fn run(cli: Cli) -> Result<(), QueueError> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cli.db, &StoreConfig::default())?);
    let queue = Queue::open(cli.queue, store, QueueConfig::default()).await?;
    debug!(db = %cli.db.display(), queue = queue.name(), "opened");
    let json = cli.json;

    match cli.command {
        // `open` already created it
        Commands::Create => {}
        Commands::Drop => queue.drop_table().await?,
        Commands::Reset => queue.reset().await?,
        Commands::Send {
            payload,
            lease_secs,
        } => {
            let lease = lease_secs.map_or(queue.default_lease(), Duration::from_secs);
            let id = queue.send_with_lease(payload, lease).await?;
            println!("{id}");
        }
        Commands::Receive => {
            let printed = queue
                .with_message(|message| async move {
                    println!("{}", render(&message, json)?);
                    Ok::<(), QueueError>(())
                })
                .await;
            match printed {
                Ok(()) => {}
                Err(err) if err.is_empty_queue() => info!(queue = queue.name(), "queue is empty"),
                Err(err) => return Err(into_queue_error(err)),
            }
        }
        Commands::Drain => {
            let mut drain = queue.drain();
            let mut count = 0usize;
            while let Some(message) = drain.next().await {
                println!("{}", render(&message?, json)?);
                count += 1;
            }
            info!(queue = queue.name(), count, "drained");
        }
        Commands::Counts => {
            let counts = queue.counts().await?;
            println!("{}", serde_json::to_string(&counts)?);
        }
        Commands::Purge => {
            let deleted = queue.purge().await?;
            println!("{deleted}");
        }
        Commands::Work { workers, poll_ms } => {
            let config = WorkerConfig {
                workers,
                poll_interval_ms: poll_ms,
            };
            let group = WorkerGroup::spawn(queue.clone(), Arc::new(Printer { json }), &config);
            info!(queue = queue.name(), workers = group.len(), "workers running; Ctrl-C to stop");

            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "cannot listen for Ctrl-C; stopping");
            }
            let stats = group.shutdown_and_join().await;
            info!(processed = stats.processed, failed = stats.failed, "workers stopped");
        }
    }
    Ok(())
}

fn into_queue_error(err: ScopedError<QueueError>) -> QueueError {
    match err {
        ScopedError::Queue(err) | ScopedError::Processing(err) => err,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
