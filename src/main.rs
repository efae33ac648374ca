use clap::Parser;
use eventide::engine::CommandResponse;
use eventide::record::{EntityType, GroupIntent, GroupRecord, Intent, UserIntent, UserRecord};
use eventide::{CommandRequest, EngineConfig, EngineRuntime, ExporterRepository, StreamProcessorPhase};
use log::{error, info};
use slog::Drain;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "eventide")]
#[command(about = "Partitioned, event-sourced workflow engine node", long_about = None)]
struct Args {
    /// Node id of this node in the cluster
    #[arg(short, long)]
    node_id: Option<u32>,

    /// Number of partitions to run
    #[arg(short, long)]
    partitions: Option<u32>,

    /// Directory for state, log and snapshots (in memory if not set)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON config file; command line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn create_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

fn describe(response: &CommandResponse) -> String {
    match response.rejection() {
        Some(rejection) => format!("rejected: {}", rejection),
        None => format!("{} (key {})", response.intent(), response.key),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(node_id) = args.node_id {
        config = config.with_node_id(node_id);
    }
    if let Some(partitions) = args.partitions {
        config = config.with_partition_count(partitions);
    }
    if let Some(data_dir) = args.data_dir {
        config = config.with_data_dir(data_dir);
    }

    let runtime = EngineRuntime::start(config, Arc::new(ExporterRepository::new()), create_logger())?;
    let processor = runtime.partition(1)?.processor().clone();
    processor
        .wait_for_phase(|phase| phase.is_terminal() || phase == StreamProcessorPhase::Processing)
        .await?;

    // Demo: a user joins a group
    info!("Running identity demo on partition 1...");
    let commands = vec![
        CommandRequest::new(Intent::User(UserIntent::Create), UserRecord::new("demo").with_name("Demo User")),
        CommandRequest::new(Intent::Group(GroupIntent::Create), GroupRecord::new("operators").with_name("Operators")),
        CommandRequest::new(
            Intent::Group(GroupIntent::AddEntity),
            GroupRecord::new("operators").with_entity("demo", EntityType::User),
        ),
        // rejected: already a member
        CommandRequest::new(
            Intent::Group(GroupIntent::AddEntity),
            GroupRecord::new("operators").with_entity("demo", EntityType::User),
        ),
    ];
    for command in commands {
        match runtime.submit(1, command).await {
            Ok(response) => info!("Command {}", describe(&response)),
            Err(e) => error!("Command failed: {}", e),
        }
    }

    info!("Press Ctrl+C to shutdown gracefully");

    // Wait for shutdown signal
    signal::ctrl_c().await?;

    // Gracefully shutdown
    runtime.shutdown().await?;

    Ok(())
}
