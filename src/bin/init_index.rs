//! init-index: create the configured search indices
//!
//! Checks each physical index of the configured layout and creates it when
//! missing. With `--force`, existing indices are deleted and recreated.

use clap::Parser;
use tracing::{error, info};

use submission_indexer::config::Config;
use submission_indexer::index::{init_index_client, initialize, init::InitOutcome};
use submission_indexer::utils::bootstrap::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "init-index", about = "Create the search indices")]
struct Args {
    /// Delete and recreate indices that already exist.
    #[arg(long)]
    force: bool,

    /// Configuration file (YAML).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let client = init_index_client(&config.index).map_err(|e| -> Box<dyn std::error::Error> {
        error!("Failed to initialize index client: {}", e);
        e
    })?;

    let indices = config.index.layout.indices();
    let outcomes = initialize(client.as_ref(), &indices, args.force)
        .await
        .map_err(|e| {
            error!("Index initialization failed: {}", e);
            e
        })?;

    for outcome in outcomes {
        match outcome {
            InitOutcome::Existing(name) => info!(index = %name, "Index exists"),
            InitOutcome::Created(name) => info!(index = %name, "Index created"),
        }
    }

    info!("Done");
    Ok(())
}
