//! submission-processor: change-event indexer
//!
//! Subscribes to the submission create/update/delete topics and applies each
//! event to the search index, embedding reviews and review summations into
//! their parent submission documents.
//!
//! ## Architecture
//! ```text
//! [Kafka topics] -> [submission-processor] -> [Search index]
//!                          |
//!                          v
//!                    [GET /health]
//! ```
//!
//! ## Configuration
//! - `--config` / SUBMISSION_INDEXER_CONFIG: YAML configuration file
//! - SUBMISSION_INDEXER__*: overrides (e.g. SUBMISSION_INDEXER__INDEX__URL)
//! - SUBMISSION_INDEXER_LOG: tracing filter (default: info)

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use submission_indexer::bus::{init_consumer, MessageConsumer};
use submission_indexer::config::Config;
use submission_indexer::dispatch::Dispatcher;
use submission_indexer::handlers::SubmissionEventHandler;
use submission_indexer::health::{self, ConsumerHealth, HealthCheck};
use submission_indexer::index::init_index_client;
use submission_indexer::projection::Projector;
use submission_indexer::utils::bootstrap::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "submission-processor", about = "Index submission change events")]
struct Args {
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

    info!("Starting submission-processor");

    let client = init_index_client(&config.index).map_err(|e| -> Box<dyn std::error::Error> {
        error!("Failed to initialize index client: {}", e);
        e
    })?;
    let projector = Projector::new(client, &config.index);
    let dispatcher = Arc::new(Dispatcher::new(config.messaging.topics.clone(), projector));

    let consumer: Arc<dyn MessageConsumer> =
        init_consumer(&config.messaging).map_err(|e| -> Box<dyn std::error::Error> {
        error!("Failed to initialize message consumer: {}", e);
        e
    })?;

    let handler = SubmissionEventHandler::new(dispatcher.clone(), &config.processing);
    consumer.subscribe(Box::new(handler)).await?;
    consumer.start_consuming().await?;

    info!(topics = ?dispatcher.channels(), "Consuming change events");

    if config.health.enabled {
        let checks: Vec<Arc<dyn HealthCheck>> = vec![Arc::new(ConsumerHealth::new(consumer.clone()))];
        let health_config = config.health.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(checks, &health_config).await {
                error!(error = %e, "Health endpoint stopped");
            }
        });
    }

    info!("Processor running, press Ctrl+C to exit");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    Ok(())
}
