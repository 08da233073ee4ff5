use anyhow::Result;
use clap::Parser;
use common::config::ProducerConfig;
use common::telemetry::init_basic_telemetry;
use messaging::OrderPublisher;
use tracing::{error, info};

mod generator;

/// Publish randomly generated orders to the orders topic
#[derive(Debug, Parser)]
#[command(name = "order-producer", version)]
struct Cli {
    /// Number of orders to publish
    #[arg(short, long, default_value_t = 1)]
    count: usize,

    /// Kafka brokers; overrides KAFKA_BROKERS
    #[arg(long)]
    brokers: Option<String>,

    /// Target topic; overrides KAFKA_TOPIC
    #[arg(long)]
    topic: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_basic_telemetry("info");

    let config = ProducerConfig::from_env();
    let brokers = cli.brokers.unwrap_or(config.servers);
    let topic = cli.topic.unwrap_or(config.topic);

    info!("Publishing {} orders to '{}' via {}", cli.count, topic, brokers);

    let publisher = OrderPublisher::new(&brokers, topic)?;
    let mut rng = rand::thread_rng();
    let mut published = 0usize;

    for _ in 0..cli.count {
        let order = generator::random_order(&mut rng);

        match publisher.publish(&order).await {
            Ok(_) => {
                published += 1;
                info!(order_id = %order.id, "Produced order");
            }
            Err(e) => error!(order_id = %order.id, error = %e, "Failed producing message"),
        }
    }

    info!("Published {}/{} orders", published, cli.count);
    Ok(())
}
