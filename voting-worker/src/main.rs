//! Assign every registered voter a candidate and record the resulting vote.
use std::time::Duration;

use envconfig::Envconfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use election_common::kafka_consumer::create_stream_consumer;
use election_common::kafka_producer::create_kafka_producer;
use election_common::metrics::{health_router, serve, setup_metrics_routes};
use election_common::shutdown::Shutdown;
use election_common::store::ElectionStore;
use health::HealthRegistry;
use voting_worker::candidates::load_candidates;
use voting_worker::config::Config;
use voting_worker::worker::{VoteAssigner, VoteWorker};

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

fn start_health_liveness_server(
    config: &Config,
    liveness: HealthRegistry,
) -> anyhow::Result<JoinHandle<()>> {
    let router = setup_metrics_routes(health_router("voting worker", liveness))?;
    let bind = config.bind();
    Ok(tokio::task::spawn(async move {
        if let Err(err) = serve(router, &bind).await {
            error!("failed to serve health and metrics on {}: {}", bind, err);
        }
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    info!("starting voting worker");

    let config = Config::init_with_defaults()?;
    let shutdown = Shutdown::from_signals();

    let liveness = HealthRegistry::new("liveness");
    let kafka_liveness = liveness.register("rdkafka", Duration::from_secs(30));
    let worker_liveness = liveness.register("voting_loop", Duration::from_secs(30));
    start_health_liveness_server(&config, liveness)?;

    let store = ElectionStore::new(&config.database).await?;
    let candidates = load_candidates(
        config.candidate_source,
        &store,
        &config.kafka,
        config.expected_candidates,
        config.candidate_load_timeout_ms.0,
    )
    .await?;
    let assigner = VoteAssigner::new(candidates, config.vote_seed)?;

    let producer = create_kafka_producer(&config.kafka, kafka_liveness).await?;
    let consumer: StreamConsumer = create_stream_consumer(
        &config.kafka,
        &config.consumer.kafka_consumer_group,
        &config.consumer.kafka_consumer_offset_reset,
    )?;
    consumer.subscribe(&[config.consumer.kafka_consumer_topic.as_str()])?;

    let mut worker = VoteWorker::new(
        consumer,
        producer,
        store,
        assigner,
        config.poll_timeout_ms.0,
        config.loop_delay_ms.0,
        config.flush_timeout_ms.0,
        worker_liveness,
    );

    // A consumer failure exits non-zero so the worker gets restarted externally
    let state = worker.run(shutdown).await?;
    info!(?state, "voting worker exiting");

    Ok(())
}
