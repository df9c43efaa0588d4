//! Continuously aggregate the vote stream into per-candidate and per-region totals.
use std::time::Duration;

use envconfig::Envconfig;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use aggregation_job::aggregate::{TurnoutByLocation, VotesPerCandidate};
use aggregation_job::config::Config;
use aggregation_job::pipeline::{Pipeline, PipelineSettings};
use aggregation_job::sink::{KafkaSink, PostgresSink};
use election_common::kafka_producer::{create_kafka_producer, flush_producer};
use election_common::metrics::{health_router, serve, setup_metrics_routes};
use election_common::shutdown::Shutdown;
use election_common::store::ElectionStore;
use election_common::{TURNOUT_BY_LOCATION_TOPIC, VOTES_PER_CANDIDATE_TOPIC};
use health::HealthRegistry;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

fn start_health_liveness_server(
    config: &Config,
    liveness: HealthRegistry,
) -> anyhow::Result<JoinHandle<()>> {
    let router = setup_metrics_routes(health_router("aggregation job", liveness))?;
    let bind = config.bind();
    Ok(tokio::task::spawn(async move {
        if let Err(err) = serve(router, &bind).await {
            error!("failed to serve health and metrics on {}: {}", bind, err);
        }
    }))
}

fn settings(config: &Config, name: &str) -> PipelineSettings {
    PipelineSettings {
        name: name.to_owned(),
        source_topic: config.source_topic.clone(),
        checkpoint_dir: config.checkpoint_dir(),
        watermark_delay: config.watermark_delay_ms.0,
        window: config.window(),
        trigger_interval: config.trigger_interval_ms.0,
        max_batch_size: config.max_batch_size,
        restart_backoff: config.restart_backoff_ms.0,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    info!("starting aggregation job");

    let config = Config::init_from_env()?;
    let shutdown = Shutdown::from_signals();

    let liveness = HealthRegistry::new("liveness");
    let kafka_liveness = liveness.register("rdkafka", Duration::from_secs(30));
    let pipeline_deadline = config.trigger_interval_ms.0 + Duration::from_secs(30);
    let register = |name: &str| (name.to_owned(), liveness.register(name, pipeline_deadline));
    let (candidates_kafka, candidates_kafka_liveness) = register("votes_per_candidate_kafka");
    let (turnout_kafka, turnout_kafka_liveness) = register("turnout_by_location_kafka");
    let (candidates_pg, candidates_pg_liveness) = register("votes_per_candidate_postgres");
    let (turnout_pg, turnout_pg_liveness) = register("turnout_by_location_postgres");
    start_health_liveness_server(&config, liveness.clone())?;

    let store = ElectionStore::new(&config.database).await?;
    store.migrate().await?;
    let producer = create_kafka_producer(&config.kafka, kafka_liveness).await?;

    let handles = vec![
        tokio::spawn(
            Pipeline::<VotesPerCandidate, _>::new(
                settings(&config, &candidates_kafka),
                config.kafka.clone(),
                KafkaSink::new(producer.clone(), VOTES_PER_CANDIDATE_TOPIC),
                candidates_kafka_liveness,
            )
            .run(shutdown.clone()),
        ),
        tokio::spawn(
            Pipeline::<TurnoutByLocation, _>::new(
                settings(&config, &turnout_kafka),
                config.kafka.clone(),
                KafkaSink::new(producer.clone(), TURNOUT_BY_LOCATION_TOPIC),
                turnout_kafka_liveness,
            )
            .run(shutdown.clone()),
        ),
        tokio::spawn(
            Pipeline::<VotesPerCandidate, _>::new(
                settings(&config, &candidates_pg),
                config.kafka.clone(),
                PostgresSink::new(store.pool().clone()),
                candidates_pg_liveness,
            )
            .run(shutdown.clone()),
        ),
        tokio::spawn(
            Pipeline::<TurnoutByLocation, _>::new(
                settings(&config, &turnout_pg),
                config.kafka.clone(),
                PostgresSink::new(store.pool().clone()),
                turnout_pg_liveness,
            )
            .run(shutdown.clone()),
        ),
    ];

    for result in join_all(handles).await {
        if let Err(err) = result {
            error!("pipeline task panicked: {}", err);
        }
    }

    flush_producer(&producer, Duration::from_secs(10));
    info!("aggregation job exiting");
    Ok(())
}
