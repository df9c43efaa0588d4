//! Seed candidates, then register synthetic voters and publish them to Kafka.
use std::time::Duration;

use envconfig::Envconfig;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use election_common::identity::IdentityGenerator;
use election_common::kafka_producer::create_kafka_producer;
use election_common::metrics::{health_router, serve, setup_metrics_routes};
use election_common::shutdown::Shutdown;
use election_common::store::ElectionStore;
use health::HealthRegistry;
use registration_producer::config::Config;
use registration_producer::registration::Registrar;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

fn start_health_liveness_server(
    config: &Config,
    liveness: HealthRegistry,
) -> anyhow::Result<JoinHandle<()>> {
    let router = setup_metrics_routes(health_router("registration producer", liveness))?;
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
    info!("starting registration producer");

    let config = Config::init_from_env()?;
    let shutdown = Shutdown::from_signals();

    let liveness = HealthRegistry::new("liveness");
    let kafka_liveness = liveness.register("rdkafka", Duration::from_secs(30));
    let loop_liveness = liveness.register("registration_loop", Duration::from_secs(30));
    start_health_liveness_server(&config, liveness)?;

    let store = ElectionStore::new(&config.database).await?;
    store.migrate().await?;
    let producer = create_kafka_producer(&config.kafka, kafka_liveness).await?;
    let identity = IdentityGenerator::new(&config.identity_url, config.identity_timeout_ms.0)?;

    let registrar = Registrar::new(
        store,
        producer,
        identity,
        loop_liveness,
        config.candidate_count,
        config.voter_count,
        config.voter_interval_ms.0,
        config.flush_timeout_ms.0,
    );

    let candidates = registrar.bootstrap_candidates().await?;
    info!(candidates, "candidate bootstrap finished");

    let registered = registrar.run(shutdown).await;
    info!(registered, "registration producer exiting");

    Ok(())
}
