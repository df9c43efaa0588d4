//! One aggregation feeding one sink, with its own consumer and checkpoint.
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::Duration;

use election_common::config::KafkaConfig;
use election_common::kafka_consumer::{create_stream_consumer, is_partition_eof};
use election_common::metrics::timing_guard;
use election_common::shutdown::Shutdown;
use health::HealthHandle;
use metrics::{counter, gauge};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{Message, Offset, TopicPartitionList};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::aggregate::{Aggregation, GroupedAggregator};
use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::metrics_consts::{
    BATCHES_COMMITTED, BATCH_TIME, EVENTS_CONSUMED, EVENTS_LATE, EVENTS_UNDECODABLE,
    GROUPS_EVICTED, PIPELINE_RESTARTS, STATE_GROUPS,
};
use crate::schema::VoteEvent;
use crate::sink::{AggregateSink, SinkError};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("kafka consumer failed: {0}")]
    Kafka(#[from] KafkaError),
    #[error("source topic {0} does not exist")]
    MissingTopic(String),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("sink {sink} failed: {error}")]
    Sink { sink: String, error: SinkError },
    #[error("duration out of range: {0}")]
    InvalidDuration(#[from] chrono::OutOfRangeError),
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Names the checkpoint file, the consumer group and the liveness component
    pub name: String,
    pub source_topic: String,
    pub checkpoint_dir: PathBuf,
    pub watermark_delay: Duration,
    pub window: Option<Duration>,
    /// Longest time a micro-batch keeps collecting events
    pub trigger_interval: Duration,
    pub max_batch_size: usize,
    pub restart_backoff: Duration,
}

/// What a single micro-batch did, for tests and logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub batch_id: u64,
    pub consumed: usize,
    pub undecodable: usize,
    pub late: usize,
    pub emitted: usize,
}

pub struct Pipeline<A: Aggregation, S> {
    settings: PipelineSettings,
    kafka: KafkaConfig,
    sink: S,
    liveness: HealthHandle,
    _aggregation: PhantomData<A>,
}

/// A running attempt: restored from the checkpoint, discarded on failure.
struct Attempt<A: Aggregation> {
    consumer: StreamConsumer,
    aggregator: GroupedAggregator<A>,
    offsets: BTreeMap<i32, i64>,
    batch_id: u64,
    checkpoints: CheckpointStore,
}

impl<A, S> Pipeline<A, S>
where
    A: Aggregation,
    S: AggregateSink<A::Output>,
{
    pub fn new(
        settings: PipelineSettings,
        kafka: KafkaConfig,
        sink: S,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            settings,
            kafka,
            sink,
            liveness,
            _aggregation: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Run until shutdown. A failed attempt is logged and the pipeline
    /// restarts from its last checkpoint after the restart backoff. A restart
    /// leaves liveness alone; only a missed component deadline fails it.
    pub async fn run(self, mut shutdown: Shutdown) {
        loop {
            match self.run_attempt(shutdown.clone()).await {
                Ok(()) => break,
                Err(err) => {
                    counter!(PIPELINE_RESTARTS, "pipeline" => self.settings.name.clone())
                        .increment(1);
                    error!(
                        pipeline = %self.settings.name,
                        "pipeline failed, restarting from checkpoint in {:?}: {}",
                        self.settings.restart_backoff,
                        err
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.restart_backoff) => {},
                _ = shutdown.wait() => break,
            }
        }
        info!(pipeline = %self.settings.name, "pipeline stopped");
    }

    /// Restore from the checkpoint and process micro-batches until shutdown.
    pub async fn run_attempt(&self, mut shutdown: Shutdown) -> Result<(), PipelineError> {
        let mut attempt = self.start_attempt().await?;

        while !shutdown.is_triggered() {
            let stats = self.run_batch(&mut attempt, &mut shutdown).await?;
            if stats.consumed > 0 {
                info!(pipeline = %self.settings.name, ?stats, "micro-batch committed");
            }
        }
        Ok(())
    }

    async fn start_attempt(&self) -> Result<Attempt<A>, PipelineError> {
        let checkpoints = CheckpointStore::new(&self.settings.checkpoint_dir, &self.settings.name);
        let checkpoint: Checkpoint<A::Key> = checkpoints.load_or_reset().await?;

        let watermark_delay = chrono::Duration::from_std(self.settings.watermark_delay)?;
        let window = match self.settings.window {
            Some(window) => Some(chrono::Duration::from_std(window)?),
            None => None,
        };
        let aggregator = GroupedAggregator::restore(
            watermark_delay,
            window,
            checkpoint.max_event_time,
            checkpoint.state,
        );

        let group = format!("aggregation-{}", self.settings.name);
        let consumer = create_stream_consumer(&self.kafka, &group, "earliest")?;
        self.assign(&consumer, &checkpoint.offsets)?;

        info!(
            pipeline = %self.settings.name,
            batch_id = checkpoint.batch_id,
            groups = aggregator.group_count(),
            "pipeline started"
        );
        Ok(Attempt {
            consumer,
            aggregator,
            offsets: checkpoint.offsets,
            batch_id: checkpoint.batch_id,
            checkpoints,
        })
    }

    /// Assign every partition of the source topic, resuming at the
    /// checkpointed offsets and reading new partitions from the beginning.
    fn assign(
        &self,
        consumer: &StreamConsumer,
        offsets: &BTreeMap<i32, i64>,
    ) -> Result<(), PipelineError> {
        let topic = &self.settings.source_topic;
        let metadata = consumer.fetch_metadata(Some(topic), METADATA_TIMEOUT)?;
        let partitions: Vec<i32> = metadata
            .topics()
            .iter()
            .filter(|t| t.name() == topic.as_str() && t.error().is_none())
            .flat_map(|t| t.partitions().iter().map(|p| p.id()))
            .collect();
        if partitions.is_empty() {
            return Err(PipelineError::MissingTopic(topic.clone()));
        }

        let mut assignment = TopicPartitionList::new();
        for partition in partitions {
            let offset = match offsets.get(&partition) {
                Some(next) => Offset::Offset(*next),
                None => Offset::Beginning,
            };
            assignment.add_partition_offset(topic, partition, offset)?;
        }
        consumer.assign(&assignment)?;
        Ok(())
    }

    /// Collect one micro-batch, fold it into the aggregation, write the
    /// changed groups to the sink and checkpoint. Nothing is written for an
    /// empty trigger interval.
    async fn run_batch(
        &self,
        attempt: &mut Attempt<A>,
        shutdown: &mut Shutdown,
    ) -> Result<BatchStats, PipelineError> {
        self.liveness.report_healthy();

        let mut stats = BatchStats {
            batch_id: attempt.batch_id,
            ..Default::default()
        };
        let mut events = Vec::new();
        let mut offsets = attempt.offsets.clone();
        let deadline = Instant::now() + self.settings.trigger_interval;

        while stats.consumed < self.settings.max_batch_size {
            let received = tokio::select! {
                received = tokio::time::timeout_at(deadline, attempt.consumer.recv()) => received,
                // Uncheckpointed events are read again on the next start
                _ = shutdown.wait() => return Ok(stats),
            };
            let message = match received {
                Err(_) => break,
                Ok(Err(err)) if is_partition_eof(&err) => continue,
                Ok(Err(err)) => return Err(err.into()),
                Ok(Ok(message)) => message,
            };

            stats.consumed += 1;
            offsets.insert(message.partition(), message.offset() + 1);
            match VoteEvent::from_payload(message.payload()) {
                Ok(event) => events.push(event),
                Err(err) => {
                    stats.undecodable += 1;
                    warn!(
                        pipeline = %self.settings.name,
                        partition = message.partition(),
                        offset = message.offset(),
                        "skipping vote record: {}",
                        err
                    );
                }
            }
        }

        if stats.consumed == 0 {
            return Ok(stats);
        }
        let _timing = timing_guard(BATCH_TIME);

        let outcome = attempt.aggregator.apply_batch(events);
        stats.late = outcome.late;
        stats.emitted = outcome.updates.len();

        if !outcome.updates.is_empty() {
            self.sink
                .write_batch(attempt.batch_id, &outcome.updates)
                .await
                .map_err(|error| PipelineError::Sink {
                    sink: self.sink.name().to_owned(),
                    error,
                })?;
        }

        let next_batch = attempt.batch_id + 1;
        attempt
            .checkpoints
            .save(&Checkpoint {
                batch_id: next_batch,
                offsets: offsets.clone(),
                max_event_time: attempt.aggregator.max_event_time(),
                state: attempt.aggregator.snapshot(),
            })
            .await?;
        attempt.batch_id = next_batch;
        attempt.offsets = offsets;

        let name = self.settings.name.clone();
        counter!(EVENTS_CONSUMED, "pipeline" => name.clone()).increment(stats.consumed as u64);
        counter!(EVENTS_UNDECODABLE, "pipeline" => name.clone())
            .increment(stats.undecodable as u64);
        counter!(EVENTS_LATE, "pipeline" => name.clone()).increment(outcome.late as u64);
        counter!(GROUPS_EVICTED, "pipeline" => name.clone()).increment(outcome.evicted as u64);
        counter!(BATCHES_COMMITTED, "pipeline" => name.clone()).increment(1);
        gauge!(STATE_GROUPS, "pipeline" => name).set(attempt.aggregator.group_count() as f64);
        debug!(pipeline = %self.settings.name, batch_id = stats.batch_id, "checkpointed");

        Ok(stats)
    }
}
