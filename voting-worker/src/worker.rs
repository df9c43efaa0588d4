//! Consume registered voters, assign each a candidate, and record the vote.
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use election_common::kafka_consumer::is_partition_eof;
use election_common::kafka_producer::{flush_producer, send_to_kafka, KafkaContext};
use election_common::messages::candidate::Candidate;
use election_common::messages::vote::VoteRecord;
use election_common::messages::voter::Voter;
use election_common::metrics::timing_guard;
use election_common::shutdown::Shutdown;
use election_common::store::{ElectionStore, StoreError};
use election_common::VOTES_TOPIC;
use health::{ComponentStatus, HealthHandle};
use metrics::counter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::OwnedMessage;
use rdkafka::producer::FutureProducer;
use rdkafka::{Message, Offset, TopicPartitionList};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{VoteError, WorkerError};
use crate::metrics_consts::{
    CONSUMER_ERRORS, DUPLICATE_VOTES, INVALID_VOTERS, OFFSET_COMMIT_FAILED, VOTES_RECORDED,
    VOTE_PROCESSING_TIME, VOTE_PUBLISH_FAILED, VOTE_STORE_FAILED,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Candidates not loaded yet
    Init,
    /// Consuming voters
    Streaming,
    /// Stopped by a signal or a fatal consumer error
    Terminated,
}

/// Why the streaming loop ended.
#[derive(Debug)]
pub enum StopReason {
    Shutdown,
    ConsumerFailed(KafkaError),
}

impl StopReason {
    /// A consumer failure is an error for the process, a shutdown is not.
    pub fn into_result(self) -> Result<WorkerState, WorkerError> {
        match self {
            StopReason::Shutdown => Ok(WorkerState::Terminated),
            StopReason::ConsumerFailed(err) => Err(WorkerError::KafkaError(err)),
        }
    }
}

/// Picks a candidate uniformly at random for every voter.
pub struct VoteAssigner {
    candidates: Vec<Candidate>,
    rng: StdRng,
}

impl VoteAssigner {
    /// Fails when `candidates` is empty. With a seed, the sequence of
    /// assignments is reproducible.
    pub fn new(candidates: Vec<Candidate>, seed: Option<u64>) -> Result<Self, WorkerError> {
        if candidates.is_empty() {
            return Err(WorkerError::NoCandidates);
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { candidates, rng })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn assign(&mut self, voter: Voter, voting_time: DateTime<Utc>) -> VoteRecord {
        let index = self.rng.gen_range(0..self.candidates.len());
        VoteRecord::new(voter, &self.candidates[index], Uuid::new_v4(), voting_time)
    }
}

pub fn parse_voter(payload: Option<&[u8]>) -> Result<Voter, VoteError> {
    let payload = payload.ok_or(VoteError::EmptyPayload)?;
    Ok(serde_json::from_slice(payload)?)
}

pub struct VoteWorker {
    consumer: StreamConsumer,
    producer: FutureProducer<KafkaContext>,
    store: ElectionStore,
    assigner: VoteAssigner,
    state: WorkerState,
    poll_timeout: Duration,
    loop_delay: Duration,
    flush_timeout: Duration,
    liveness: HealthHandle,
}

impl VoteWorker {
    /// The consumer must already be subscribed to, or assigned, the voters topic.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        consumer: StreamConsumer,
        producer: FutureProducer<KafkaContext>,
        store: ElectionStore,
        assigner: VoteAssigner,
        poll_timeout: Duration,
        loop_delay: Duration,
        flush_timeout: Duration,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            consumer,
            producer,
            store,
            assigner,
            state: WorkerState::Init,
            poll_timeout,
            loop_delay,
            flush_timeout,
            liveness,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Turn one voter message into a stored and published vote. Publishing is
    /// best-effort: the vote counts as recorded once the row is committed.
    pub async fn process_message(
        &mut self,
        payload: Option<&[u8]>,
    ) -> Result<VoteRecord, VoteError> {
        let _timing = timing_guard(VOTE_PROCESSING_TIME);

        let voter = parse_voter(payload)?;
        let vote = self.assigner.assign(voter, Utc::now().trunc_subsecs(0));

        self.store.insert_vote(&vote).await?;
        counter!(VOTES_RECORDED).increment(1);

        let key = Some(vote.voter_id.as_str());
        if let Err(err) = send_to_kafka(&self.producer, VOTES_TOPIC, key, &vote).await {
            counter!(VOTE_PUBLISH_FAILED).increment(1);
            error!(voter_id = %vote.voter_id, "failed to publish vote: {}", err);
        }

        Ok(vote)
    }

    /// Stream voters until shutdown or a fatal consumer error, then flush the
    /// producer. The state is `Terminated` either way; a consumer failure is
    /// returned as an error.
    pub async fn run(&mut self, mut shutdown: Shutdown) -> Result<WorkerState, WorkerError> {
        self.state = WorkerState::Streaming;
        info!("voting worker streaming");
        let mut reason = StopReason::Shutdown;

        while self.state == WorkerState::Streaming {
            if shutdown.is_triggered() {
                self.state = WorkerState::Terminated;
                break;
            }
            self.liveness.report_healthy();

            let received = tokio::select! {
                received = tokio::time::timeout(self.poll_timeout, self.consumer.recv()) => {
                    received.map(|result| result.map(|message| message.detach()))
                }
                _ = shutdown.wait() => {
                    self.state = WorkerState::Terminated;
                    break;
                }
            };

            match received {
                Err(_) => debug!("no voter received within poll timeout"),
                Ok(Err(err)) if is_partition_eof(&err) => debug!("reached end of voters partition"),
                Ok(Err(err)) => {
                    counter!(CONSUMER_ERRORS).increment(1);
                    error!("voter consumer failed, stopping: {}", err);
                    self.liveness.report_status(ComponentStatus::Unhealthy);
                    self.state = WorkerState::Terminated;
                    reason = StopReason::ConsumerFailed(err);
                    break;
                }
                Ok(Ok(message)) => self.handle_message(message).await,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.loop_delay) => {},
                _ = shutdown.wait() => self.state = WorkerState::Terminated,
            }
        }

        info!(?reason, "voting worker terminated");
        flush_producer(&self.producer, self.flush_timeout);
        reason.into_result()
    }

    async fn handle_message(&mut self, message: OwnedMessage) {
        match self.process_message(message.payload()).await {
            Ok(vote) => {
                info!(
                    voter_id = %vote.voter_id,
                    candidate_id = %vote.candidate_id,
                    "voter is voting for candidate"
                );
                self.commit(&message);
            }
            Err(VoteError::StoreError(StoreError::DuplicateVote { voter_id })) => {
                counter!(DUPLICATE_VOTES).increment(1);
                warn!(voter_id = %voter_id, "voter already voted, skipping");
            }
            Err(err @ VoteError::StoreError(_)) => {
                counter!(VOTE_STORE_FAILED).increment(1);
                error!("skipping voter: {}", err);
            }
            Err(err) => {
                counter!(INVALID_VOTERS).increment(1);
                warn!(offset = message.offset(), "skipping voter: {}", err);
            }
        }
    }

    /// Commit the offset following `message`. Offsets of skipped messages are
    /// never committed on their own, but a later commit on the same partition
    /// moves past them.
    fn commit(&self, message: &OwnedMessage) {
        let mut offsets = TopicPartitionList::new();
        let added = offsets.add_partition_offset(
            message.topic(),
            message.partition(),
            Offset::Offset(message.offset() + 1),
        );
        let committed = added.and_then(|_| self.consumer.commit(&offsets, CommitMode::Async));
        if let Err(err) = committed {
            counter!(OFFSET_COMMIT_FAILED).increment(1);
            error!(offset = message.offset(), "failed to commit offset: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use election_common::messages::vote::VOTE_WEIGHT;
    use election_common::test::{sample_candidate, sample_voter};
    use std::collections::HashSet;

    fn candidates() -> Vec<Candidate> {
        vec![
            sample_candidate("c-1", 0),
            sample_candidate("c-2", 1),
            sample_candidate("c-3", 2),
        ]
    }

    #[test]
    fn empty_candidate_set_is_rejected() {
        assert!(matches!(
            VoteAssigner::new(vec![], Some(1)),
            Err(WorkerError::NoCandidates)
        ));
    }

    #[test]
    fn votes_always_go_to_known_candidates() {
        let mut assigner = VoteAssigner::new(candidates(), None).unwrap();
        let known: HashSet<_> = assigner
            .candidates()
            .iter()
            .map(|c| c.candidate_id.clone())
            .collect();

        let mut seen = HashSet::new();
        for i in 0..200 {
            let vote = assigner.assign(sample_voter(&format!("v-{i}")), Utc::now());
            assert!(known.contains(&vote.candidate_id));
            assert_eq!(vote.vote, VOTE_WEIGHT);
            assert_eq!(vote.voter_id, format!("v-{i}"));
            seen.insert(vote.candidate_id);
        }
        // 200 uniform draws over 3 candidates reach all of them
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn seeded_assignment_is_reproducible() {
        let mut first = VoteAssigner::new(candidates(), Some(42)).unwrap();
        let mut second = VoteAssigner::new(candidates(), Some(42)).unwrap();
        let now = Utc::now();

        for i in 0..20 {
            let voter = sample_voter(&format!("v-{i}"));
            let a = first.assign(voter.clone(), now);
            let b = second.assign(voter, now);
            assert_eq!(a.candidate_id, b.candidate_id);
            assert_ne!(a.vote_id, b.vote_id);
        }
    }

    #[test]
    fn only_consumer_failures_fail_the_worker() {
        assert!(matches!(
            StopReason::Shutdown.into_result(),
            Ok(WorkerState::Terminated)
        ));

        let failed = StopReason::ConsumerFailed(KafkaError::MessageConsumption(
            rdkafka::types::RDKafkaErrorCode::BrokerTransportFailure,
        ));
        assert!(matches!(
            failed.into_result(),
            Err(WorkerError::KafkaError(_))
        ));
    }

    #[test]
    fn voter_payloads_are_validated() {
        assert!(matches!(parse_voter(None), Err(VoteError::EmptyPayload)));
        assert!(matches!(
            parse_voter(Some(b"not json")),
            Err(VoteError::ParseError(_))
        ));

        let voter = sample_voter("v-1");
        let payload = serde_json::to_vec(&voter).unwrap();
        assert_eq!(parse_voter(Some(&payload)).unwrap(), voter);
    }
}
