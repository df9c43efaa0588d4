//! Candidate bootstrap and the voter registration loop.
use std::time::Duration;

use election_common::identity::IdentityGenerator;
use election_common::kafka_producer::{flush_producer, send_to_kafka, KafkaContext};
use election_common::messages::voter::Voter;
use election_common::metrics::timing_guard;
use election_common::shutdown::Shutdown;
use election_common::store::{ElectionStore, StoreError};
use election_common::{CANDIDATES_TOPIC, VOTERS_TOPIC};
use health::HealthHandle;
use metrics::counter;
use rdkafka::producer::FutureProducer;
use tracing::{error, info, warn};

use crate::metrics_consts::{
    CANDIDATES_REGISTERED, IDENTITY_FETCH_FAILED, PUBLISH_FAILED, REGISTRATION_TIME,
    STORE_WRITE_FAILED, VOTERS_ALREADY_REGISTERED, VOTERS_REGISTERED,
};

/// Outcome of a successful `register_voter` call. The voter row exists either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    /// False when the voter id was already present and the insert was a no-op.
    pub newly_inserted: bool,
    pub published: bool,
}

pub struct Registrar {
    store: ElectionStore,
    producer: FutureProducer<KafkaContext>,
    identity: IdentityGenerator,
    liveness: HealthHandle,
    candidate_count: usize,
    voter_count: usize,
    voter_interval: Duration,
    flush_timeout: Duration,
}

impl Registrar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: ElectionStore,
        producer: FutureProducer<KafkaContext>,
        identity: IdentityGenerator,
        liveness: HealthHandle,
        candidate_count: usize,
        voter_count: usize,
        voter_interval: Duration,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            store,
            producer,
            identity,
            liveness,
            candidate_count,
            voter_count,
            voter_interval,
            flush_timeout,
        }
    }

    /// Seed the candidates table when it is empty. Candidates whose identity
    /// could not be fetched are skipped, so fewer than `candidate_count` rows
    /// may be written. Returns the number of candidates inserted.
    pub async fn bootstrap_candidates(&self) -> Result<usize, StoreError> {
        let existing = self.store.count_candidates().await?;
        if existing > 0 {
            info!(existing, "candidates already registered, skipping bootstrap");
            return Ok(0);
        }

        let mut inserted = 0;
        for index in 0..self.candidate_count {
            let Some(candidate) = self
                .identity
                .generate_candidate(index, self.candidate_count)
                .await
            else {
                counter!(IDENTITY_FETCH_FAILED, "kind" => "candidate").increment(1);
                continue;
            };

            if !self.store.insert_candidate(&candidate).await? {
                continue;
            }
            inserted += 1;
            counter!(CANDIDATES_REGISTERED).increment(1);
            info!(
                candidate_id = %candidate.candidate_id,
                party = %candidate.party_affiliation,
                "registered candidate"
            );

            if let Err(err) = send_to_kafka(
                &self.producer,
                CANDIDATES_TOPIC,
                Some(candidate.candidate_id.as_str()),
                &candidate,
            )
            .await
            {
                counter!(PUBLISH_FAILED, "topic" => CANDIDATES_TOPIC).increment(1);
                warn!(candidate_id = %candidate.candidate_id, "failed to publish candidate: {}", err);
            }
        }

        if inserted < self.candidate_count {
            warn!(
                inserted,
                requested = self.candidate_count,
                "registered fewer candidates than requested"
            );
        }
        Ok(inserted)
    }

    /// Store the voter, then publish it to the voters topic keyed by voter id.
    /// A publish failure does not undo the stored row.
    pub async fn register_voter(&self, voter: &Voter) -> Result<Registered, StoreError> {
        let _timing = timing_guard(REGISTRATION_TIME);

        let newly_inserted = match self.store.insert_voter(voter).await {
            Ok(inserted) => inserted,
            Err(err) => {
                counter!(STORE_WRITE_FAILED).increment(1);
                return Err(err);
            }
        };
        if newly_inserted {
            counter!(VOTERS_REGISTERED).increment(1);
        } else {
            counter!(VOTERS_ALREADY_REGISTERED).increment(1);
        }

        let key = Some(voter.voter_id.as_str());
        let published = match send_to_kafka(&self.producer, VOTERS_TOPIC, key, voter).await {
            Ok(()) => true,
            Err(err) => {
                counter!(PUBLISH_FAILED, "topic" => VOTERS_TOPIC).increment(1);
                error!(voter_id = %voter.voter_id, "failed to publish voter: {}", err);
                false
            }
        };

        Ok(Registered {
            newly_inserted,
            published,
        })
    }

    /// Register up to `voter_count` voters (forever when 0), pausing
    /// `voter_interval` between attempts. Returns the number of voters
    /// stored. The producer is flushed before returning.
    pub async fn run(&self, mut shutdown: Shutdown) -> usize {
        let mut attempts = 0;
        let mut registered = 0;

        while self.voter_count == 0 || attempts < self.voter_count {
            if shutdown.is_triggered() {
                break;
            }
            attempts += 1;
            self.liveness.report_healthy();

            match self.identity.generate_voter().await {
                Some(voter) => match self.register_voter(&voter).await {
                    Ok(outcome) => {
                        registered += 1;
                        info!(
                            voter_id = %voter.voter_id,
                            published = outcome.published,
                            "registered voter {}",
                            attempts
                        );
                    }
                    Err(err) => {
                        error!(voter_id = %voter.voter_id, "failed to store voter: {}", err);
                    }
                },
                None => {
                    counter!(IDENTITY_FETCH_FAILED, "kind" => "voter").increment(1);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.voter_interval) => {},
                _ = shutdown.wait() => break,
            }
        }

        info!(attempts, registered, "registration loop finished");
        flush_producer(&self.producer, self.flush_timeout);
        registered
    }
}
