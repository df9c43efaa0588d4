//! PostgreSQL access for the registration producer and the voting worker.
//!
//! Both processes share the same database but never share a connection pool.
//! The `UNIQUE (voter_id)` constraint on `votes` is the only coordination
//! between them and between concurrent voting workers.
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::messages::candidate::Candidate;
use crate::messages::vote::VoteRecord;
use crate::messages::voter::Voter;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("migrations failed with: {error}")]
    MigrationError { error: sqlx::migrate::MigrateError },
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("voter {voter_id} has already voted")]
    DuplicateVote { voter_id: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

fn query_error(command: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |error| StoreError::QueryError {
        command: command.to_owned(),
        error,
    }
}

#[derive(Clone)]
pub struct ElectionStore {
    pool: PgPool,
}

impl ElectionStore {
    pub async fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_pg_connections)
            .connect_with(config.connect_options())
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the base and snapshot tables if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|error| StoreError::MigrationError { error })
    }

    pub async fn count_candidates(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM candidates")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    /// Returns false when a candidate with the same id already exists.
    pub async fn insert_candidate(&self, candidate: &Candidate) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
INSERT INTO candidates
    (candidate_id, candidate_name, party_affiliation, biography, campaign_platform, photo_url)
VALUES
    ($1, $2, $3, $4, $5, $6)
ON CONFLICT (candidate_id) DO NOTHING
            "#,
        )
        .bind(&candidate.candidate_id)
        .bind(&candidate.candidate_name)
        .bind(&candidate.party_affiliation)
        .bind(&candidate.biography)
        .bind(&candidate.campaign_platform)
        .bind(&candidate.photo_url)
        .execute(&self.pool)
        .await
        .map_err(query_error("INSERT"))?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn load_candidates(&self) -> StoreResult<Vec<Candidate>> {
        sqlx::query_as::<_, Candidate>(
            r#"
SELECT
    candidate_id, candidate_name, party_affiliation, biography, campaign_platform, photo_url
FROM candidates
ORDER BY candidate_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("SELECT"))
    }

    /// Idempotent on `voter_id`: returns false when the voter was already registered.
    pub async fn insert_voter(&self, voter: &Voter) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
INSERT INTO voters (
    voter_id, voter_name, date_of_birth, gender, nationality,
    registration_number, address_street, address_city, address_state,
    address_country, address_postcode, email, phone_number,
    cell_number, picture, registered_age
)
VALUES
    ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
ON CONFLICT (voter_id) DO NOTHING
            "#,
        )
        .bind(&voter.voter_id)
        .bind(&voter.voter_name)
        .bind(&voter.date_of_birth)
        .bind(&voter.gender)
        .bind(&voter.nationality)
        .bind(&voter.registration_number)
        .bind(&voter.address.street)
        .bind(&voter.address.city)
        .bind(&voter.address.state)
        .bind(&voter.address.country)
        .bind(&voter.address.postcode)
        .bind(&voter.email)
        .bind(&voter.phone_number)
        .bind(&voter.cell_number)
        .bind(&voter.picture)
        .bind(voter.registered_age)
        .execute(&self.pool)
        .await
        .map_err(query_error("INSERT"))?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a ballot in its own transaction. Any failure rolls the
    /// transaction back before returning; a second ballot for the same voter
    /// surfaces as `StoreError::DuplicateVote`.
    pub async fn insert_vote(&self, vote: &VoteRecord) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        let inserted = sqlx::query(
            r#"
INSERT INTO votes (voter_id, candidate_id, voting_time, vote)
VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&vote.voter_id)
        .bind(&vote.candidate_id)
        .bind(vote.voting_time.naive_utc())
        .bind(vote.vote)
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            if let Err(rollback_error) = tx.rollback().await {
                warn!("failed to roll back vote transaction: {}", rollback_error);
            }
            return Err(match &error {
                sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
                    StoreError::DuplicateVote {
                        voter_id: vote.voter_id.clone(),
                    }
                }
                _ => StoreError::QueryError {
                    command: "INSERT".to_owned(),
                    error,
                },
            });
        }

        tx.commit().await.map_err(query_error("COMMIT"))
    }

    pub async fn count_votes(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM votes")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    pub async fn count_voters(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM voters")
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }
}
