use async_trait::async_trait;
use election_common::kafka_producer::{send_iter_to_kafka, KafkaContext, KafkaProduceError};
use metrics::counter;
use rdkafka::producer::FutureProducer;
use serde::Serialize;
use sqlx::postgres::PgPool;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use tracing::debug;

use crate::aggregate::{CandidateTotal, RegionTurnout};
use crate::metrics_consts::ROWS_EMITTED;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to publish {failed} of {total} rows: {error}")]
    Kafka {
        failed: usize,
        total: usize,
        error: KafkaProduceError,
    },
    #[error("failed to write snapshot rows: {0}")]
    Database(#[from] sqlx::Error),
}

/// Destination of the rows a micro-batch emits. A batch may be written again
/// with the same id after a restart.
#[async_trait]
pub trait AggregateSink<T: Sync>: Send + Sync {
    fn name(&self) -> &str;
    async fn write_batch(&self, batch_id: u64, rows: &[T]) -> Result<(), SinkError>;
}

/// Publishes every row as an unkeyed JSON message.
pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaSink {
    pub fn new(producer: FutureProducer<KafkaContext>, topic: &str) -> Self {
        Self {
            producer,
            topic: topic.to_owned(),
        }
    }
}

#[async_trait]
impl<T> AggregateSink<T> for KafkaSink
where
    T: Serialize + Sync,
{
    fn name(&self) -> &str {
        &self.topic
    }

    async fn write_batch(&self, batch_id: u64, rows: &[T]) -> Result<(), SinkError> {
        let total = rows.len();
        let results = send_iter_to_kafka(&self.producer, &self.topic, rows.iter()).await;

        let mut failed = 0;
        let mut first_error = None;
        for result in results {
            if let Err(error) = result {
                failed += 1;
                first_error.get_or_insert(error);
            }
        }
        counter!(ROWS_EMITTED, "sink" => self.topic.clone()).increment((total - failed) as u64);

        match first_error {
            Some(error) => Err(SinkError::Kafka {
                failed,
                total,
                error,
            }),
            None => {
                debug!(batch_id, total, topic = %self.topic, "published aggregate rows");
                Ok(())
            }
        }
    }
}

/// A row of one of the append-only snapshot tables.
pub trait SnapshotRow {
    const TABLE: &'static str;
    /// Column list, after `batch_id`
    const COLUMNS: &'static str;

    fn bind_columns(&self, row: &mut Separated<'_, '_, Postgres, &'static str>);
}

impl SnapshotRow for CandidateTotal {
    const TABLE: &'static str = "votes_per_candidate";
    const COLUMNS: &'static str = "candidate_id, candidate_name, party_affiliation, photo_url, \
                                   total_votes, window_start, window_end";

    fn bind_columns(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.candidate_id.clone())
            .push_bind(self.candidate_name.clone())
            .push_bind(self.party_affiliation.clone())
            .push_bind(self.photo_url.clone())
            .push_bind(self.total_votes)
            .push_bind(self.window_start)
            .push_bind(self.window_end);
    }
}

impl SnapshotRow for RegionTurnout {
    const TABLE: &'static str = "turnout_by_location";
    const COLUMNS: &'static str = "state, total_votes, window_start, window_end";

    fn bind_columns(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.state.clone())
            .push_bind(self.total_votes)
            .push_bind(self.window_start)
            .push_bind(self.window_end);
    }
}

/// Appends one row per group per batch. Rows of a replayed batch replace the
/// ones written by its earlier attempt.
pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl<T> AggregateSink<T> for PostgresSink
where
    T: SnapshotRow + Sync,
{
    fn name(&self) -> &str {
        T::TABLE
    }

    async fn write_batch(&self, batch_id: u64, rows: &[T]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }
        let batch_id = i64::try_from(batch_id).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {} WHERE batch_id = $1", T::TABLE))
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        let mut insert = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} (batch_id, {}) ",
            T::TABLE,
            T::COLUMNS
        ));
        insert.push_values(rows, |mut row, snapshot| {
            row.push_bind(batch_id);
            snapshot.bind_columns(&mut row);
        });
        insert.build().execute(&mut *tx).await?;
        tx.commit().await?;

        counter!(ROWS_EMITTED, "sink" => T::TABLE).increment(rows.len() as u64);
        debug!(batch_id, total = rows.len(), table = T::TABLE, "appended aggregate rows");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candidate_row(id: &str, total: i64) -> CandidateTotal {
        CandidateTotal {
            candidate_id: Some(id.to_owned()),
            candidate_name: Some(format!("Candidate {id}")),
            party_affiliation: Some("Tech Republic Party".to_owned()),
            photo_url: Some(String::new()),
            total_votes: total,
            window_start: None,
            window_end: None,
        }
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn snapshots_are_appended_per_batch(db: PgPool) {
        let sink = PostgresSink::new(db.clone());

        sink.write_batch(0, &[candidate_row("A", 3), candidate_row("B", 2)])
            .await
            .unwrap();
        sink.write_batch(1, &[candidate_row("A", 4)]).await.unwrap();

        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT batch_id, candidate_id, total_votes FROM votes_per_candidate ORDER BY id",
        )
        .fetch_all(&db)
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![
                (0, "A".to_owned(), 3),
                (0, "B".to_owned(), 2),
                (1, "A".to_owned(), 4)
            ]
        );
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn replayed_batch_replaces_its_rows(db: PgPool) {
        let sink = PostgresSink::new(db.clone());
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let row = |total| RegionTurnout {
            state: Some("Kent".to_owned()),
            total_votes: total,
            window_start: Some(start),
            window_end: Some(start + chrono::Duration::minutes(5)),
        };

        sink.write_batch(3, &[row(1)]).await.unwrap();
        sink.write_batch(3, &[row(2)]).await.unwrap();

        let rows: Vec<(Option<String>, i64, Option<chrono::DateTime<Utc>>)> =
            sqlx::query_as("SELECT state, total_votes, window_start FROM turnout_by_location")
                .fetch_all(&db)
                .await
                .unwrap();
        assert_eq!(rows, vec![(Some("Kent".to_owned()), 2, Some(start))]);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn null_columns_are_written_as_null(db: PgPool) {
        let sink = PostgresSink::new(db.clone());
        let mut row = candidate_row("A", 1);
        row.photo_url = None;
        let turnout = RegionTurnout {
            state: None,
            total_votes: 1,
            window_start: None,
            window_end: None,
        };

        sink.write_batch(0, &[row]).await.unwrap();
        sink.write_batch(0, &[turnout]).await.unwrap();

        let photo: (Option<String>,) =
            sqlx::query_as("SELECT photo_url FROM votes_per_candidate")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(photo, (None,));
        let state: (Option<String>, i64) =
            sqlx::query_as("SELECT state, total_votes FROM turnout_by_location")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(state, (None, 1));
    }
}
