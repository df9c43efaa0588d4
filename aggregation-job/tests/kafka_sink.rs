use std::time::Duration;

use aggregation_job::aggregate::RegionTurnout;
use aggregation_job::sink::{AggregateSink, KafkaSink};
use assert_json_diff::assert_json_eq;
use chrono::{TimeZone, Utc};
use election_common::kafka_consumer::create_stream_consumer;
use election_common::test::{create_mock_kafka, mock_kafka_config};
use election_common::TURNOUT_BY_LOCATION_TOPIC;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};
use serde_json::{json, Value};

#[tokio::test]
async fn publishes_one_unkeyed_message_per_group() {
    let (cluster, producer) = create_mock_kafka(&[TURNOUT_BY_LOCATION_TOPIC]).await;
    let sink = KafkaSink::new(producer, TURNOUT_BY_LOCATION_TOPIC);
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    let rows = vec![
        RegionTurnout {
            state: Some("Kent".to_owned()),
            total_votes: 4,
            window_start: None,
            window_end: None,
        },
        RegionTurnout {
            state: Some("Fife".to_owned()),
            total_votes: 1,
            window_start: Some(start),
            window_end: Some(start + chrono::Duration::minutes(5)),
        },
    ];
    sink.write_batch(0, &rows).await.unwrap();

    let consumer: StreamConsumer =
        create_stream_consumer(&mock_kafka_config(&cluster), "reader", "earliest").unwrap();
    let mut assignment = TopicPartitionList::new();
    assignment
        .add_partition_offset(TURNOUT_BY_LOCATION_TOPIC, 0, Offset::Beginning)
        .unwrap();
    consumer.assign(&assignment).unwrap();

    let mut received = Vec::new();
    while received.len() < 2 {
        let message = tokio::time::timeout(Duration::from_secs(10), consumer.recv())
            .await
            .expect("timed out waiting for aggregate rows");
        let Ok(message) = message else { continue };
        assert_eq!(message.key(), None);
        let value: Value = serde_json::from_slice(message.payload().unwrap()).unwrap();
        received.push(value);
    }

    assert_json_eq!(received[0], json!({"state": "Kent", "total_votes": 4}));
    assert_json_eq!(
        received[1],
        json!({
            "state": "Fife",
            "total_votes": 1,
            "window_start": "2024-06-01T12:00:00Z",
            "window_end": "2024-06-01T12:05:00Z"
        })
    );
}
