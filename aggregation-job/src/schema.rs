//! The subset of a vote record the aggregations read, decoded against a fixed schema.
use chrono::{DateTime, Utc};
use election_common::messages::parse_datetime;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("vote message has no payload")]
    EmptyPayload,
    #[error("vote message does not match the schema: {0}")]
    InvalidRecord(#[from] serde_json::Error),
    #[error("unreadable voting_time {0:?}")]
    InvalidTimestamp(String),
}

/// Every column except `voting_time` is nullable. A null grouping column
/// forms its own group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEvent {
    pub candidate_id: Option<String>,
    pub candidate_name: Option<String>,
    pub party_affiliation: Option<String>,
    pub photo_url: Option<String>,
    pub state: Option<String>,
    pub voting_time: DateTime<Utc>,
    /// `None` when the vote field is missing or not castable to an integer.
    pub vote: Option<i64>,
}

#[derive(Deserialize, Default)]
struct RawAddress {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
struct RawVote {
    #[serde(default)]
    candidate_id: Option<String>,
    #[serde(default)]
    candidate_name: Option<String>,
    #[serde(default)]
    party_affiliation: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    address: Option<RawAddress>,
    voting_time: String,
    #[serde(default)]
    vote: Value,
}

/// Integer cast with the leniency of a SQL `CAST(vote AS INT)`: numbers and
/// numeric strings convert, anything else becomes null.
fn cast_vote(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f.trunc() as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl VoteEvent {
    pub fn from_payload(payload: Option<&[u8]>) -> Result<Self, SchemaError> {
        let payload = payload.ok_or(SchemaError::EmptyPayload)?;
        let raw: RawVote = serde_json::from_slice(payload)?;

        let voting_time = parse_datetime(&raw.voting_time)
            .ok_or_else(|| SchemaError::InvalidTimestamp(raw.voting_time.clone()))?;

        Ok(VoteEvent {
            vote: cast_vote(&raw.vote),
            candidate_id: raw.candidate_id,
            candidate_name: raw.candidate_name,
            party_affiliation: raw.party_affiliation,
            photo_url: raw.photo_url,
            state: raw.address.unwrap_or_default().state,
            voting_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use election_common::messages::vote::VoteRecord;
    use election_common::test::{sample_candidate, sample_voter};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn decodes_published_vote_records() {
        let voting_time = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        let record = VoteRecord::new(
            sample_voter("v-1"),
            &sample_candidate("c-1", 0),
            Uuid::new_v4(),
            voting_time,
        );
        let payload = serde_json::to_vec(&record).unwrap();

        let event = VoteEvent::from_payload(Some(&payload)).unwrap();
        assert_eq!(event.candidate_id.as_deref(), Some("c-1"));
        assert_eq!(event.party_affiliation.as_deref(), Some("Management Party"));
        assert_eq!(event.state.as_deref(), Some("Cumbria"));
        assert_eq!(event.voting_time, voting_time);
        assert_eq!(event.vote, Some(1));
    }

    #[test]
    fn vote_is_cast_leniently() {
        assert_eq!(cast_vote(&json!(1)), Some(1));
        assert_eq!(cast_vote(&json!("2")), Some(2));
        assert_eq!(cast_vote(&json!(3.0)), Some(3));
        assert_eq!(cast_vote(&json!("yes")), None);
        assert_eq!(cast_vote(&Value::Null), None);
    }

    #[test]
    fn rejects_records_outside_the_schema() {
        assert!(matches!(
            VoteEvent::from_payload(None),
            Err(SchemaError::EmptyPayload)
        ));
        assert!(matches!(
            VoteEvent::from_payload(Some(br#"{"candidate_id": "c-1"}"#)),
            Err(SchemaError::InvalidRecord(_))
        ));
        assert!(matches!(
            VoteEvent::from_payload(Some(br#"{"candidate_id": 7, "voting_time": "x"}"#)),
            Err(SchemaError::InvalidRecord(_))
        ));

        let bad_time = json!({
            "candidate_id": "c-1",
            "candidate_name": "A",
            "party_affiliation": "Savior Party",
            "photo_url": "",
            "address": {"state": "Kent"},
            "voting_time": "yesterday",
            "vote": 1
        });
        assert!(matches!(
            VoteEvent::from_payload(Some(&serde_json::to_vec(&bad_time).unwrap())),
            Err(SchemaError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn null_columns_decode_as_missing_values() {
        let record = json!({
            "candidate_id": "c-1",
            "candidate_name": null,
            "party_affiliation": "Savior Party",
            "photo_url": null,
            "address": {"state": null},
            "voting_time": "2024-06-01 12:30:00",
            "vote": 1
        });
        let event = VoteEvent::from_payload(Some(&serde_json::to_vec(&record).unwrap())).unwrap();
        assert_eq!(event.candidate_id.as_deref(), Some("c-1"));
        assert_eq!(event.candidate_name, None);
        assert_eq!(event.photo_url, None);
        assert_eq!(event.state, None);
        assert_eq!(event.vote, Some(1));

        let no_address = json!({
            "candidate_id": "c-2",
            "voting_time": "2024-06-01 12:30:00"
        });
        let event =
            VoteEvent::from_payload(Some(&serde_json::to_vec(&no_address).unwrap())).unwrap();
        assert_eq!(event.state, None);
        assert_eq!(event.photo_url, None);
        assert_eq!(event.vote, None);
    }
}
