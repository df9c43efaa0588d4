//! Grouped running aggregates over the vote stream, emitted in update mode.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::schema::VoteEvent;
use crate::watermark::Watermark;

/// Time bucket an aggregate row belongs to. Absent when windowing is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// Tumbling window of `length` containing `time`.
    pub fn containing(time: DateTime<Utc>, length: Duration) -> Option<Self> {
        let start = time.duration_trunc(length).ok()?;
        Some(Window {
            start,
            end: start + length,
        })
    }
}

/// A grouping key, the value each event contributes to its group, and the
/// shape of the emitted row.
pub trait Aggregation: Send + Sync + 'static {
    type Key: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync;
    type Output: Serialize + Debug + Clone + Send + Sync;

    fn key(event: &VoteEvent) -> Self::Key;
    fn contribution(event: &VoteEvent) -> i64;
    fn output(key: &Self::Key, total: i64, window: Option<Window>) -> Self::Output;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey {
    pub candidate_id: Option<String>,
    pub candidate_name: Option<String>,
    pub party_affiliation: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateTotal {
    pub candidate_id: Option<String>,
    pub candidate_name: Option<String>,
    pub party_affiliation: Option<String>,
    pub photo_url: Option<String>,
    pub total_votes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
}

/// Sum of vote weights per candidate.
pub struct VotesPerCandidate;

impl Aggregation for VotesPerCandidate {
    type Key = CandidateKey;
    type Output = CandidateTotal;

    fn key(event: &VoteEvent) -> CandidateKey {
        CandidateKey {
            candidate_id: event.candidate_id.clone(),
            candidate_name: event.candidate_name.clone(),
            party_affiliation: event.party_affiliation.clone(),
            photo_url: event.photo_url.clone(),
        }
    }

    fn contribution(event: &VoteEvent) -> i64 {
        // A null vote does not add to the sum
        event.vote.unwrap_or(0)
    }

    fn output(key: &CandidateKey, total: i64, window: Option<Window>) -> CandidateTotal {
        CandidateTotal {
            candidate_id: key.candidate_id.clone(),
            candidate_name: key.candidate_name.clone(),
            party_affiliation: key.party_affiliation.clone(),
            photo_url: key.photo_url.clone(),
            total_votes: total,
            window_start: window.map(|w| w.start),
            window_end: window.map(|w| w.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionTurnout {
    pub state: Option<String>,
    pub total_votes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
}

/// Count of vote records per voter region.
pub struct TurnoutByLocation;

impl Aggregation for TurnoutByLocation {
    type Key = Option<String>;
    type Output = RegionTurnout;

    fn key(event: &VoteEvent) -> Option<String> {
        event.state.clone()
    }

    fn contribution(_: &VoteEvent) -> i64 {
        1
    }

    fn output(key: &Option<String>, total: i64, window: Option<Window>) -> RegionTurnout {
        RegionTurnout {
            state: key.clone(),
            total_votes: total,
            window_start: window.map(|w| w.start),
            window_end: window.map(|w| w.end),
        }
    }
}

/// One group of aggregation state, as persisted in checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry<K> {
    pub window: Option<Window>,
    pub key: K,
    pub total: i64,
}

#[derive(Debug)]
pub struct BatchOutcome<O> {
    /// Current totals of the groups touched by the batch, in key order.
    pub updates: Vec<O>,
    pub accepted: usize,
    pub late: usize,
    pub evicted: usize,
}

pub struct GroupedAggregator<A: Aggregation> {
    groups: BTreeMap<(Option<Window>, A::Key), i64>,
    watermark: Watermark,
    window_length: Option<Duration>,
}

impl<A: Aggregation> GroupedAggregator<A> {
    pub fn new(watermark_delay: Duration, window_length: Option<Duration>) -> Self {
        Self {
            groups: BTreeMap::new(),
            watermark: Watermark::new(watermark_delay),
            window_length,
        }
    }

    pub fn restore(
        watermark_delay: Duration,
        window_length: Option<Duration>,
        max_event_time: Option<DateTime<Utc>>,
        entries: Vec<StateEntry<A::Key>>,
    ) -> Self {
        let groups = entries
            .into_iter()
            .map(|entry| ((entry.window, entry.key), entry.total))
            .collect();
        Self {
            groups,
            watermark: Watermark::restore(watermark_delay, max_event_time),
            window_length,
        }
    }

    pub fn snapshot(&self) -> Vec<StateEntry<A::Key>> {
        self.groups
            .iter()
            .map(|((window, key), total)| StateEntry {
                window: *window,
                key: key.clone(),
                total: *total,
            })
            .collect()
    }

    pub fn max_event_time(&self) -> Option<DateTime<Utc>> {
        self.watermark.max_seen()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn total(&self, key: &A::Key) -> Option<i64> {
        self.groups.get(&(None, key.clone())).copied()
    }

    /// Fold one micro-batch into the running totals. Events behind the
    /// watermark are dropped. Windows that closed behind the watermark are
    /// evicted after their final totals were emitted.
    pub fn apply_batch(
        &mut self,
        events: impl IntoIterator<Item = VoteEvent>,
    ) -> BatchOutcome<A::Output> {
        let mut changed = BTreeSet::new();
        let mut accepted = 0;
        let mut late = 0;

        for event in events {
            if self.watermark.is_late(event.voting_time) {
                late += 1;
                continue;
            }
            self.watermark.observe(event.voting_time);
            accepted += 1;

            let window = match self.window_length {
                Some(length) => Window::containing(event.voting_time, length),
                None => None,
            };
            let group = (window, A::key(&event));
            *self.groups.entry(group.clone()).or_insert(0) += A::contribution(&event);
            changed.insert(group);
        }

        let updates = changed
            .into_iter()
            .filter_map(|group| {
                let total = self.groups.get(&group)?;
                Some(A::output(&group.1, *total, group.0))
            })
            .collect();

        let evicted = self.evict_closed_windows();

        BatchOutcome {
            updates,
            accepted,
            late,
            evicted,
        }
    }

    fn evict_closed_windows(&mut self) -> usize {
        let Some(watermark) = self.watermark.current() else {
            return 0;
        };
        let before = self.groups.len();
        self.groups.retain(|(window, _), _| match window {
            Some(window) => window.end > watermark,
            None => true,
        });
        before - self.groups.len()
    }
}
