use chrono::{DateTime, Duration, Utc};

/// Bounded out-of-orderness watermark: events may arrive up to `delay` behind
/// the newest event seen so far. Anything older is late.
#[derive(Debug, Clone)]
pub struct Watermark {
    delay: Duration,
    max_seen: Option<DateTime<Utc>>,
}

impl Watermark {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_seen: None,
        }
    }

    /// Rebuild from a checkpointed maximum event time.
    pub fn restore(delay: Duration, max_seen: Option<DateTime<Utc>>) -> Self {
        Self { delay, max_seen }
    }

    pub fn max_seen(&self) -> Option<DateTime<Utc>> {
        self.max_seen
    }

    /// `max_seen - delay`, or `None` before the first event.
    pub fn current(&self) -> Option<DateTime<Utc>> {
        self.max_seen.map(|max| max - self.delay)
    }

    pub fn is_late(&self, event_time: DateTime<Utc>) -> bool {
        self.current()
            .is_some_and(|watermark| event_time < watermark)
    }

    /// Advance with an accepted event. The watermark never moves backwards.
    pub fn observe(&mut self, event_time: DateTime<Utc>) {
        self.max_seen = Some(match self.max_seen {
            Some(max) if max >= event_time => max,
            _ => event_time,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, second).unwrap()
    }

    #[test]
    fn nothing_is_late_before_the_first_event() {
        let watermark = Watermark::new(Duration::minutes(1));
        assert_eq!(watermark.current(), None);
        assert!(!watermark.is_late(at(0, 0)));
    }

    #[test]
    fn tolerates_bounded_disorder() {
        let mut watermark = Watermark::new(Duration::minutes(1));
        watermark.observe(at(10, 0));
        watermark.observe(at(5, 0));
        assert_eq!(watermark.max_seen(), Some(at(10, 0)));
        assert_eq!(watermark.current(), Some(at(9, 0)));

        assert!(!watermark.is_late(at(9, 30)));
        assert!(!watermark.is_late(at(9, 0)));
        assert!(watermark.is_late(at(8, 59)));
    }

    #[test]
    fn restores_from_checkpoint() {
        let watermark = Watermark::restore(Duration::minutes(1), Some(at(10, 0)));
        assert!(watermark.is_late(at(8, 0)));
    }
}
