use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::record::{split_topic, ActiveRecord, InboundEvent};

/// The set of currently-open records, keyed by creator.
///
/// Holds at most one record per creator. Records leave the table in
/// exactly one of three ways: displaced by an out-of-window event from
/// the same creator, evicted by `flush_due`, or drained at shutdown.
#[derive(Debug, Default)]
pub struct RecordTable {
    active: HashMap<String, ActiveRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        RecordTable {
            active: HashMap::new(),
        }
    }

    /// Routes an event into its creator's open record, or opens a new
    /// one if none exists or the gap since the creator's last event
    /// exceeds `merge_window`. In the latter case the stale record is
    /// returned so the caller can hand it to the sink; this keeps the
    /// one-record-per-creator invariant without losing data.
    pub fn ingest(
        &mut self,
        event: &InboundEvent,
        merge_window: Duration,
    ) -> Option<ActiveRecord> {
        let (creator, _) = split_topic(&event.topic);
        if let Some(record) = self.active.get_mut(creator) {
            if event.received_at - record.time_stamp <= merge_window {
                record.merge_event(event);
                return None;
            }
        }
        let fresh = ActiveRecord::from_event(event);
        self.active.insert(fresh.creator.clone(), fresh)
    }

    /// Removes and returns every record older than `now - flush_window`.
    /// A record returned here is gone from the table, so it can never
    /// be flushed a second time.
    pub fn flush_due(&mut self, now: DateTime<Utc>, flush_window: Duration) -> Vec<ActiveRecord> {
        let cutoff = now - flush_window;
        let due: Vec<String> = self
            .active
            .iter()
            .filter(|(_, record)| record.time_stamp < cutoff)
            .map(|(creator, _)| creator.clone())
            .collect();
        due.into_iter()
            .filter_map(|creator| self.active.remove(&creator))
            .collect()
    }

    /// Removes and returns all remaining records, regardless of age.
    pub fn drain(&mut self) -> Vec<ActiveRecord> {
        self.active.drain().map(|(_, record)| record).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
