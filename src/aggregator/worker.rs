use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::record::{ActiveRecord, InboundEvent};
use super::table::RecordTable;
use crate::sink::RecordSink;

/// Timing knobs for the aggregator. Merge and flush windows are
/// deliberately independent parameters; the flush interval only
/// controls how often the eviction scan runs.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AggregatorSettings {
    /// Maximum gap between two events from the same creator for them
    /// to land in one record.
    pub merge_window_ms: u64,
    /// Minimum age before an open record is considered complete.
    pub flush_window_ms: u64,
    /// Period of the eviction scan.
    pub flush_interval_ms: u64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            merge_window_ms: 1000,
            flush_window_ms: 5000,
            flush_interval_ms: 1000,
        }
    }
}

/// Owner of the spawned aggregator task.
pub struct AggregatorHandle {
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Spawns the aggregator loop as a tokio task. The task owns the
    /// record table outright; ingestion and flushing are serialized by
    /// the single `select!` loop, never by a lock.
    pub fn spawn(
        settings: AggregatorSettings,
        events: mpsc::Receiver<InboundEvent>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        info!("Spawning aggregator with settings: {:?}", settings);
        let task = tokio::spawn(async move {
            run_aggregator(settings, events, sink).await;
        });
        Self { task }
    }

    /// Waits for the aggregator to finish. It exits once the event
    /// channel closes and the remaining records are drained.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Aggregator task failed: {}", e);
        }
    }
}

async fn run_aggregator(
    settings: AggregatorSettings,
    mut events: mpsc::Receiver<InboundEvent>,
    sink: Arc<dyn RecordSink>,
) {
    let merge_window = Duration::milliseconds(settings.merge_window_ms as i64);
    let flush_window = Duration::milliseconds(settings.flush_window_ms as i64);

    let mut table = RecordTable::new();
    let mut flush_timer =
        tokio::time::interval(std::time::Duration::from_millis(settings.flush_interval_ms));
    flush_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_event = events.recv() => match maybe_event {
                Some(event) => {
                    debug!("Ingesting event on '{}' ({} bytes)", event.topic, event.payload.len());
                    if let Some(completed) = table.ingest(&event, merge_window) {
                        dispatch(&sink, completed);
                    }
                }
                None => break,
            },
            _ = flush_timer.tick() => {
                for record in table.flush_due(Utc::now(), flush_window) {
                    dispatch(&sink, record);
                }
            }
        }
    }

    // Channel closed: the transport is gone, persist what is left.
    info!("Event channel closed, draining {} active records", table.len());
    for record in table.drain() {
        write_record(&sink, &record).await;
    }
}

/// Hands a completed record to the sink without blocking the loop. A
/// slow or failing sink write must never stall ingestion, so the write
/// runs in its own task and failures are only logged.
fn dispatch(sink: &Arc<dyn RecordSink>, record: ActiveRecord) {
    let sink = Arc::clone(sink);
    tokio::spawn(async move {
        write_record(&sink, &record).await;
    });
}

async fn write_record(sink: &Arc<dyn RecordSink>, record: &ActiveRecord) {
    match sink.write(record).await {
        Ok(()) => info!(
            "Wrote record from '{}' at {}",
            record.creator, record.time_stamp
        ),
        Err(e) => error!("Failed to write record from '{}': {}", record.creator, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<ActiveRecord>>,
    }

    impl MemorySink {
        fn count(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl RecordSink for MemorySink {
        async fn write(&self, record: &ActiveRecord) -> Result<(), SinkError> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn settings(merge_ms: u64, flush_ms: u64, interval_ms: u64) -> AggregatorSettings {
        AggregatorSettings {
            merge_window_ms: merge_ms,
            flush_window_ms: flush_ms,
            flush_interval_ms: interval_ms,
        }
    }

    fn aged_event(topic: &str, payload: &str, age_ms: i64) -> InboundEvent {
        let mut event = InboundEvent::new(topic.to_string(), payload.as_bytes().to_vec());
        event.received_at = Utc::now() - Duration::milliseconds(age_ms);
        event
    }

    #[tokio::test]
    async fn aged_record_is_flushed_to_the_sink_once() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(16);
        let handle = AggregatorHandle::spawn(settings(100, 50, 10), rx, sink.clone());

        tx.send(aged_event("a/temp", "22", 500)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(sink.count(), 1);

        drop(tx);
        handle.join().await;
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn open_records_are_drained_when_the_channel_closes() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(16);
        let handle = AggregatorHandle::spawn(settings(1000, 60_000, 50), rx, sink.clone());

        tx.send(aged_event("a/temp", "22", 0)).await.unwrap();
        drop(tx);
        handle.join().await;

        assert_eq!(sink.count(), 1);
        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].creator, "a");
    }

    #[tokio::test]
    async fn displaced_record_is_dispatched_without_waiting_for_a_flush() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = mpsc::channel(16);
        // Flush window far in the future so only displacement can write.
        let handle = AggregatorHandle::spawn(settings(100, 60_000, 50), rx, sink.clone());

        tx.send(aged_event("a/temp", "22", 400)).await.unwrap();
        tx.send(aged_event("a/temp", "23", 0)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(sink.count(), 1);

        drop(tx);
        handle.join().await;
        // The displaced record plus the drained fresh one.
        assert_eq!(sink.count(), 2);
    }
}
