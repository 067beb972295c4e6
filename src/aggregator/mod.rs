//! # Topic Record Aggregator
//!
//! Groups MQTT messages that arrive close together in time from the
//! same creator into one record, and periodically flushes completed
//! records to a sink.
//!
//! The first topic segment identifies the creator, the second the data
//! label. Payloads that parse as JSON objects contribute their keys to
//! the open record; scalar or unparseable payloads land under the
//! label. A record stays open while events keep arriving within the
//! merge window and is handed to the sink once it has aged past the
//! flush window.
//!
//! ```text
//! aggregator/
//! ├── error.rs   - decode error taxonomy
//! ├── record.rs  - event/record types, topic and payload decoding
//! ├── table.rs   - keyed active-record table with window checks
//! └── worker.rs  - tokio task serializing ingest and flush
//! ```
//!
//! The worker task is the only owner of the table, so ingestion and
//! flushing never interleave. Sink writes are fire-and-forget; a slow
//! sink delays nothing but its own output.

pub mod error;
pub mod record;
pub mod table;
pub mod worker;
