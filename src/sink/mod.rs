//! Record sinks. A sink receives completed records from the
//! aggregator; writes are at-most-once and failures are logged by the
//! caller, never retried.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::aggregator::record::ActiveRecord;
use crate::config::{SinkConfig, SinkKind};

pub mod console;
pub mod file;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write record: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, record: &ActiveRecord) -> Result<(), SinkError>;
}

pub fn build_sink(config: &SinkConfig) -> Arc<dyn RecordSink> {
    match config.kind {
        SinkKind::File => Arc::new(file::FileSink::new(config.path.clone())),
        SinkKind::Console => Arc::new(console::ConsoleSink),
    }
}
