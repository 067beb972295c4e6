use async_trait::async_trait;

use super::{RecordSink, SinkError};
use crate::aggregator::record::ActiveRecord;

/// Prints each completed record as one JSON line, for watching a
/// broker without touching the filesystem.
pub struct ConsoleSink;

#[async_trait]
impl RecordSink for ConsoleSink {
    async fn write(&self, record: &ActiveRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        println!("{}", line);
        Ok(())
    }
}
