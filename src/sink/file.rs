use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{RecordSink, SinkError};
use crate::aggregator::record::ActiveRecord;

/// Append-only, newline-delimited JSON file sink. The file is created
/// on first write.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        FileSink { path }
    }
}

#[async_trait]
impl RecordSink for FileSink {
    async fn write(&self, record: &ActiveRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended record to {}", self.path.display());
        Ok(())
    }
}
