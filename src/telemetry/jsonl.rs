use super::{TelemetryError, TelemetryEvent, TelemetryStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one JSON object per line to a file.
///
/// Appends are serialized so concurrent executions never interleave lines.
/// The file and its parent directory are created on first write.
#[derive(Debug)]
pub struct JsonlTelemetryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTelemetryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every event back from a JSONL file. Blank lines are skipped.
    pub async fn read_events(path: &Path) -> Result<Vec<TelemetryEvent>, TelemetryError> {
        let content = tokio::fs::read_to_string(path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(TelemetryError::from))
            .collect()
    }
}

#[async_trait]
impl TelemetryStore for JsonlTelemetryStore {
    async fn append(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::trace!(path = %self.path.display(), "Telemetry event appended");
        Ok(())
    }
}
