use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::{KnowledgeStore, MemoryEntry, rank_entries};

/// Append-only JSON-lines knowledge log. One entry per line; lines are never
/// rewritten.
pub struct JsonlKnowledgeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlKnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable entry in insertion order. A missing file is an empty store.
    ///
    /// Waits for an in-flight append so a half-written line is never parsed.
    pub async fn load(&self) -> Result<Vec<MemoryEntry>> {
        let _guard = self.write_lock.lock().await;
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read knowledge log {}", self.path.display())
                });
            }
        };

        let mut entries = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    error = %err,
                    "skipping unreadable knowledge entry"
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl KnowledgeStore for JsonlKnowledgeStore {
    async fn append(&self, entry: MemoryEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.with_context(|| {
                    format!("failed to create knowledge directory {}", parent.display())
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open knowledge log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }

    async fn query(&self, topic: &str) -> Result<Vec<MemoryEntry>> {
        Ok(rank_entries(self.load().await?, topic))
    }
}
