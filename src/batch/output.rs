use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::Result;

/// Destination of per-item batch artifacts.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write_item_artifact(
        &self,
        output_dir: &Path,
        file_name: &str,
        content: &Value,
    ) -> Result<PathBuf>;
}

/// Writes artifacts as pretty-printed JSON files, creating the directory as needed.
#[derive(Debug, Clone, Default)]
pub struct FsOutputSink;

#[async_trait]
impl OutputSink for FsOutputSink {
    async fn write_item_artifact(
        &self,
        output_dir: &Path,
        file_name: &str,
        content: &Value,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(output_dir).await?;
        let path = output_dir.join(file_name);
        let text = serde_json::to_string_pretty(content)?;
        tokio::fs::write(&path, text).await?;
        debug!("output::write({})", path.display());
        Ok(path)
    }
}
