//! Hand-off of finished enrichment records to storage.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::models::CombinedEnrichmentResult;

/// Receives each combined record once its run has finished.
#[async_trait]
pub trait EnrichmentSink: Send + Sync {
    async fn store(&self, result: &CombinedEnrichmentResult) -> anyhow::Result<()>;
}

/// Writes the record as pretty JSON, replacing the file's contents.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EnrichmentSink for JsonFileSink {
    async fn store(&self, result: &CombinedEnrichmentResult) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(result)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        info!("Enrichment result written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ResultAggregator, SiteOutcomes};
    use crate::models::LocationQuery;

    #[tokio::test]
    async fn writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("out").join("result.json"));
        let query = LocationQuery::new("1 Main St", Some("Hickory"), "NC", None).unwrap();
        let result = ResultAggregator::default().aggregate(query, SiteOutcomes::default());

        sink.store(&result).await.unwrap();

        let raw = std::fs::read_to_string(sink.path()).unwrap();
        let parsed: CombinedEnrichmentResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, result);
        assert!(raw.contains("\"walkability\""));
    }
}
