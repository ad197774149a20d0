//! The persistence contract scrape sessions write through.

use crate::error::Result;
use std::sync::Arc;
use wosync_core::ScrapeResult;

/// Durable destination for scrape results.
///
/// Writes are upserts keyed by item id: rescraping an item overwrites its row.
/// Implementations must tolerate independent connections from several worker
/// processes writing to the same store; no cross-write transaction is implied.
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist a single result.
    async fn write(&self, result: &ScrapeResult) -> Result<()>;

    /// Persist several results. The default writes them one at a time.
    async fn write_batch(&self, results: &[ScrapeResult]) -> Result<()> {
        for result in results {
            self.write(result).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: ResultSink + ?Sized> ResultSink for Arc<T> {
    async fn write(&self, result: &ScrapeResult) -> Result<()> {
        (**self).write(result).await
    }

    async fn write_batch(&self, results: &[ScrapeResult]) -> Result<()> {
        (**self).write_batch(results).await
    }
}
