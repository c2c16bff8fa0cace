//! Debounced catalog writer.
//!
//! Registry mutations only mark the registry dirty. The writer waits for a
//! quiet period, snapshots the whole registry and hands the catalog to the
//! sink, retrying with backoff. A batch that keeps failing is logged and the
//! engine carries on; the next dirty signal tries again.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::model::Catalog;
use super::store::CatalogSink;
use crate::domain::RetryPolicy;
use crate::registry::UnitRegistry;
use crate::{Error, Result};

/// Catalog persistence configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub catalog_path: PathBuf,
    /// Quiet period after a mutation before the catalog is written.
    pub debounce_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/catalog.json"),
            debounce_ms: 2000,
            retry: RetryPolicy::default(),
        }
    }
}

impl PersistenceConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.catalog_path.as_os_str().is_empty() {
            return Err(Error::config("persistence.catalog_path cannot be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("persistence.retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

pub struct CatalogWriter {
    registry: Arc<UnitRegistry>,
    sink: Arc<dyn CatalogSink>,
    config: PersistenceConfig,
    cancellation_token: CancellationToken,
    /// Registry revision covered by the last successful write.
    flushed_revision: AtomicU64,
    failed_batches: AtomicU64,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl CatalogWriter {
    pub fn new(
        registry: Arc<UnitRegistry>,
        sink: Arc<dyn CatalogSink>,
        config: PersistenceConfig,
        cancellation_token: CancellationToken,
    ) -> Self {
        let flushed_revision = AtomicU64::new(registry.revision());
        Self {
            registry,
            sink,
            config,
            cancellation_token,
            flushed_revision,
            failed_batches: AtomicU64::new(0),
            task: parking_lot::Mutex::new(None),
        }
    }

    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_none() {
            debug!(debounce = ?self.config.debounce(), "Starting catalog writer");
            *task = Some(tokio::spawn(self.clone().write_loop()));
        }
    }

    async fn write_loop(self: Arc<Self>) {
        let dirty = self.registry.dirty_notifier();
        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = dirty.notified() => {}
            }

            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.debounce()) => {}
            }

            if !self.is_dirty() {
                continue;
            }
            if let Err(e) = self.flush_with_retry().await {
                self.failed_batches.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Catalog write failed, will retry on next change");
            }
        }
        debug!("Catalog writer loop exited");
    }

    /// Whether the registry changed since the last successful write.
    pub fn is_dirty(&self) -> bool {
        self.registry.revision() != self.flushed_revision.load(Ordering::Acquire)
    }

    pub fn flushed_revision(&self) -> u64 {
        self.flushed_revision.load(Ordering::Acquire)
    }

    /// Batches that failed after every retry.
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    /// Write the current registry once, without retrying.
    pub async fn flush(&self) -> Result<()> {
        let revision = self.registry.revision();
        let catalog = Catalog::from_units(&self.registry.snapshot());
        self.sink.save(&catalog).await?;
        self.flushed_revision.fetch_max(revision, Ordering::AcqRel);
        debug!(revision, units = catalog.len(), "Catalog flushed");
        Ok(())
    }

    /// Write the current registry, retrying per the configured policy.
    ///
    /// Waiting between attempts stops early on shutdown; the final flush in
    /// [`CatalogWriter::shutdown`] covers what was skipped.
    pub async fn flush_with_retry(&self) -> Result<()> {
        let policy = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            match self.flush().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if !policy.should_retry(attempt) {
                        return Err(e);
                    }
                    let delay = policy.delay_for_attempt(attempt - 1);
                    warn!(
                        attempt,
                        max = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying catalog write"
                    );
                    tokio::select! {
                        _ = self.cancellation_token.cancelled() => return Err(e),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Stop the loop and write any pending changes.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancellation_token.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Catalog writer task failed: {}", e);
            }
        }

        if self.is_dirty() {
            self.flush().await?;
            info!("Final catalog flush complete");
        }
        Ok(())
    }
}
