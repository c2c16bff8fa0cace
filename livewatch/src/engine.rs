//! Engine wiring and the operator surface.
//!
//! The engine owns the registry and the three background services (catalog
//! writer, health scheduler, discovery crawler) and shares one cancellation
//! token between them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogWriter, JsonCatalogStore};
use crate::config::EngineConfig;
use crate::discovery::{
    DiscoveryCrawler, DiscoveryReport, HlsPageSource, ImportReport, SearchDescriptor,
    SearchProvider, YtDlpSearch, import_units,
};
use crate::domain::Unit;
use crate::prober::{FfmpegFrameSource, FrameProber, FrameSource};
use crate::recovery::{RecoveryController, Transition};
use crate::registry::{NewUnit, StatusCounts, UnitEvent, UnitEventBroadcaster, UnitRegistry};
use crate::resolver::{Resolver, YtDlpResolver};
use crate::scheduler::{HealthScheduler, SchedulerStatsSnapshot};
use crate::{Error, Result};

/// External capabilities the engine drives.
#[derive(Clone)]
pub struct Capabilities {
    pub resolver: Arc<dyn Resolver>,
    pub frame_source: Arc<dyn FrameSource>,
    pub search: Arc<dyn SearchProvider>,
    /// Answers `hls_page` descriptors.
    pub page_source: Arc<dyn SearchProvider>,
}

impl Capabilities {
    /// The `yt-dlp` and `ffmpeg` backed implementations, plus the HTTP directory scraper.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            resolver: Arc::new(YtDlpResolver::new(config.resolver.clone())),
            frame_source: Arc::new(FfmpegFrameSource::new(&config.prober)),
            search: Arc::new(YtDlpSearch::new(
                config.resolver.ytdlp_path.clone(),
                config.discovery.results_per_term,
                config.discovery.search_timeout(),
            )),
            page_source: Arc::new(HlsPageSource::new(config.discovery.hls.clone())?),
        })
    }
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub scheduler: SchedulerStatsSnapshot,
    pub units: StatusCounts,
    pub crawler_paused: bool,
    /// Catalog batches that failed after every retry.
    pub failed_catalog_writes: u64,
}

pub struct Engine {
    registry: Arc<UnitRegistry>,
    scheduler: HealthScheduler,
    crawler: Arc<DiscoveryCrawler>,
    writer: Arc<CatalogWriter>,
    store: JsonCatalogStore,
    cancellation_token: CancellationToken,
    discovery_enabled: bool,
}

impl Engine {
    /// Load the catalog and wire every service without starting them.
    ///
    /// Fails with [`Error::CatalogCorrupt`] when the catalog cannot be trusted.
    pub fn open(config: EngineConfig, capabilities: Capabilities) -> Result<Self> {
        config.validate()?;

        let store = JsonCatalogStore::new(config.persistence.catalog_path.clone());
        let units = store.load_units()?;
        let registry = UnitRegistry::seeded(units, UnitEventBroadcaster::new())
            .map_err(|e| Error::catalog_corrupt(store.path(), e.to_string()))?;
        let registry = Arc::new(registry);

        let cancellation_token = CancellationToken::new();

        let writer = Arc::new(CatalogWriter::new(
            registry.clone(),
            Arc::new(store.clone()),
            config.persistence.clone(),
            cancellation_token.clone(),
        ));

        let scheduler = HealthScheduler::new(
            registry.clone(),
            capabilities.resolver,
            FrameProber::new(capabilities.frame_source, config.prober.clone()),
            RecoveryController::new(config.recovery.clone()),
            config.scheduler.clone(),
            config.resolver.min_quality,
            cancellation_token.clone(),
        );

        let crawler = Arc::new(DiscoveryCrawler::new(
            registry.clone(),
            capabilities.search,
            capabilities.page_source,
            config.discovery.clone(),
            cancellation_token.clone(),
        )?);

        Ok(Self {
            registry,
            scheduler,
            crawler,
            writer,
            store,
            cancellation_token,
            discovery_enabled: config.discovery.enabled,
        })
    }

    /// Open the engine and start the writer, scheduler and crawler.
    pub fn start(config: EngineConfig, capabilities: Capabilities) -> Result<Self> {
        let engine = Self::open(config, capabilities)?;
        engine.spawn_services();
        Ok(engine)
    }

    fn spawn_services(&self) {
        self.writer.start();
        self.scheduler.start();
        if self.discovery_enabled {
            self.crawler.start();
        } else {
            info!("Discovery crawler disabled");
        }
        info!(units = self.registry.len(), "Engine started");
    }

    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.registry
    }

    /// Make a unit due for a probe now.
    pub fn trigger_probe(&self, id: &str) -> Result<()> {
        self.scheduler.trigger_probe(id)
    }

    /// Check a unit immediately and wait for the outcome.
    pub async fn check_now(&self, id: &str) -> Result<Transition> {
        self.scheduler.check_now(id).await
    }

    /// Add an operator unit. A duplicate source is an error here.
    pub fn add_unit(&self, new_unit: NewUnit) -> Result<Unit> {
        self.registry.admit(new_unit)
    }

    pub fn remove_unit(&self, id: &str) -> Result<Unit> {
        self.registry.remove(id)
    }

    pub fn add_descriptor(&self, descriptor: SearchDescriptor) -> Result<bool> {
        self.crawler.add_descriptor(descriptor)
    }

    pub fn remove_descriptor(&self, term: &str) -> bool {
        self.crawler.remove_descriptor(term)
    }

    pub fn descriptors(&self) -> Vec<SearchDescriptor> {
        self.crawler.descriptors()
    }

    pub fn pause_crawler(&self) {
        self.crawler.pause();
    }

    pub fn resume_crawler(&self) {
        self.crawler.resume();
    }

    pub async fn run_discovery_once(&self) -> DiscoveryReport {
        self.crawler.run_once().await
    }

    /// Bulk-import operator units through the crawler's admission path.
    pub fn import_units(&self, text: &str) -> Result<ImportReport> {
        import_units(&self.registry, text)
    }

    pub fn snapshot(&self) -> Vec<Unit> {
        self.registry.snapshot()
    }

    /// The registry as it would be written to the catalog.
    pub fn catalog(&self) -> Catalog {
        Catalog::from_units(&self.registry.snapshot())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UnitEvent> {
        self.registry.subscribe()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            scheduler: self.scheduler.stats(),
            units: self.registry.status_counts(),
            crawler_paused: self.crawler.is_paused(),
            failed_catalog_writes: self.writer.failed_batches(),
        }
    }

    /// Write the catalog now, with retries.
    pub async fn flush_catalog(&self) -> Result<()> {
        self.writer.flush_with_retry().await
    }

    pub fn catalog_path(&self) -> &std::path::Path {
        self.store.path()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Stop every service, drain in-flight checks and flush the catalog.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down engine");
        self.cancellation_token.cancel();
        self.crawler.shutdown().await;
        self.scheduler.shutdown().await;
        if let Err(e) = self.writer.shutdown().await {
            warn!(error = %e, "Final catalog flush failed");
            return Err(e);
        }
        info!("Engine stopped");
        Ok(())
    }
}
