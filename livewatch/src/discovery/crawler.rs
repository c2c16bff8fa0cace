//! Periodic discovery crawler.
//!
//! Each pass walks the configured search descriptors, queries the search
//! provider through the rate limiter and offers every live hit to the registry
//! as a candidate. New units are picked up by the scheduler from the `Added`
//! event and probed right away.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::candidate::{Admission, Candidate, admit_candidate};
use super::descriptor::{SearchDescriptor, SourceKind, term_key};
use super::hls::HlsPageConfig;
use super::rate_limiter::{RateLimiter, RateLimiterConfig};
use super::search::{SearchHit, SearchProvider};
use crate::error::SearchError;
use crate::registry::UnitRegistry;
use crate::{Error, Result};

/// Discovery crawler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Run the periodic crawler when the engine starts.
    pub enabled: bool,
    /// Pause between passes.
    pub interval_secs: u64,
    /// Results requested per search term.
    pub results_per_term: u32,
    /// Search rate limit.
    pub requests_per_second: f64,
    pub search_timeout_secs: u64,
    pub descriptors: Vec<SearchDescriptor>,
    /// Directory page scraping for `hls_page` descriptors.
    pub hls: HlsPageConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            results_per_term: 3,
            requests_per_second: 0.4,
            search_timeout_secs: 60,
            descriptors: Vec::new(),
            hls: HlsPageConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.results_per_term == 0 {
            return Err(Error::config("discovery.results_per_term must be at least 1"));
        }
        RateLimiterConfig::with_rps(self.requests_per_second)?;
        self.hls.validate()?;
        for descriptor in &self.descriptors {
            descriptor.validate()?;
        }
        Ok(())
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Descriptors searched.
    pub searched: usize,
    /// Live hits returned.
    pub found: usize,
    pub added: usize,
    pub duplicates: usize,
    /// Searches that failed.
    pub failed: usize,
}

impl DiscoveryReport {
    fn merge(&mut self, other: DiscoveryReport) {
        self.searched += other.searched;
        self.found += other.found;
        self.added += other.added;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }
}

pub struct DiscoveryCrawler {
    registry: Arc<UnitRegistry>,
    provider: Arc<dyn SearchProvider>,
    page_source: Arc<dyn SearchProvider>,
    limiter: tokio::sync::Mutex<RateLimiter>,
    descriptors: parking_lot::RwLock<Vec<SearchDescriptor>>,
    paused: AtomicBool,
    resume: Notify,
    /// Passes never overlap.
    run_lock: tokio::sync::Mutex<()>,
    config: DiscoveryConfig,
    cancellation_token: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryCrawler {
    /// `provider` answers search terms, `page_source` answers directory page URLs.
    pub fn new(
        registry: Arc<UnitRegistry>,
        provider: Arc<dyn SearchProvider>,
        page_source: Arc<dyn SearchProvider>,
        config: DiscoveryConfig,
        cancellation_token: CancellationToken,
    ) -> Result<Self> {
        let limiter = RateLimiter::new(RateLimiterConfig::with_rps(config.requests_per_second)?);

        let mut descriptors: Vec<SearchDescriptor> = Vec::new();
        for descriptor in &config.descriptors {
            descriptor.validate()?;
            if descriptors.iter().all(|d| d.key() != descriptor.key()) {
                descriptors.push(descriptor.clone());
            }
        }

        Ok(Self {
            registry,
            provider,
            page_source,
            limiter: tokio::sync::Mutex::new(limiter),
            descriptors: parking_lot::RwLock::new(descriptors),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
            run_lock: tokio::sync::Mutex::new(()),
            config,
            cancellation_token,
            task: parking_lot::Mutex::new(None),
        })
    }

    /// Spawn the periodic crawl loop. The first pass starts immediately.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        info!(
            "Starting discovery crawler with {} descriptors, interval {:?}",
            self.descriptors.read().len(),
            self.config.interval()
        );
        *task = Some(tokio::spawn(self.clone().crawl_loop()));
    }

    async fn crawl_loop(self: Arc<Self>) {
        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            if self.is_paused() {
                debug!("Discovery crawler paused");
                tokio::select! {
                    _ = self.cancellation_token.cancelled() => break,
                    _ = self.resume.notified() => continue,
                }
            }

            let report = self.run_pass(true).await;
            info!(
                searched = report.searched,
                found = report.found,
                added = report.added,
                duplicates = report.duplicates,
                failed = report.failed,
                "Discovery pass finished"
            );

            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }
        debug!("Discovery crawler loop exited");
    }

    /// Run one pass over every descriptor now, even while paused.
    pub async fn run_once(&self) -> DiscoveryReport {
        self.run_pass(false).await
    }

    async fn run_pass(&self, honour_pause: bool) -> DiscoveryReport {
        let _pass = self.run_lock.lock().await;
        let descriptors = self.descriptors();
        let mut report = DiscoveryReport::default();

        for descriptor in &descriptors {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            if honour_pause && self.is_paused() {
                debug!("Discovery pass interrupted by pause");
                break;
            }

            match self.search(descriptor).await {
                Ok(hits) => report.merge(self.admit_hits(descriptor, &hits)),
                Err(SearchError::RateLimited(msg)) => {
                    report.searched += 1;
                    report.failed += 1;
                    warn!(term = %descriptor.term, "Search rate limited, ending pass early: {}", msg);
                    break;
                }
                Err(e) => {
                    report.searched += 1;
                    report.failed += 1;
                    warn!(term = %descriptor.term, error = %e, "Search failed");
                }
            }
        }

        report
    }

    async fn search(&self, descriptor: &SearchDescriptor) -> std::result::Result<Vec<SearchHit>, SearchError> {
        {
            let mut limiter = self.limiter.lock().await;
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    return Err(SearchError::Failed("crawler shutting down".to_string()));
                }
                _ = limiter.acquire() => {}
            }
        }

        let provider = match descriptor.kind {
            SourceKind::Search => &self.provider,
            SourceKind::HlsPage => &self.page_source,
        };
        let timeout = self.config.search_timeout();
        match tokio::time::timeout(timeout, provider.search(&descriptor.term, &descriptor.geo_tag)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Failed(format!("no response within {timeout:?}"))),
        }
    }

    fn admit_hits(&self, descriptor: &SearchDescriptor, hits: &[SearchHit]) -> DiscoveryReport {
        let mut report = DiscoveryReport {
            searched: 1,
            found: hits.len(),
            ..Default::default()
        };

        for hit in hits {
            let candidate = match Candidate::from_hit(hit, descriptor) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!(page_ref = %hit.page_ref, error = %e, "Skipping unusable search hit");
                    continue;
                }
            };
            match admit_candidate(&self.registry, candidate) {
                Ok(Admission::Added(unit)) => {
                    info!(unit_id = %unit.id, name = %unit.display_name, term = %descriptor.term, "Discovered new unit");
                    report.added += 1;
                }
                Ok(Admission::Duplicate { .. }) => report.duplicates += 1,
                Err(e) => error!(page_ref = %hit.page_ref, error = %e, "Failed to admit candidate"),
            }
        }

        report
    }

    /// Add a descriptor; `false` if an equivalent term is already present.
    pub fn add_descriptor(&self, descriptor: SearchDescriptor) -> Result<bool> {
        descriptor.validate()?;
        let mut descriptors = self.descriptors.write();
        if descriptors.iter().any(|d| d.key() == descriptor.key()) {
            return Ok(false);
        }
        info!(term = %descriptor.term, "Search descriptor added");
        descriptors.push(descriptor);
        Ok(true)
    }

    /// Remove the descriptor for `term`; `false` if none matched.
    pub fn remove_descriptor(&self, term: &str) -> bool {
        let key = term_key(term);
        let mut descriptors = self.descriptors.write();
        let before = descriptors.len();
        descriptors.retain(|d| d.key() != key);
        let removed = descriptors.len() != before;
        if removed {
            info!(term = %term, "Search descriptor removed");
        }
        removed
    }

    pub fn descriptors(&self) -> Vec<SearchDescriptor> {
        self.descriptors.read().clone()
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            info!("Discovery crawler paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            info!("Discovery crawler resumed");
            self.resume.notify_one();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Stop the crawl loop. An in-progress search is abandoned.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Discovery crawler task failed: {}", e);
            }
        }
    }
}
