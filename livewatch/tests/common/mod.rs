//! Scripted capabilities for driving the engine in tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use livewatch::config::EngineConfig;
use livewatch::discovery::{GeoTag, SearchHit, SearchProvider};
use livewatch::domain::{QualityTier, SourceQuery, StreamHandle, Unit, UnitStatus};
use livewatch::error::{ProbeError, ResolutionError, SearchError};
use livewatch::prober::{Frame, FrameSource};
use livewatch::resolver::Resolver;
use livewatch::{Capabilities, Engine};
use parking_lot::Mutex;

/// What the fake frame source returns for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frames {
    Live,
    Black,
    Frozen,
    Unreachable,
}

/// Resolver returning scripted results per source, then a fresh handle.
#[derive(Default)]
pub struct FakeResolver {
    script: Mutex<HashMap<String, VecDeque<Result<(), ResolutionError>>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    active: Mutex<HashMap<String, usize>>,
    max_active_per_source: AtomicUsize,
    max_active_total: AtomicUsize,
    issued: AtomicUsize,
}

impl FakeResolver {
    pub fn push(&self, source: &str, result: Result<(), ResolutionError>) {
        self.script
            .lock()
            .entry(key(source))
            .or_default()
            .push_back(result);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active_per_source(&self) -> usize {
        self.max_active_per_source.load(Ordering::SeqCst)
    }

    pub fn max_active_total(&self) -> usize {
        self.max_active_total.load(Ordering::SeqCst)
    }

    fn enter(&self, source: &str) {
        let mut active = self.active.lock();
        let count = active.entry(source.to_string()).or_default();
        *count += 1;
        self.max_active_per_source.fetch_max(*count, Ordering::SeqCst);
        let total: usize = active.values().sum();
        self.max_active_total.fetch_max(total, Ordering::SeqCst);
    }

    fn leave(&self, source: &str) {
        if let Some(count) = self.active.lock().get_mut(source) {
            *count -= 1;
        }
    }
}

fn key(source: &str) -> String {
    SourceQuery::parse(source)
        .map(|q| q.dedup_key())
        .unwrap_or_else(|_| source.to_string())
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, query: &SourceQuery) -> Result<StreamHandle, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = query.dedup_key();
        self.enter(&source);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.leave(&source);

        let scripted = self
            .script
            .lock()
            .get_mut(&source)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or(Ok(()))?;

        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(StreamHandle::new(
            format!("https://cdn.example/{}/{}.m3u8", source.replace(':', "-"), n),
            QualityTier::FullHd,
        ))
    }
}

/// Frame source answering from a shared script, defaulting to live frames.
#[derive(Default)]
pub struct FakeFrames {
    script: Mutex<VecDeque<Frames>>,
    per_url: Mutex<HashMap<String, Frames>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeFrames {
    /// Queue answers consumed in order by any fetch.
    pub fn push(&self, frames: &[Frames]) {
        self.script.lock().extend(frames.iter().copied());
    }

    /// Fixed answer for playback URLs containing `fragment`.
    pub fn set_for(&self, fragment: &str, frames: Frames) {
        self.per_url.lock().insert(fragment.to_string(), frames);
    }

    /// Make every fetch take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn clear_delay(&self) {
        *self.delay.lock() = None;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches seen running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active fetch count, also when the fetch is dropped mid-sleep.
struct ActiveFetch<'a>(&'a AtomicUsize);

impl Drop for ActiveFetch<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameSource for FakeFrames {
    async fn fetch_frames(
        &self,
        playback_url: &str,
        count: u32,
        _timeout: Duration,
    ) -> Result<Vec<Frame>, ProbeError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _active = ActiveFetch(&self.active);
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fixed = self
            .per_url
            .lock()
            .iter()
            .find(|(fragment, _)| playback_url.contains(fragment.as_str()))
            .map(|(_, frames)| *frames);
        let answer = fixed
            .or_else(|| self.script.lock().pop_front())
            .unwrap_or(Frames::Live);

        let (w, h) = (16, 9);
        match answer {
            Frames::Live => Ok((0..count)
                .map(|i| Frame::filled(w, h, 60 + (i * 40) as u8))
                .collect()),
            Frames::Black => Ok((0..count).map(|_| Frame::filled(w, h, 0)).collect()),
            Frames::Frozen => Ok((0..count).map(|_| Frame::filled(w, h, 120)).collect()),
            Frames::Unreachable => Err(ProbeError::Unreachable("connection refused".to_string())),
        }
    }
}

/// Search provider returning fixed hits per term.
#[derive(Default)]
pub struct FakeSearch {
    hits: Mutex<HashMap<String, Vec<SearchHit>>>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn set(&self, term: &str, hits: Vec<SearchHit>) {
        self.hits.lock().insert(term.to_string(), hits);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, term: &str, _geo_tag: &GeoTag) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.lock().get(term).cloned().unwrap_or_default())
    }
}

pub fn hit(title: &str, page_ref: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        page_ref: page_ref.to_string(),
        geo_hint: None,
    }
}

pub struct Harness {
    pub resolver: Arc<FakeResolver>,
    pub frames: Arc<FakeFrames>,
    pub search: Arc<FakeSearch>,
    pub pages: Arc<FakeSearch>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(FakeResolver::default()),
            frames: Arc::new(FakeFrames::default()),
            search: Arc::new(FakeSearch::default()),
            pages: Arc::new(FakeSearch::default()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            resolver: self.resolver.clone(),
            frame_source: self.frames.clone(),
            search: self.search.clone(),
            page_source: self.pages.clone(),
        }
    }
}

/// Deterministic config with the catalog inside `dir`.
pub fn test_config(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.persistence.catalog_path = dir.join("catalog.json");
    config.persistence.debounce_ms = 100;
    config.scheduler.jitter = false;
    config.scheduler.concurrency = 4;
    config.discovery.enabled = false;
    config.discovery.requests_per_second = 1000.0;
    config.prober.sample_count = 3;
    config
}

pub fn open_engine(harness: &Harness, dir: &Path) -> Engine {
    Engine::open(test_config(dir), harness.capabilities()).expect("engine should open")
}

/// `resolved_handle` is present exactly when the status requires one.
pub fn assert_handle_invariant(unit: &Unit) {
    let needs_handle = matches!(
        unit.status,
        UnitStatus::Healthy | UnitStatus::Degraded | UnitStatus::Recovering
    );
    assert_eq!(
        unit.resolved_handle.is_some(),
        needs_handle,
        "handle invariant broken for {} in {}",
        unit.id,
        unit.status
    );
}
