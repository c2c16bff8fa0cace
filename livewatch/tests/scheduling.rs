//! Scheduler behaviour: per-unit serialisation, parallelism across units,
//! background probing and shutdown.

mod common;

use std::time::Duration;

use common::{Harness, open_engine, test_config};
use livewatch::Engine;
use livewatch::domain::{Location, SourceQuery, UnitStatus};
use livewatch::error::ResolutionError;
use livewatch::registry::{NewUnit, UnitEvent};
use tokio::time::Instant;

fn cam(id: &str) -> NewUnit {
    NewUnit::new(
        format!("Cam {id}"),
        Location::from_hint("Rio de Janeiro, RJ", "BR"),
        SourceQuery::parse(&format!("https://youtu.be/{id}")).unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_checks_on_same_unit_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    harness.resolver.set_delay(Duration::from_secs(5));
    let engine = open_engine(&harness, dir.path());
    let unit = engine.add_unit(cam("slow")).unwrap();

    // Both checks must resolve: the first one fails, leaving no handle.
    harness.resolver.push(
        "https://youtu.be/slow",
        Err(ResolutionError::Transient("socket closed".to_string())),
    );

    let started = Instant::now();
    let (a, b) = tokio::join!(engine.check_now(&unit.id), engine.check_now(&unit.id));
    a.unwrap();
    b.unwrap();

    assert_eq!(harness.resolver.calls(), 2);
    assert_eq!(harness.resolver.max_active_per_source(), 1);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(engine.registry().get(&unit.id).unwrap().status, UnitStatus::Healthy);
}

#[tokio::test(start_paused = true)]
async fn test_checks_on_disjoint_units_run_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    harness.resolver.set_delay(Duration::from_secs(5));
    let engine = open_engine(&harness, dir.path());
    let a = engine.add_unit(cam("a")).unwrap();
    let b = engine.add_unit(cam("b")).unwrap();

    let started = Instant::now();
    let (ra, rb) = tokio::join!(engine.check_now(&a.id), engine.check_now(&b.id));
    ra.unwrap();
    rb.unwrap();

    assert_eq!(harness.resolver.max_active_total(), 2);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_new_unit_is_probed_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let engine = Engine::start(test_config(dir.path()), harness.capabilities()).unwrap();
    let mut events = engine.subscribe();

    let unit = engine.add_unit(cam("fresh")).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(engine.registry().get(&unit.id).unwrap().status, UnitStatus::Healthy);
    let stats = engine.stats();
    assert_eq!(stats.scheduler.probes_completed, 1);
    assert_eq!(stats.units.healthy, 1);

    let mut saw_change = false;
    while let Ok(event) = events.try_recv() {
        if let UnitEvent::StatusChanged { new_status, playback_url, .. } = event {
            assert_eq!(new_status, UnitStatus::Healthy);
            assert!(playback_url.is_some());
            saw_change = true;
        }
    }
    assert!(saw_change);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_healthy_unit_is_rechecked_at_interval() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let engine = Engine::start(test_config(dir.path()), harness.capabilities()).unwrap();
    engine.add_unit(cam("steady")).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.frames.fetches(), 1);

    // Default healthy interval is 60 s.
    tokio::time::sleep(Duration::from_secs(58)).await;
    assert_eq!(harness.frames.fetches(), 1);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(harness.frames.fetches(), 2);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_trigger_probe_makes_unit_due_now() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let engine = Engine::start(test_config(dir.path()), harness.capabilities()).unwrap();
    let unit = engine.add_unit(cam("manual")).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.frames.fetches(), 1);

    engine.trigger_probe(&unit.id).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.frames.fetches(), 2);

    assert!(engine.trigger_probe("missing").is_err());
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_stuck_checks() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    harness.resolver.set_delay(Duration::from_secs(3600));
    let engine = Engine::start(test_config(dir.path()), harness.capabilities()).unwrap();
    let unit = engine.add_unit(cam("stuck")).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.resolver.calls(), 1);

    let started = Instant::now();
    engine.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(engine.registry().get(&unit.id).unwrap().status, UnitStatus::Unknown);
    assert!(engine.is_shutting_down());
}

#[tokio::test(start_paused = true)]
async fn test_overrunning_check_times_out_and_releases_unit() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let mut config = test_config(dir.path());
    config.scheduler.probe_timeout_secs = 5;
    config.prober.fetch_timeout_secs = 120;
    let engine = Engine::start(config, harness.capabilities()).unwrap();
    let unit = engine.add_unit(cam("hang")).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.registry().get(&unit.id).unwrap().status, UnitStatus::Healthy);

    harness.frames.set_delay(Duration::from_secs(30));
    engine.trigger_probe(&unit.id).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;

    let degraded = engine.registry().get(&unit.id).unwrap();
    assert_eq!(degraded.status, UnitStatus::Degraded);
    assert_eq!(degraded.consecutive_failures, 1);
    let stats = engine.stats();
    assert_eq!(stats.scheduler.timeouts, 1);
    assert_eq!(stats.scheduler.in_flight, 0);
    assert_eq!(harness.frames.fetches(), 2);

    // Degraded at level 1 is re-checked 30 s later.
    harness.frames.clear_delay();
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(harness.frames.fetches(), 3);
    assert_eq!(engine.registry().get(&unit.id).unwrap().status, UnitStatus::Healthy);

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_worker_pool_bounds_concurrent_checks() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    harness.frames.set_delay(Duration::from_secs(5));
    let config = test_config(dir.path());
    let pool = config.scheduler.concurrency;
    let engine = Engine::start(config, harness.capabilities()).unwrap();

    let units: Vec<_> = (0..pool * 3)
        .map(|i| engine.add_unit(cam(&format!("crowd{i}"))).unwrap())
        .collect();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.stats().scheduler.in_flight, pool);
    assert_eq!(harness.frames.fetches(), pool);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(harness.frames.fetches(), units.len());
    assert_eq!(harness.frames.max_active(), pool);
    assert_eq!(engine.stats().units.healthy, units.len());

    engine.shutdown().await.unwrap();
}
