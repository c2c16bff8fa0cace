//! Catalog persistence through the engine lifecycle.

mod common;

use std::time::Duration;

use common::{Harness, open_engine, test_config};
use livewatch::catalog::{Catalog, JsonCatalogStore};
use livewatch::domain::{Location, SourceQuery, UnitStatus};
use livewatch::registry::NewUnit;
use livewatch::{Engine, Error};

fn cam(name: &str, id: &str, hint: &str, sector: &str) -> NewUnit {
    NewUnit::new(
        name,
        Location::from_hint(hint, sector),
        SourceQuery::parse(&format!("https://youtu.be/{id}")).unwrap(),
    )
}

fn read_catalog(path: &std::path::Path) -> Catalog {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_corrupt_catalog_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(&config.persistence.catalog_path, b"{ not json").unwrap();

    let harness = Harness::new();
    match Engine::start(config, harness.capabilities()) {
        Err(Error::CatalogCorrupt { path, .. }) => assert!(path.ends_with("catalog.json")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("engine started on a corrupt catalog"),
    }
}

#[tokio::test]
async fn test_catalog_with_broken_invariant_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(
        &config.persistence.catalog_path,
        br#"{
            "version": 1,
            "countries": { "BR": { "states": { "SC": { "cities": { "Florianopolis": [
                {
                    "id": "u1",
                    "name": "Koxixos",
                    "source_query": { "kind": "url", "value": "https://youtu.be/kox" },
                    "status": "HEALTHY",
                    "created_at": "2024-01-01T00:00:00Z"
                }
            ] } } } } }
        }"#,
    )
    .unwrap();

    let harness = Harness::new();
    assert!(matches!(
        Engine::open(config, harness.capabilities()),
        Err(Error::CatalogCorrupt { .. })
    ));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();

    let (healthy_id, unknown_id) = {
        let engine = open_engine(&harness, dir.path());
        let healthy = engine
            .add_unit(cam("Koxixos", "kox", "Florianópolis, SC", "BR"))
            .unwrap();
        let unknown = engine.add_unit(cam("Shibuya", "shib", "Tokyo", "JP")).unwrap();
        engine.check_now(&healthy.id).await.unwrap();
        engine.shutdown().await.unwrap();
        (healthy.id, unknown.id)
    };

    let catalog = read_catalog(&dir.path().join("catalog.json"));
    assert_eq!(catalog.len(), 2);
    let sc = &catalog.countries["BR"].states["SC"].cities["Florianópolis"];
    assert_eq!(sc[0].status, UnitStatus::Healthy);
    assert!(sc[0].handle.is_some());

    let engine = open_engine(&harness, dir.path());
    let healthy = engine.registry().get(&healthy_id).unwrap();
    assert_eq!(healthy.status, UnitStatus::Healthy);
    assert!(healthy.resolved_handle.is_some());
    assert_eq!(healthy.location.state.as_deref(), Some("SC"));
    let unknown = engine.registry().get(&unknown_id).unwrap();
    assert_eq!(unknown.status, UnitStatus::Unknown);
    assert_eq!(unknown.location.city.as_deref(), Some("Tokyo"));
}

#[tokio::test(start_paused = true)]
async fn test_removal_cascades_to_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let config = test_config(dir.path());
    let catalog_path = config.persistence.catalog_path.clone();
    let engine = Engine::start(config, harness.capabilities()).unwrap();

    let a = engine.add_unit(cam("A", "aaa", "Rio de Janeiro, RJ", "BR")).unwrap();
    engine.add_unit(cam("B", "bbb", "Rio de Janeiro, RJ", "BR")).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(read_catalog(&catalog_path).len(), 2);

    engine.remove_unit(&a.id).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let catalog = read_catalog(&catalog_path);
    assert_eq!(catalog.len(), 1);
    assert!(catalog.iter_summaries().all(|(.., unit)| unit.id != a.id));

    engine.shutdown().await.unwrap();
    assert!(engine.remove_unit(&a.id).is_err());
}

#[tokio::test]
async fn test_writes_leave_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let engine = open_engine(&harness, dir.path());
    for i in 0..5 {
        engine
            .add_unit(cam(&format!("Cam {i}"), &format!("c{i}"), "Lima", "PE"))
            .unwrap();
        engine.flush_catalog().await.unwrap();
    }
    engine.shutdown().await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["catalog.json".to_string()]);

    let units = JsonCatalogStore::new(dir.path().join("catalog.json"))
        .load_units()
        .unwrap();
    assert_eq!(units.len(), 5);
}
