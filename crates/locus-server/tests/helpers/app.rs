//! Application under test.

use std::sync::Arc;

use locus_server::{AppState, create_router};
use locus_source::{Fixture, FixtureFormat, StaticSource};
use locus_sync::{EventBus, LocationManager, SyncConfig};
use metrics_exporter_prometheus::PrometheusBuilder;

use super::client::TestClient;

pub const FIXTURE: &str = include_str!("../../../../fixtures/locations.yml");

/// A router wired to a manager over a static source.
pub struct TestApp {
    pub client: TestClient,
    pub source: Arc<StaticSource>,
    pub state: AppState,
}

impl TestApp {
    pub fn manager(&self) -> &LocationManager {
        self.state.manager()
    }
}

pub fn test_app() -> TestApp {
    test_app_with(SyncConfig::default())
}

pub fn test_app_with(config: SyncConfig) -> TestApp {
    let fixture = Fixture::parse(FIXTURE, FixtureFormat::Yaml).expect("valid test fixture");
    let source = Arc::new(StaticSource::new(fixture));
    let manager = LocationManager::new(source.clone(), config, EventBus::default())
        .expect("valid test config");
    let state = AppState::new(manager);

    // A handle over a recorder that is never installed globally
    let prometheus = PrometheusBuilder::new().build_recorder().handle();

    TestApp {
        client: TestClient::new(create_router(state.clone(), prometheus)),
        source,
        state,
    }
}
