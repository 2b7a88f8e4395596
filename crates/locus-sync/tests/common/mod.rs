#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use locus_core::{
    LocationDetail, LocationError, LocationId, LocationPage, LocationRecord, LocationStatus,
    Result, SearchParams, StatusSnapshot, UpdateAck, UpdateRequest,
};
use locus_source::{LocationSource, async_trait};
use locus_sync::{EventBus, LocationManager, SyncConfig, TtlConfig, TtlPair};
use parking_lot::Mutex;

/// Parses a record from YAML with the given id.
/// Panics if the YAML is invalid (intended for tests).
pub fn record(id: &str) -> LocationRecord {
    let yaml = format!(
        r#"
id: {id}
nome_local: Clinica {id}
endereco_completo: Av. Paulista, 1000 - Bela Vista, Sao Paulo - SP
bairro: Bela Vista
cidade: Sao Paulo
estado: SP
cep: 01310-100
telefone: (11) 3333-4444
horario_funcionamento:
  segunda: {{ abertura: "08:00", fechamento: "18:00" }}
  terca: {{ abertura: "08:00", fechamento: "18:00" }}
  quarta: {{ abertura: "08:00", fechamento: "18:00" }}
  quinta: {{ abertura: "08:00", fechamento: "18:00" }}
  sexta: {{ abertura: "08:00", fechamento: "18:00" }}
  sabado: {{ abertura: "00:00", fechamento: "00:00", fechado: true }}
  domingo: {{ abertura: "00:00", fechamento: "00:00", fechado: true }}
status: ativo
ultima_atualizacao: 2026-01-10T09:00:00Z
"#
    );
    serde_yaml::from_str(&yaml).expect("Failed to parse test record from YAML")
}

/// A data source whose latency, failures and data are driven by the test.
///
/// Values are captured when a call starts, then the next queued delay is
/// applied, then the configured failure (if any) is returned.
#[derive(Default)]
pub struct MockSource {
    records: Mutex<HashMap<LocationId, LocationRecord>>,
    calls: Mutex<HashMap<String, usize>>,
    persists: AtomicUsize,
    failure: Mutex<Option<LocationError>>,
    failures_left: Mutex<Option<usize>>,
    delays: Mutex<VecDeque<Duration>>,
}

impl MockSource {
    pub fn with_locations(ids: &[&str]) -> Arc<Self> {
        let source = Self::default();
        for id in ids {
            source.upsert(record(id));
        }
        Arc::new(source)
    }

    pub fn upsert(&self, record: LocationRecord) {
        self.records.lock().insert(record.id.clone(), record);
    }

    pub fn set_status(&self, id: &str, status: LocationStatus) {
        if let Some(record) = self.records.lock().get_mut(&LocationId::new(id)) {
            record.status = status;
        }
    }

    /// Every call fails with `error` until [`recover`](Self::recover).
    pub fn fail_with(&self, error: LocationError) {
        *self.failure.lock() = Some(error);
        *self.failures_left.lock() = None;
    }

    /// The next `times` calls fail with `error`.
    pub fn fail_times(&self, error: LocationError, times: usize) {
        *self.failure.lock() = Some(error);
        *self.failures_left.lock() = Some(times);
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Queues a delay for the next call.
    pub fn delay_next(&self, delay: Duration) {
        self.delays.lock().push_back(delay);
    }

    /// Calls made for an operation and location, e.g. `("status", "loc-1")`.
    pub fn calls(&self, operation: &str, id: &str) -> usize {
        self.calls
            .lock()
            .get(&format!("{operation}:{id}"))
            .copied()
            .unwrap_or(0)
    }

    pub fn persist_calls(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: String) -> Result<()> {
        *self.calls.lock().entry(call).or_insert(0) += 1;

        let delay = self.delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut left = self.failures_left.lock();
        let mut failure = self.failure.lock();
        let error = failure.clone();
        if let Some(n) = left.as_mut() {
            *n = n.saturating_sub(1);
            if *n == 0 {
                *failure = None;
                *left = None;
            }
        }
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn find(&self, id: &LocationId) -> Result<LocationRecord> {
        self.records
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| LocationError::not_found(format!("location {id}")))
    }
}

#[async_trait]
impl LocationSource for MockSource {
    async fn fetch_location_list(&self, params: &SearchParams) -> Result<LocationPage> {
        let mut items: Vec<LocationRecord> = self.records.lock().values().cloned().collect();
        items.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let total_count = items.len() as u64;
        if let Some(limit) = params.limit {
            items.truncate(limit as usize);
        }

        self.enter("list:all".to_string()).await?;
        Ok(LocationPage {
            has_more: (items.len() as u64) < total_count,
            items,
            total_count,
        })
    }

    async fn fetch_location_detail(
        &self,
        id: &LocationId,
        date: NaiveDate,
    ) -> Result<LocationDetail> {
        let record = self.find(id);
        self.enter(format!("detail:{id}")).await?;
        Ok(LocationDetail {
            record: record?,
            date,
            slots: Vec::new(),
            is_open_now: true,
        })
    }

    async fn fetch_location_status(&self, id: &LocationId) -> Result<StatusSnapshot> {
        let record = self.find(id);
        self.enter(format!("status:{id}")).await?;
        let record = record?;
        Ok(StatusSnapshot {
            location_id: record.id,
            status: record.status,
            is_open_now: true,
            last_updated: Utc::now(),
        })
    }

    async fn persist_location_update(&self, request: &UpdateRequest) -> Result<UpdateAck> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        self.enter(format!("persist:{}", request.location_id)).await?;

        let mut records = self.records.lock();
        let record = records
            .get_mut(&request.location_id)
            .ok_or_else(|| LocationError::not_found(format!("location {}", request.location_id)))?;
        record.apply(&request.updates);
        record.updated_at = Utc::now();
        Ok(UpdateAck {
            location_id: record.id.clone(),
            updated_at: record.updated_at,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Configuration with a 60s stale and 900s hard TTL for every class.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        ttl: TtlConfig::uniform(TtlPair::new(
            Duration::from_secs(60),
            Duration::from_millis(900_000),
        )),
        ..SyncConfig::default()
    }
}

pub fn manager(source: &Arc<MockSource>) -> LocationManager {
    manager_with(source, test_config())
}

pub fn manager_with(source: &Arc<MockSource>, config: SyncConfig) -> LocationManager {
    let source: Arc<dyn LocationSource> = source.clone();
    LocationManager::new(source, config, EventBus::default()).expect("valid test config")
}

pub fn id(value: &str) -> LocationId {
    LocationId::new(value)
}
