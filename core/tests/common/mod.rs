//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use standing_core::{
    access::Actor,
    clock::{Clock, ManualClock},
    config::StandingConfig,
    event::{NotificationSink, StandingEvent},
    service::StandingService,
    store::StandingStore,
    types::{DeputyStatus, Timestamp},
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(t0()))
}

/// A migrated database file under the temp dir, removed on drop. Use when
/// a test needs more than one connection (threads, scheduler jobs).
pub struct TempDb {
    pub path: PathBuf,
}

impl TempDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("standing-{}.db", uuid::Uuid::new_v4()));
        let db = Self { path };
        db.open().migrate().unwrap();
        db
    }

    pub fn path_str(&self) -> &str {
        self.path.to_str().unwrap()
    }

    pub fn open(&self) -> StandingStore {
        StandingStore::open(self.path_str()).unwrap()
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

pub fn memory_store() -> StandingStore {
    let store = StandingStore::in_memory().unwrap();
    store.migrate().unwrap();
    store
}

/// Captures every dispatched event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<StandingEvent>>,
}

impl RecordingSink {
    pub fn taken(&self) -> Vec<StandingEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &StandingEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Always fails; dispatch must swallow it.
pub struct BrokenSink;

impl NotificationSink for BrokenSink {
    fn notify(&self, _event: &StandingEvent) -> anyhow::Result<()> {
        anyhow::bail!("push gateway unreachable")
    }
}

pub struct Fixture {
    pub service: StandingService,
    pub clock:   Arc<ManualClock>,
    pub sink:    Arc<RecordingSink>,
    pub admin:   Actor,
}

impl Fixture {
    pub fn in_memory() -> Self {
        Self::with_store(memory_store(), StandingConfig::default())
    }

    pub fn on_file(db: &TempDb) -> Self {
        Self::with_store(db.open(), StandingConfig::default())
    }

    pub fn with_store(store: StandingStore, config: StandingConfig) -> Self {
        init_logging();
        let clock = manual_clock();
        let sink = Arc::new(RecordingSink::default());
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let sink_dyn: Arc<dyn NotificationSink> = sink.clone();
        let service = StandingService::new(store, config, clock_dyn, sink_dyn);
        let admin = service.register_account("Admin").unwrap();
        service.bootstrap_admin(&admin.account_id).unwrap();
        Self { service, clock, sink, admin: Actor::new(admin.account_id) }
    }

    pub fn citizen(&self, name: &str) -> Actor {
        Actor::new(self.service.register_account(name).unwrap().account_id)
    }

    /// A citizen promoted to current deputy. Returns (actor, deputy_id).
    pub fn deputy(&self, name: &str) -> (Actor, String) {
        let actor = self.citizen(name);
        let profile = self
            .service
            .promote_to_deputy(&self.admin, &actor.account_id, DeputyStatus::Current)
            .unwrap();
        (actor, profile.deputy_id)
    }
}
