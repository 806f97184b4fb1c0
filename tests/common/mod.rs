// Shared fixtures for integration tests. Each test binary uses a different
// subset, hence the allow.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use studyxp_lib::{
    auth::{AuthState, Identity},
    db::models::{fields, PLAYERS_COLLECTION},
    events::EventBus,
    settings::TimerSettings,
    store::{
        Document, DocumentStore, FieldOp, Fields, MemoryStore, OrderedQuery, SharedStore,
        SnapshotCallback, Subscription,
    },
    timer::SessionTimer,
};

/// MemoryStore wrapper that counts writes and can be told to fail them.
#[derive(Clone, Default)]
pub struct ProbeStore {
    inner: MemoryStore,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
    studying_flag_delay_ms: Arc<AtomicU64>,
}

impl ProbeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    /// Hold back writes that set `isStudying = true` by `ms`.
    pub fn delay_studying_flag(&self, ms: u64) {
        self.studying_flag_delay_ms.store(ms, Ordering::SeqCst);
    }

    fn record_write(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("network unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for ProbeStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.inner.get_document(collection, id).await
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.record_write()?;
        self.inner.set_document(collection, id, fields).await
    }

    async fn update_document(&self, collection: &str, id: &str, ops: Vec<FieldOp>) -> Result<()> {
        let delay_ms = self.studying_flag_delay_ms.load(Ordering::SeqCst);
        let marks_studying = ops
            .iter()
            .any(|op| *op == FieldOp::Set(fields::IS_STUDYING.to_string(), Value::Bool(true)));
        if delay_ms > 0 && marks_studying {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        self.record_write()?;
        self.inner.update_document(collection, id, ops).await
    }

    async fn query_ordered(&self, query: &OrderedQuery) -> Result<Vec<Document>> {
        self.inner.query_ordered(query).await
    }

    fn subscribe_ordered(&self, query: OrderedQuery, callback: SnapshotCallback) -> Subscription {
        self.inner.subscribe_ordered(query, callback)
    }
}

pub fn player_fields(username: &str, xp: f64) -> Fields {
    json!({
        "username": username,
        "xp": xp,
        "minutesStudied": 0.0,
        "remainingMinutes": 0.0,
        "isStudying": false,
        "studySessions": [],
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

pub async fn seed_player(store: &dyn DocumentStore, uid: &str, username: &str, xp: f64) {
    store
        .set_document(PLAYERS_COLLECTION, uid, player_fields(username, xp))
        .await
        .expect("seed player");
}

pub struct TimerHarness {
    pub store: ProbeStore,
    pub auth: AuthState,
    pub events: EventBus,
    pub timer: SessionTimer,
}

/// Timer wired to a probe store with `uid` signed in and already seeded.
pub async fn signed_in_timer(uid: &str) -> TimerHarness {
    let store = ProbeStore::new();
    seed_player(&store, uid, "tester", 0.0).await;
    let auth = AuthState::new();
    auth.sign_in(Identity::new(uid, Some("tester".into())));
    let events = EventBus::new();
    let shared: SharedStore = Arc::new(store.clone());
    let timer = SessionTimer::new(shared, auth.clone(), events.clone(), TimerSettings::default());

    TimerHarness {
        store,
        auth,
        events,
        timer,
    }
}

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Advance paused time one tick period at a time so each tick is observed.
pub async fn advance_ticks(count: u32) {
    let period = TimerSettings::default().tick_interval();
    for _ in 0..count {
        tokio::time::advance(period).await;
        settle().await;
    }
}

pub async fn advance_ms(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}
