use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    auth::AuthState,
    db::models::{fields, PlayerRecord, PLAYERS_COLLECTION},
    events::{AppEvent, EventBus},
    settings::TimerSettings,
    store::{FieldOp, SharedStore},
};

use super::state::{reconcile, Reconciliation, SessionState, SessionStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub minutes: f64,
    pub xp: f64,
    /// False when the write failed or nobody was signed in; the local totals
    /// still include the session.
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StopOutcome {
    NotActive,
    Discarded { minutes: f64 },
    Completed(CompletedSession),
}

/// Exclusive owner of one background task. Dropping the last timer handle
/// aborts it.
#[derive(Default)]
struct TaskSlot {
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    fn replace(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel(&self) {
        if let Some(handle) = self.take() {
            handle.abort();
        }
    }

    fn take(&self) -> Option<JoinHandle<()>> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Study session lifecycle: Idle → Active on `start`, Active → Idle on `stop`.
///
/// Neither call returns an error. Store failures are logged and emitted as
/// `AppEvent::Notice`; local counters are never rolled back.
#[derive(Clone)]
pub struct SessionTimer {
    state: Arc<Mutex<SessionState>>,
    ticker: Arc<TaskSlot>,
    /// In-flight `isStudying = true` write; stop waits for it so its own
    /// write always lands last.
    pending_start: Arc<TaskSlot>,
    store: SharedStore,
    auth: AuthState,
    events: EventBus,
    settings: TimerSettings,
}

impl SessionTimer {
    pub fn new(store: SharedStore, auth: AuthState, events: EventBus, settings: TimerSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            ticker: Arc::new(TaskSlot::default()),
            pending_start: Arc::new(TaskSlot::default()),
            store,
            auth,
            events,
            settings,
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_active()
    }

    pub async fn start(&self) -> SessionState {
        let started_at = Utc::now();
        {
            let mut state = self.state.lock().await;
            if state.is_active() {
                log_debug!("start ignored: session already active");
                return state.clone();
            }
            state.begin(started_at, Instant::now());
        }

        self.spawn_ticker();
        self.events.emit(AppEvent::SessionStarted { started_at });
        log_info!("study session started at {}", started_at.to_rfc3339());

        self.persist_start(started_at);

        self.snapshot().await
    }

    pub async fn stop(&self) -> StopOutcome {
        let elapsed_ms = {
            let mut state = self.state.lock().await;
            if !state.is_active() {
                log_debug!("stop ignored: no active session");
                return StopOutcome::NotActive;
            }
            let elapsed_ms = state.elapsed_ms(Instant::now());
            state.finish();
            elapsed_ms
        };

        self.ticker.cancel();
        self.wait_for_start_write().await;

        match reconcile(elapsed_ms, &self.settings) {
            Reconciliation::Discard { minutes } => {
                log_info!("discarding {elapsed_ms}ms session ({minutes} min): below minimum length");
                self.events.emit(AppEvent::SessionDiscarded { minutes });
                StopOutcome::Discarded { minutes }
            }
            Reconciliation::Credit { minutes, xp } => {
                self.state.lock().await.commit(minutes, xp);
                let persisted = self.persist_session(minutes, xp).await;

                log_info!("study session finished: {minutes} min, {xp} XP (persisted: {persisted})");
                self.events.emit(AppEvent::SessionCompleted {
                    minutes,
                    xp,
                    persisted,
                });

                StopOutcome::Completed(CompletedSession {
                    minutes,
                    xp,
                    persisted,
                })
            }
        }
    }

    /// Reload committed totals from the player's document and resume a
    /// session the document still marks as running.
    pub async fn restore(&self) -> SessionState {
        let Some(identity) = self.auth.current() else {
            log_warn!("restore skipped: nobody is signed in");
            return self.snapshot().await;
        };

        let record = match self.load_record(&identity.uid).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                log_info!("no player document for {} yet; nothing to restore", identity.uid);
                return self.snapshot().await;
            }
            Err(err) => {
                log_error!("failed to restore study session for {}: {err:?}", identity.uid);
                self.events
                    .notice("Error", "Could not load your study progress.");
                return self.snapshot().await;
            }
        };

        let resumed_at = {
            let mut state = self.state.lock().await;
            state.load_totals(&record);

            if record.is_studying && !state.is_active() {
                // Time the app was closed is never credited: the stored start
                // may be left over from a discarded or crashed session.
                let now = Utc::now();
                state.begin(now, Instant::now());
                Some(now)
            } else {
                None
            }
        };

        if let Some(resumed_at) = resumed_at {
            match record.study_start_time.and_then(DateTime::<Utc>::from_timestamp_millis) {
                Some(stored) => log_info!(
                    "resuming study session (stored start {}, counting from {})",
                    stored.to_rfc3339(),
                    resumed_at.to_rfc3339()
                ),
                None => log_info!("resuming study session from {}", resumed_at.to_rfc3339()),
            }
            self.spawn_ticker();
            self.events.emit(AppEvent::SessionStarted { started_at: resumed_at });
            self.persist_start(resumed_at);
        }

        self.snapshot().await
    }

    /// Mirror a challenge spend that was already written to the store.
    pub async fn apply_challenge(&self, xp_gained: f64, minutes_spent: f64) {
        self.state.lock().await.spend(xp_gained, minutes_spent);
    }

    async fn load_record(&self, uid: &str) -> Result<Option<PlayerRecord>> {
        self.store
            .get_document(PLAYERS_COLLECTION, uid)
            .await?
            .map(PlayerRecord::from_document)
            .transpose()
    }

    fn spawn_ticker(&self) {
        let state = self.state.clone();
        let events = self.events.clone();
        let period = self.settings.tick_interval();
        let minutes_per_tick = self.settings.minutes_per_tick;
        let xp_per_tick = self.settings.xp_per_tick;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let (session_minutes, session_xp) = {
                    let mut guard = state.lock().await;
                    if guard.status != SessionStatus::Active {
                        break;
                    }
                    guard.apply_tick(minutes_per_tick, xp_per_tick);
                    (guard.session_minutes, guard.session_xp)
                };

                events.emit(AppEvent::SessionTick {
                    session_minutes,
                    session_xp,
                });
            }
        });

        self.ticker.replace(handle);
    }

    /// Fire-and-forget: the session is running locally whether or not this lands.
    fn persist_start(&self, started_at: DateTime<Utc>) {
        let Some(identity) = self.auth.current() else {
            log_warn!("not persisting session start: nobody is signed in");
            return;
        };

        let store = self.store.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let ops = vec![
                FieldOp::set(fields::IS_STUDYING, true),
                FieldOp::set(fields::STUDY_START_TIME, started_at.timestamp_millis()),
            ];
            if let Err(err) = store
                .update_document(PLAYERS_COLLECTION, &identity.uid, ops)
                .await
            {
                log_error!("failed to mark {} as studying: {err:?}", identity.uid);
                events.notice("Error", "Could not sync your study status.");
            }
        });
        self.pending_start.replace(handle);
    }

    async fn wait_for_start_write(&self) {
        if let Some(handle) = self.pending_start.take() {
            if let Err(err) = handle.await {
                log_warn!("session start write did not finish: {err}");
            }
        }
    }

    async fn persist_session(&self, minutes: f64, xp: f64) -> bool {
        let Some(identity) = self.auth.current() else {
            log_warn!("not persisting finished session: nobody is signed in");
            return false;
        };

        let ops = vec![
            FieldOp::set(fields::IS_STUDYING, false),
            FieldOp::set(fields::STUDY_START_TIME, Value::Null),
            FieldOp::increment(fields::MINUTES_STUDIED, minutes),
            FieldOp::increment(fields::XP, xp),
            FieldOp::increment(fields::REMAINING_MINUTES, minutes),
            FieldOp::append(fields::STUDY_SESSIONS, minutes),
        ];

        match self
            .store
            .update_document(PLAYERS_COLLECTION, &identity.uid, ops)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                log_error!("failed to save study session for {}: {err:?}", identity.uid);
                self.events.notice(
                    "Error",
                    "Your session could not be saved. It will count until you restart the app.",
                );
                false
            }
        }
    }
}
