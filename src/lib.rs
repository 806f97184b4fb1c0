pub mod auth;
pub mod challenges;
pub mod db;
pub mod events;
pub mod players;
pub mod rank;
pub mod settings;
pub mod store;
pub mod timer;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use log::{info, warn};

use auth::AuthState;
use challenges::ChallengeBoard;
use db::Database;
use events::{AppEvent, EventBus};
use rank::RankTracker;
use settings::{SettingsStore, StorageBackend};
use store::{MemoryStore, SharedStore};
use timer::{SessionTimer, StopOutcome};

/// Everything a front end needs, wired to one store and one signed-in account.
pub struct AppState {
    pub store: SharedStore,
    pub auth: AuthState,
    pub events: EventBus,
    pub settings: SettingsStore,
    pub timer: SessionTimer,
    pub challenges: ChallengeBoard,
}

impl AppState {
    pub fn new(store: SharedStore, settings: SettingsStore) -> Self {
        let auth = AuthState::new();
        let events = EventBus::new();
        let timer = SessionTimer::new(store.clone(), auth.clone(), events.clone(), settings.timer());
        let challenges = ChallengeBoard::new(store.clone(), auth.clone(), events.clone())
            .with_timer(timer.clone());

        Self {
            store,
            auth,
            events,
            settings,
            timer,
            challenges,
        }
    }

    pub fn start_rank_tracker(&self) -> RankTracker {
        RankTracker::start(
            self.store.clone(),
            self.auth.clone(),
            self.events.clone(),
            self.settings.timer().xp_per_minute,
        )
    }
}

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("STUDYXP_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("", "", "studyxp")
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .ok_or_else(|| anyhow!("could not determine a data directory; set STUDYXP_DATA_DIR"))
}

pub fn open_store(settings: &SettingsStore, data_dir: &std::path::Path) -> Result<SharedStore> {
    let storage = settings.storage();
    let store: SharedStore = match storage.backend {
        StorageBackend::Sqlite => Arc::new(Database::new(data_dir.join(&storage.database_file))?),
        StorageBackend::Memory => {
            warn!("using in-memory storage; progress will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("studyxp starting up...");

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")
        .and_then(|runtime| runtime.block_on(run_session()));

    if let Err(err) = result {
        log::error!("studyxp failed: {err:?}");
        std::process::exit(1);
    }
}

async fn run_session() -> Result<()> {
    let data_dir = data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let identity = settings.local_identity()?;
    let store = open_store(&settings, &data_dir)?;
    let app = AppState::new(store, settings);

    app.auth.sign_in(identity.clone());
    players::ensure_player(app.store.as_ref(), &identity).await?;

    let tracker = app.start_rank_tracker();
    let mut events = app.events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AppEvent::Notice { title, message } => warn!("{title}: {message}"),
                AppEvent::RankChanged { standing } => info!("standing: {standing:?}"),
                _ => {}
            }
        }
    });

    let restored = app.timer.restore().await;
    if !restored.is_active() {
        app.timer.start().await;
    }
    info!("studying; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    match app.timer.stop().await {
        StopOutcome::Completed(session) => info!(
            "session saved: {} min, {} XP (persisted: {})",
            session.minutes, session.xp, session.persisted
        ),
        StopOutcome::Discarded { minutes } => info!("session too short ({minutes} min); discarded"),
        StopOutcome::NotActive => {}
    }

    let standing =
        rank::fetch_standing(app.store.as_ref(), &identity.uid, app.settings.timer().xp_per_minute)
            .await?;
    info!("final standing: {standing:?}");

    tracker.shutdown().await;
    Ok(())
}
