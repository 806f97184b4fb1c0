use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::{AuthState, Identity},
    db::models::LeaderboardSnapshot,
    events::{AppEvent, EventBus},
    store::{Document, SharedStore, Subscription},
};

use super::standing::{compute_standing, leaderboard_query, RankStanding};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

struct Outputs {
    standing: watch::Sender<RankStanding>,
    leaderboard: watch::Sender<LeaderboardSnapshot>,
    events: EventBus,
}

impl Outputs {
    fn publish(&self, snapshot: LeaderboardSnapshot, standing: RankStanding) {
        self.leaderboard.send_replace(snapshot);

        let changed = self.standing.send_if_modified(|current| {
            if *current == standing {
                false
            } else {
                *current = standing.clone();
                true
            }
        });
        if changed {
            self.events.emit(AppEvent::RankChanged { standing });
        }
    }

    fn clear(&self) {
        self.publish(LeaderboardSnapshot::default(), RankStanding::Unranked);
    }
}

/// Keeps the signed-in player's standing current.
///
/// Holds at most one leaderboard subscription, opened on sign-in and dropped
/// on sign-out, so re-renders or repeated sign-ins never stack feeds.
pub struct RankTracker {
    standing: watch::Receiver<RankStanding>,
    leaderboard: watch::Receiver<LeaderboardSnapshot>,
    cancel_token: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl RankTracker {
    pub fn start(store: SharedStore, auth: AuthState, events: EventBus, xp_per_minute: f64) -> Self {
        let (standing_tx, standing_rx) = watch::channel(RankStanding::Unranked);
        let (leaderboard_tx, leaderboard_rx) = watch::channel(LeaderboardSnapshot::default());
        let outputs = Arc::new(Outputs {
            standing: standing_tx,
            leaderboard: leaderboard_tx,
            events,
        });

        let cancel_token = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(
            store,
            auth,
            outputs,
            xp_per_minute,
            cancel_token.clone(),
        ));

        Self {
            standing: standing_rx,
            leaderboard: leaderboard_rx,
            cancel_token,
            supervisor: Some(supervisor),
        }
    }

    pub fn standing(&self) -> RankStanding {
        self.standing.borrow().clone()
    }

    pub fn leaderboard(&self) -> LeaderboardSnapshot {
        self.leaderboard.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RankStanding> {
        self.standing.clone()
    }

    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RankTracker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn supervise(
    store: SharedStore,
    auth: AuthState,
    outputs: Arc<Outputs>,
    xp_per_minute: f64,
    cancel_token: CancellationToken,
) {
    let mut auth_rx = auth.subscribe();
    let mut active: Option<(String, Subscription)> = None;

    loop {
        let identity = auth_rx.borrow_and_update().clone();
        match identity {
            Some(Identity { uid, .. }) => {
                let already_watching = active.as_ref().map_or(false, |(current, _)| *current == uid);
                if !already_watching {
                    if let Some((previous, subscription)) = active.take() {
                        log_info!("dropping leaderboard feed for {previous}");
                        subscription.unsubscribe();
                        outputs.clear();
                    }
                    log_info!("opening leaderboard feed for {uid}");
                    let subscription = open_feed(&store, &auth, &outputs, uid.clone(), xp_per_minute);
                    active = Some((uid, subscription));
                }
            }
            None => {
                if let Some((previous, subscription)) = active.take() {
                    log_info!("signed out; dropping leaderboard feed for {previous}");
                    subscription.unsubscribe();
                }
                outputs.clear();
            }
        }

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = auth_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log_debug!("rank tracker stopped");
}

fn open_feed(
    store: &SharedStore,
    auth: &AuthState,
    outputs: &Arc<Outputs>,
    uid: String,
    xp_per_minute: f64,
) -> Subscription {
    let auth = auth.clone();
    let outputs = outputs.clone();

    store.subscribe_ordered(
        leaderboard_query(),
        Arc::new(move |documents: Vec<Document>| {
            // A delivery racing a sign-out or account switch must not
            // overwrite the newer state.
            if auth.current().map(|identity| identity.uid).as_deref() != Some(uid.as_str()) {
                return;
            }
            let snapshot = LeaderboardSnapshot::from_documents(&documents);
            let standing = compute_standing(&snapshot, &uid, xp_per_minute);
            outputs.publish(snapshot, standing);
        }),
    )
}
