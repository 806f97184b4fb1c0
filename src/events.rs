//! In-process event stream for whatever presents the app state.
//!
//! `Notice` is the user-visible error channel: failed writes end up here
//! instead of propagating to callers.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::rank::RankStanding;

const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppEvent {
    #[serde(rename_all = "camelCase")]
    SessionStarted { started_at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    SessionTick { session_minutes: f64, session_xp: f64 },
    #[serde(rename_all = "camelCase")]
    SessionCompleted { minutes: f64, xp: f64, persisted: bool },
    #[serde(rename_all = "camelCase")]
    SessionDiscarded { minutes: f64 },
    #[serde(rename_all = "camelCase")]
    RankChanged { standing: RankStanding },
    #[serde(rename_all = "camelCase")]
    ChallengeCompleted { challenge_id: u32, xp: f64 },
    Notice { title: String, message: String },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: AppEvent) {
        if self.sender.send(event).is_err() {
            debug!("event dropped: no listeners");
        }
    }

    pub fn notice(&self, title: &str, message: impl Into<String>) {
        self.emit(AppEvent::Notice {
            title: title.to_string(),
            message: message.into(),
        });
    }
}
