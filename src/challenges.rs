//! Challenges spend banked study minutes for a one-off XP reward.
//!
//! Completion is tracked per process, so every launch offers the full
//! catalog again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::{
    auth::AuthState,
    db::models::{
        fields, find_challenge, Challenge, PlayerRecord, CHALLENGES, PLAYERS_COLLECTION,
        PROGRESS_FULL_MINUTES,
    },
    events::{AppEvent, EventBus},
    store::{FieldOp, SharedStore},
    timer::SessionTimer,
    utils::round_tenth,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ChallengeOutcome {
    UnknownChallenge,
    NotSignedIn,
    AlreadyCompleted,
    #[serde(rename_all = "camelCase")]
    InsufficientMinutes { needed: f64, available: f64 },
    #[serde(rename_all = "camelCase")]
    Completed { xp_gained: f64, remaining_minutes: f64 },
    Failed,
}

#[derive(Clone)]
pub struct ChallengeBoard {
    completed: Arc<Mutex<HashSet<u32>>>,
    store: SharedStore,
    auth: AuthState,
    events: EventBus,
    timer: Option<SessionTimer>,
}

impl ChallengeBoard {
    pub fn new(store: SharedStore, auth: AuthState, events: EventBus) -> Self {
        Self {
            completed: Arc::new(Mutex::new(HashSet::new())),
            store,
            auth,
            events,
            timer: None,
        }
    }

    /// Keep `timer`'s local totals in step with completed challenges.
    pub fn with_timer(mut self, timer: SessionTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn catalog(&self) -> &'static [Challenge] {
        &CHALLENGES
    }

    pub fn is_completed(&self, challenge_id: u32) -> bool {
        self.completed().contains(&challenge_id)
    }

    pub fn reset(&self) {
        self.completed().clear();
    }

    pub async fn complete(&self, challenge_id: u32) -> ChallengeOutcome {
        let Some(challenge) = find_challenge(challenge_id) else {
            return ChallengeOutcome::UnknownChallenge;
        };
        let Some(identity) = self.auth.current() else {
            log_warn!("challenge {challenge_id} ignored: nobody is signed in");
            return ChallengeOutcome::NotSignedIn;
        };
        if self.is_completed(challenge_id) {
            return ChallengeOutcome::AlreadyCompleted;
        }

        let available = match self.store.get_document(PLAYERS_COLLECTION, &identity.uid).await {
            Ok(Some(doc)) => match PlayerRecord::from_document(doc) {
                Ok(record) => record.remaining_minutes,
                Err(err) => {
                    log_error!("unreadable player document for {}: {err:?}", identity.uid);
                    self.events
                        .notice("Error", "Failed to Update The Challenge. Please Try Again.");
                    return ChallengeOutcome::Failed;
                }
            },
            Ok(None) => 0.0,
            Err(err) => {
                log_error!("failed to read remaining minutes for {}: {err:?}", identity.uid);
                self.events
                    .notice("Error", "Failed to Update The Challenge. Please Try Again.");
                return ChallengeOutcome::Failed;
            }
        };

        if available < challenge.minutes {
            return ChallengeOutcome::InsufficientMinutes {
                needed: challenge.minutes,
                available,
            };
        }

        let ops = vec![
            FieldOp::increment(fields::XP, challenge.xp),
            FieldOp::increment(fields::REMAINING_MINUTES, -challenge.minutes),
        ];
        if let Err(err) = self
            .store
            .update_document(PLAYERS_COLLECTION, &identity.uid, ops)
            .await
        {
            log_error!("failed to complete challenge {challenge_id}: {err:?}");
            self.events
                .notice("Error", "Failed to Update The Challenge. Please Try Again.");
            return ChallengeOutcome::Failed;
        }

        self.completed().insert(challenge_id);
        if let Some(timer) = &self.timer {
            timer.apply_challenge(challenge.xp, challenge.minutes).await;
        }
        log_info!("{} completed challenge {challenge_id} for {} XP", identity.uid, challenge.xp);
        self.events.emit(AppEvent::ChallengeCompleted {
            challenge_id,
            xp: challenge.xp,
        });

        ChallengeOutcome::Completed {
            xp_gained: challenge.xp,
            remaining_minutes: round_tenth(available - challenge.minutes),
        }
    }

    fn completed(&self) -> MutexGuard<'_, HashSet<u32>> {
        match self.completed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Fill of the challenge progress bar, 0.0 to 1.0.
pub fn progress(remaining_minutes: f64) -> f64 {
    (remaining_minutes / PROGRESS_FULL_MINUTES).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress(-5.0), 0.0);
        assert_eq!(progress(60.0), 0.5);
        assert_eq!(progress(500.0), 1.0);
    }
}
