use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::db::models::PlayerRecord;
use crate::settings::TimerSettings;
use crate::utils::round_tenth;

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Active,
}

/// Local view of the player's study totals plus the running session.
///
/// `minutes_studied`/`xp` are committed totals. While a session runs, ticks
/// accrue into `session_minutes`/`session_xp` for display only; stopping
/// throws those away and commits the wall-clock reconciled amounts instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub minutes_studied: f64,
    pub xp: f64,
    pub remaining_minutes: f64,
    pub session_minutes: f64,
    pub session_xp: f64,
    #[serde(skip)]
    pub anchor: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn total_minutes(&self) -> f64 {
        round_tenth(self.minutes_studied + self.session_minutes)
    }

    pub fn total_xp(&self) -> f64 {
        round_tenth(self.xp + self.session_xp)
    }

    pub fn begin(&mut self, started_at: DateTime<Utc>, anchor: Instant) {
        self.status = SessionStatus::Active;
        self.started_at = Some(started_at);
        self.anchor = Some(anchor);
        self.session_minutes = 0.0;
        self.session_xp = 0.0;
    }

    pub fn apply_tick(&mut self, minutes: f64, xp: f64) {
        self.session_minutes = round_tenth(self.session_minutes + minutes);
        self.session_xp = round_tenth(self.session_xp + xp);
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        self.anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Back to idle, dropping the tick-accrued display counters.
    pub fn finish(&mut self) {
        self.status = SessionStatus::Idle;
        self.started_at = None;
        self.anchor = None;
        self.session_minutes = 0.0;
        self.session_xp = 0.0;
    }

    pub fn commit(&mut self, minutes: f64, xp: f64) {
        self.minutes_studied = round_tenth(self.minutes_studied + minutes);
        self.xp = round_tenth(self.xp + xp);
        self.remaining_minutes = round_tenth(self.remaining_minutes + minutes);
    }

    /// Challenge reward: XP in, banked minutes out.
    pub fn spend(&mut self, xp_gained: f64, minutes_spent: f64) {
        self.xp = round_tenth(self.xp + xp_gained);
        self.remaining_minutes = round_tenth(self.remaining_minutes - minutes_spent);
    }

    pub fn load_totals(&mut self, record: &PlayerRecord) {
        self.minutes_studied = round_tenth(record.minutes_studied);
        self.xp = round_tenth(record.xp);
        self.remaining_minutes = round_tenth(record.remaining_minutes);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    Discard { minutes: f64 },
    Credit { minutes: f64, xp: f64 },
}

/// Turn a finished session's wall-clock length into persisted minutes and XP.
pub fn reconcile(elapsed_ms: u64, settings: &TimerSettings) -> Reconciliation {
    let raw_minutes = elapsed_ms as f64 / MS_PER_MINUTE;
    let minutes = round_tenth(raw_minutes);

    if raw_minutes < settings.min_session_minutes || minutes < settings.min_session_minutes {
        return Reconciliation::Discard { minutes };
    }

    Reconciliation::Credit {
        minutes,
        xp: round_tenth(minutes * settings.xp_per_minute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_seconds_is_the_shortest_credited_session() {
        let settings = TimerSettings::default();
        assert_eq!(
            reconcile(6_000, &settings),
            Reconciliation::Credit { minutes: 0.1, xp: 1.0 }
        );
        assert!(matches!(
            reconcile(5_999, &settings),
            Reconciliation::Discard { .. }
        ));
        assert!(matches!(reconcile(0, &settings), Reconciliation::Discard { .. }));
    }

    #[test]
    fn credit_rounds_minutes_before_xp() {
        let settings = TimerSettings::default();
        // 0.2583 min rounds to 0.3 min, then 3.0 XP.
        assert_eq!(
            reconcile(15_500, &settings),
            Reconciliation::Credit { minutes: 0.3, xp: 3.0 }
        );
        assert_eq!(
            reconcile(90 * 60_000, &settings),
            Reconciliation::Credit { minutes: 90.0, xp: 900.0 }
        );
    }

    #[test]
    fn ticks_only_touch_session_counters() {
        let mut state = SessionState::new();
        state.xp = 5.0;
        state.begin(Utc::now(), Instant::now());
        for _ in 0..3 {
            state.apply_tick(0.1, 1.0);
        }
        assert_eq!(state.session_minutes, 0.3);
        assert_eq!(state.total_xp(), 8.0);

        state.finish();
        state.commit(0.3, 3.0);
        assert_eq!(state.xp, 8.0);
        assert_eq!(state.remaining_minutes, 0.3);
        assert_eq!(state.session_xp, 0.0);
        assert!(!state.is_active());
    }

    #[test]
    fn challenge_spend_moves_xp_and_banked_minutes() {
        let mut state = SessionState::new();
        state.xp = 12.0;
        state.remaining_minutes = 45.0;
        state.spend(40.0, 30.0);
        assert_eq!(state.xp, 52.0);
        assert_eq!(state.remaining_minutes, 15.0);
    }
}
