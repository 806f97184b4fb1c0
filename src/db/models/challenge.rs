use serde::{Deserialize, Serialize};

/// Minutes at which the challenge progress bar is full.
pub const PROGRESS_FULL_MINUTES: f64 = 120.0;

/// Spend banked study minutes for a fixed XP reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: u32,
    pub minutes: f64,
    pub xp: f64,
}

pub const CHALLENGES: [Challenge; 5] = [
    Challenge { id: 1, minutes: 20.0, xp: 10.0 },
    Challenge { id: 2, minutes: 30.0, xp: 40.0 },
    Challenge { id: 3, minutes: 60.0, xp: 100.0 },
    Challenge { id: 4, minutes: 90.0, xp: 120.0 },
    Challenge { id: 5, minutes: 120.0, xp: 150.0 },
];

pub fn find_challenge(id: u32) -> Option<&'static Challenge> {
    CHALLENGES.iter().find(|challenge| challenge.id == id)
}
