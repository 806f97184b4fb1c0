use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::player::{fields, ANONYMOUS_NAME};
use crate::store::Document;
use crate::utils::round_tenth;

/// The slice of a player document the leaderboard needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub username: String,
    pub xp: f64,
    pub is_studying: bool,
}

impl LeaderboardEntry {
    pub fn new(id: &str, username: &str, xp: f64) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            xp,
            is_studying: false,
        }
    }

    pub fn from_document(doc: &Document) -> Self {
        let username = doc
            .fields
            .get(fields::USERNAME)
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(ANONYMOUS_NAME);

        Self {
            id: doc.id.clone(),
            username: username.to_string(),
            xp: doc.number(fields::XP).unwrap_or(0.0),
            is_studying: doc
                .fields
                .get(fields::IS_STUDYING)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Every player, highest XP first, exactly as delivered by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub entries: Vec<LeaderboardEntry>,
}

impl LeaderboardSnapshot {
    pub fn new(entries: Vec<LeaderboardEntry>) -> Self {
        Self { entries }
    }

    pub fn from_documents(documents: &[Document]) -> Self {
        Self {
            entries: documents.iter().map(LeaderboardEntry::from_document).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position_of(&self, player_id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == player_id)
    }

    pub fn studying_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_studying).count()
    }
}

/// How far another player's XP sits from ours, as shown beside each row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "xp", rename_all = "camelCase")]
pub enum XpDifference {
    Ahead(f64),
    Behind(f64),
    Tied,
}

pub fn xp_difference(player_xp: f64, self_xp: f64) -> XpDifference {
    let difference = round_tenth(player_xp - self_xp);
    if difference > 0.0 {
        XpDifference::Ahead(difference)
    } else if difference < 0.0 {
        XpDifference::Behind(-difference)
    } else {
        XpDifference::Tied
    }
}
