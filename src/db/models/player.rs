//! Player document model.
//!
//! One document per account in the `leaderboard` collection, keyed by the
//! account uid. Field names are the camelCase keys stored in the document.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::auth::Identity;
use crate::store::{Document, Fields};
use crate::utils::round_to;

pub const PLAYERS_COLLECTION: &str = "leaderboard";
pub const MIN_USERNAME_LEN: usize = 5;
pub const ANONYMOUS_NAME: &str = "ANONYMOUS";

/// Stored field names.
pub mod fields {
    pub const USERNAME: &str = "username";
    pub const XP: &str = "xp";
    pub const MINUTES_STUDIED: &str = "minutesStudied";
    pub const REMAINING_MINUTES: &str = "remainingMinutes";
    pub const IS_STUDYING: &str = "isStudying";
    pub const STUDY_SESSIONS: &str = "studySessions";
    pub const STUDY_START_TIME: &str = "studyStartTime";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerRecord {
    #[serde(skip)]
    pub id: String,
    pub username: Option<String>,
    pub xp: f64,
    pub minutes_studied: f64,
    pub remaining_minutes: f64,
    pub is_studying: bool,
    #[serde(deserialize_with = "lenient_sessions")]
    pub study_sessions: Vec<f64>,
    /// Epoch milliseconds of the running session's start, if any.
    pub study_start_time: Option<i64>,
}

impl PlayerRecord {
    /// Fresh record for a first launch: every counter at zero.
    pub fn new_zeroed(identity: &Identity) -> Self {
        Self {
            id: identity.uid.clone(),
            username: identity.display_name.clone(),
            ..Self::default()
        }
    }

    pub fn from_document(doc: Document) -> Result<Self> {
        let Document { id, fields } = doc;
        let mut record: PlayerRecord = serde_json::from_value(Value::Object(fields))
            .with_context(|| format!("player document {id} is malformed"))?;
        record.id = id;
        Ok(record)
    }

    pub fn to_fields(&self) -> Result<Fields> {
        match serde_json::to_value(self).context("failed to encode player record")? {
            Value::Object(fields) => Ok(fields),
            _ => bail!("player record did not encode to an object"),
        }
    }

    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(ANONYMOUS_NAME)
    }

    pub fn session_count(&self) -> usize {
        self.study_sessions.len()
    }

    /// Mean persisted session length, two decimals; zero with no sessions.
    pub fn average_session_minutes(&self) -> f64 {
        if self.study_sessions.is_empty() {
            return 0.0;
        }
        let total: f64 = self.study_sessions.iter().sum();
        round_to(total / self.study_sessions.len() as f64, 2)
    }
}

/// Older documents store session lengths as strings ("0.3") or keep a bare
/// session count instead of a list. A count carries no lengths, so it reads
/// as empty history.
fn lenient_sessions<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let sessions = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Number(number) => number.as_f64(),
                Value::String(text) => text.trim().parse::<f64>().ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(sessions)
}

/// Trim and validate a requested display name.
pub fn validate_username(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("Please enter a username");
    }
    if trimmed.chars().count() < MIN_USERNAME_LEN {
        bail!("Username must be at least {MIN_USERNAME_LEN} characters");
    }
    Ok(trimmed.to_string())
}
