use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::db::models::{fields, LeaderboardSnapshot, PLAYERS_COLLECTION};
use crate::store::{DocumentStore, OrderedQuery, SortDirection};
use crate::utils::round_tenth;

/// The player directly below us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub id: String,
    pub username: String,
    pub xp: f64,
}

/// Study time separating us from the competitor below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "minutes", rename_all = "camelCase")]
pub enum Lead {
    Minutes(f64),
    /// Nobody is below us.
    Unbounded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankInfo {
    /// 1-based.
    pub rank: usize,
    pub total_players: usize,
    pub xp: f64,
    /// XP needed to draw level with the player above; `None` at rank 1.
    pub xp_gap_to_next: Option<f64>,
    pub competitor: Option<Competitor>,
    pub lead: Lead,
    pub players_beaten: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RankStanding {
    Unranked,
    Ranked(RankInfo),
}

impl RankStanding {
    pub fn rank(&self) -> Option<usize> {
        match self {
            RankStanding::Ranked(info) => Some(info.rank),
            RankStanding::Unranked => None,
        }
    }
}

pub fn leaderboard_query() -> OrderedQuery {
    OrderedQuery::new(PLAYERS_COLLECTION, fields::XP, SortDirection::Descending)
}

/// Derive where `self_id` stands in an XP-descending snapshot. Always a full
/// pass: any write can reorder the whole board between deliveries.
pub fn compute_standing(
    snapshot: &LeaderboardSnapshot,
    self_id: &str,
    xp_per_minute: f64,
) -> RankStanding {
    let Some(index) = snapshot.position_of(self_id) else {
        return RankStanding::Unranked;
    };

    let entries = &snapshot.entries;
    let me = &entries[index];
    let rank = index + 1;

    let xp_gap_to_next = index
        .checked_sub(1)
        .map(|above| round_tenth(entries[above].xp - me.xp));

    let (competitor, lead) = match entries.get(index + 1) {
        Some(below) => {
            let minutes = if xp_per_minute > 0.0 {
                round_tenth((me.xp - below.xp) / xp_per_minute)
            } else {
                0.0
            };
            (
                Some(Competitor {
                    id: below.id.clone(),
                    username: below.username.clone(),
                    xp: below.xp,
                }),
                Lead::Minutes(minutes),
            )
        }
        None => (None, Lead::Unbounded),
    };

    RankStanding::Ranked(RankInfo {
        rank,
        total_players: entries.len(),
        xp: me.xp,
        xp_gap_to_next,
        competitor,
        lead,
        players_beaten: entries.len() - rank,
    })
}

/// One-shot standing from a fresh ordered query.
pub async fn fetch_standing(
    store: &dyn DocumentStore,
    self_id: &str,
    xp_per_minute: f64,
) -> Result<RankStanding> {
    let documents = store.query_ordered(&leaderboard_query()).await?;
    let snapshot = LeaderboardSnapshot::from_documents(&documents);
    Ok(compute_standing(&snapshot, self_id, xp_per_minute))
}
