//! Account-level operations on player documents.

use anyhow::{Context, Result};
use log::{error, info};
use serde::Serialize;

use crate::{
    auth::Identity,
    db::models::{
        fields, validate_username, LeaderboardSnapshot, PlayerRecord, PLAYERS_COLLECTION,
    },
    rank::{compute_standing, leaderboard_query, RankStanding},
    store::{DocumentStore, FieldOp},
};

/// Create the player's zeroed document on first launch. Returns whether a
/// document was written; an existing one is left alone.
pub async fn ensure_player(store: &dyn DocumentStore, identity: &Identity) -> Result<bool> {
    if store
        .get_document(PLAYERS_COLLECTION, &identity.uid)
        .await?
        .is_some()
    {
        info!("player {} already exists, not adding to leaderboard", identity.uid);
        return Ok(false);
    }

    let fields = PlayerRecord::new_zeroed(identity).to_fields()?;
    store
        .set_document(PLAYERS_COLLECTION, &identity.uid, fields)
        .await
        .with_context(|| format!("failed to create player {}", identity.uid))?;
    info!("player {} added to leaderboard", identity.uid);
    Ok(true)
}

pub async fn load_player(store: &dyn DocumentStore, uid: &str) -> Result<Option<PlayerRecord>> {
    store
        .get_document(PLAYERS_COLLECTION, uid)
        .await?
        .map(PlayerRecord::from_document)
        .transpose()
}

/// Validate and store a new display name; returns the stored value.
pub async fn update_username(
    store: &dyn DocumentStore,
    identity: &Identity,
    requested: &str,
) -> Result<String> {
    let username = validate_username(requested)?;
    store
        .update_document(
            PLAYERS_COLLECTION,
            &identity.uid,
            vec![FieldOp::set(fields::USERNAME, username.clone())],
        )
        .await
        .context("An error occurred while updating your username")?;
    Ok(username)
}

/// One-shot leaderboard read. Failures are logged and yield an empty board.
pub async fn fetch_leaderboard(store: &dyn DocumentStore) -> LeaderboardSnapshot {
    match store.query_ordered(&leaderboard_query()).await {
        Ok(documents) => LeaderboardSnapshot::from_documents(&documents),
        Err(err) => {
            error!("error fetching leaderboard: {err:?}");
            LeaderboardSnapshot::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub username: String,
    pub standing: RankStanding,
    pub minutes_studied: f64,
    pub session_count: usize,
    pub average_session_minutes: f64,
}

pub async fn profile(
    store: &dyn DocumentStore,
    identity: &Identity,
    xp_per_minute: f64,
) -> Result<PlayerProfile> {
    let record = load_player(store, &identity.uid).await?.unwrap_or_else(|| PlayerRecord {
        id: identity.uid.clone(),
        ..PlayerRecord::default()
    });
    let board = fetch_leaderboard(store).await;

    Ok(PlayerProfile {
        username: record.display_name().to_string(),
        standing: compute_standing(&board, &identity.uid, xp_per_minute),
        minutes_studied: record.minutes_studied,
        session_count: record.session_count(),
        average_session_minutes: record.average_session_minutes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn ensure_player_creates_once() {
        let store = MemoryStore::new();
        let identity = Identity::new("u1", Some("first-name".into()));

        assert!(ensure_player(&store, &identity).await.unwrap());
        store
            .update_document(PLAYERS_COLLECTION, "u1", vec![FieldOp::increment(fields::XP, 5.0)])
            .await
            .unwrap();
        assert!(!ensure_player(&store, &identity).await.unwrap());

        let record = load_player(&store, "u1").await.unwrap().unwrap();
        assert_eq!(record.xp, 5.0);
        assert_eq!(record.username.as_deref(), Some("first-name"));
    }

    #[tokio::test]
    async fn username_updates_are_validated() {
        let store = MemoryStore::new();
        let identity = Identity::new("u1", None);
        ensure_player(&store, &identity).await.unwrap();

        assert!(update_username(&store, &identity, "abc").await.is_err());
        assert_eq!(
            update_username(&store, &identity, " scholar ").await.unwrap(),
            "scholar"
        );
        let record = load_player(&store, "u1").await.unwrap().unwrap();
        assert_eq!(record.display_name(), "scholar");
    }

    #[tokio::test]
    async fn profile_reports_rank_and_session_stats() {
        let store = MemoryStore::new();
        let me = Identity::new("me", Some("myself".into()));
        let rival = Identity::new("rival", Some("rival".into()));
        ensure_player(&store, &me).await.unwrap();
        ensure_player(&store, &rival).await.unwrap();
        store
            .update_document(
                PLAYERS_COLLECTION,
                "me",
                vec![
                    FieldOp::increment(fields::XP, 15.0),
                    FieldOp::increment(fields::MINUTES_STUDIED, 1.5),
                    FieldOp::append(fields::STUDY_SESSIONS, 1.0),
                    FieldOp::append(fields::STUDY_SESSIONS, 0.5),
                ],
            )
            .await
            .unwrap();

        let profile = profile(&store, &me, 10.0).await.unwrap();
        assert_eq!(profile.username, "myself");
        assert_eq!(profile.standing.rank(), Some(1));
        assert_eq!(profile.session_count, 2);
        assert_eq!(profile.average_session_minutes, 0.75);
        assert_eq!(profile.minutes_studied, 1.5);
    }
}
