pub mod challenge;
pub mod leaderboard;
pub mod player;

pub use challenge::{find_challenge, Challenge, CHALLENGES, PROGRESS_FULL_MINUTES};
pub use leaderboard::{xp_difference, LeaderboardEntry, LeaderboardSnapshot, XpDifference};
pub use player::{fields, validate_username, PlayerRecord, PLAYERS_COLLECTION};
