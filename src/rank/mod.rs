pub mod standing;
pub mod tracker;

pub use standing::{compute_standing, fetch_standing, leaderboard_query, Competitor, Lead, RankInfo, RankStanding};
pub use tracker::RankTracker;
