//! # Draw Statistics
//!
//! Global totals and the draw-count leaderboard, computed from store
//! summaries.

use serde::Serialize;

use crate::store::PlayerSummary;

/// Totals across every registered player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrawStats {
    /// Registered players.
    pub total_players: u64,
    /// Committed draws.
    pub total_draws: u64,
    /// 5★ draws.
    pub five_star: u64,
    /// 4★ draws.
    pub four_star: u64,
    /// 3★ draws.
    pub three_star: u64,
}

impl DrawStats {
    /// Sums per-player summaries.
    #[must_use]
    pub fn aggregate(summaries: &[PlayerSummary]) -> Self {
        let mut stats = summaries.iter().fold(Self::default(), |mut acc, s| {
            acc.total_players += 1;
            acc.total_draws += s.total_draws;
            acc.five_star += s.five_star;
            acc.four_star += s.four_star;
            acc
        });
        stats.three_star = stats.total_draws - stats.five_star - stats.four_star;
        stats
    }
}

/// One leaderboard row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub position: usize,
    /// Player identifier.
    pub player_id: String,
    /// Display name.
    pub name: String,
    /// Committed draws.
    pub total_draws: u64,
    /// 5★ draws.
    pub five_star: u64,
}

/// Orders players by draw count, most first, and keeps the top `size`.
///
/// Players without draws are included. Ties go to the player with more 5★
/// draws, then to the lower player id.
#[must_use]
pub fn leaderboard(mut summaries: Vec<PlayerSummary>, size: usize) -> Vec<LeaderboardEntry> {
    summaries.sort_by(|a, b| {
        b.total_draws
            .cmp(&a.total_draws)
            .then(b.five_star.cmp(&a.five_star))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    summaries
        .into_iter()
        .take(size)
        .enumerate()
        .map(|(i, s)| LeaderboardEntry {
            position: i + 1,
            player_id: s.player_id,
            name: s.name,
            total_draws: s.total_draws,
            five_star: s.five_star,
        })
        .collect()
}
