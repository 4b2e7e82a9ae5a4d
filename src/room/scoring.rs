//! Vote tallying, ranking and prediction scoring for a single round.
//!
//! Pure functions over the round's vote map, so the tie-break rules can be
//! tested without a live room.

use crate::config::PREDICTION_POINTS;
use crate::types::PodiumEntry;
use std::collections::HashMap;

/// Count votes per target nickname.
pub fn tally_votes<'a, I>(targets: I) -> HashMap<String, u32>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut tally: HashMap<String, u32> = HashMap::new();
    for target in targets {
        *tally.entry(target.clone()).or_insert(0) += 1;
    }
    tally
}

/// Build the ranked result list, sorted by vote count descending (nickname
/// ascending as the deterministic tie-break).
///
/// Ranks use dense competition ranking: equal counts share a rank, and the
/// next distinct count gets the rank of its 1-based position in the sorted
/// sequence. Counts [2, 2, 1] rank as [1, 1, 3].
pub fn rank_targets(
    tally: &HashMap<String, u32>,
    avatars: &HashMap<String, String>,
) -> Vec<PodiumEntry> {
    let mut sorted: Vec<(&String, &u32)> = tally.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut podium = Vec::with_capacity(sorted.len());
    let mut rank = 1u32;
    for (i, (nickname, count)) in sorted.iter().enumerate() {
        if i > 0 && *count < sorted[i - 1].1 {
            rank = i as u32 + 1;
        }
        podium.push(PodiumEntry {
            nickname: (*nickname).clone(),
            avatar: avatars.get(*nickname).cloned().unwrap_or_default(),
            vote_count: **count,
            rank,
        });
    }
    podium
}

/// All targets tied for the maximum vote count, sorted by nickname.
/// Empty when no votes were cast.
pub fn majority_winners(tally: &HashMap<String, u32>) -> Vec<String> {
    let max = tally.values().copied().max().unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }
    let mut winners: Vec<String> = tally
        .iter()
        .filter(|(_, count)| **count == max)
        .map(|(name, _)| name.clone())
        .collect();
    winners.sort();
    winners
}

/// Points this round for one voter: the full award if their pick was a
/// majority winner, zero otherwise.
pub fn points_for(target: &str, winners: &[String]) -> u32 {
    if winners.iter().any(|w| w == target) {
        PREDICTION_POINTS
    } else {
        0
    }
}
