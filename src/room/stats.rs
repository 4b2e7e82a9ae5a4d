//! End-of-game aggregation: prediction leaderboard and superlatives.
//!
//! Pure folds over the round history and the cumulative prediction scores.
//! Recomputing from the same inputs always yields the same result.

use crate::config::PREDICTION_POINTS;
use crate::types::{LeaderboardEntry, RoundRecord, Superlative};
use std::collections::HashMap;

/// Cumulative prediction scores, sorted descending (nickname ascending on
/// ties) and ranked 1..N sequentially.
pub fn prediction_leaderboard(
    scores: &HashMap<String, u32>,
    avatars: &HashMap<String, String>,
) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<(&String, &u32)> = scores.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, (nickname, score))| LeaderboardEntry {
            nickname: nickname.clone(),
            avatar: avatars.get(nickname).cloned().unwrap_or_default(),
            score: *score,
            rank: i as u32 + 1,
        })
        .collect()
}

/// Compute the fixed set of end-of-game awards over the full round history.
/// Each award is included only when its underlying count is nonzero.
pub fn superlatives(
    history: &[RoundRecord],
    prediction_scores: &HashMap<String, u32>,
    avatars: &HashMap<String, String>,
) -> Vec<Superlative> {
    let mut awards = Vec::new();
    if history.is_empty() {
        return awards;
    }

    let avatar_of = |name: &str| avatars.get(name).cloned().unwrap_or_default();

    // Most total votes received across all rounds
    let mut votes_received: HashMap<&str, u32> = HashMap::new();
    for round in history {
        for vote in &round.votes {
            *votes_received.entry(vote.target.as_str()).or_insert(0) += 1;
        }
    }
    if let Some((name, count)) = top_entry(&votes_received) {
        awards.push(Superlative {
            title: "Most Likely To Everything".into(),
            winner: name.to_string(),
            avatar: avatar_of(name),
            detail: format!("Received {} total votes", count),
        });
    }

    // Most self-votes
    let mut self_votes: HashMap<&str, u32> = HashMap::new();
    for round in history {
        for vote in &round.votes {
            if vote.voter == vote.target {
                *self_votes.entry(vote.voter.as_str()).or_insert(0) += 1;
            }
        }
    }
    if let Some((name, count)) = top_entry(&self_votes) {
        awards.push(Superlative {
            title: "Narcissist Award".into(),
            winner: name.to_string(),
            avatar: avatar_of(name),
            detail: format!("Voted for themselves {} times", count),
        });
    }

    // Highest prediction score, expressed as correct-majority picks
    let borrowed: HashMap<&str, u32> = prediction_scores
        .iter()
        .map(|(name, score)| (name.as_str(), *score))
        .collect();
    if let Some((name, score)) = top_entry(&borrowed) {
        awards.push(Superlative {
            title: "Mind Reader".into(),
            winner: name.to_string(),
            avatar: avatar_of(name),
            detail: format!("Predicted the majority {} times", score / PREDICTION_POINTS),
        });
    }

    // Most rounds in a close top-two (counts differ by at most one vote).
    // Both members of each qualifying pair are credited; the single
    // highest-count name is reported.
    let mut close_counts: HashMap<&str, u32> = HashMap::new();
    for round in history {
        if round.podium.len() >= 2 {
            let first = &round.podium[0];
            let second = &round.podium[1];
            if first.vote_count - second.vote_count <= 1 {
                *close_counts.entry(first.nickname.as_str()).or_insert(0) += 1;
                *close_counts.entry(second.nickname.as_str()).or_insert(0) += 1;
            }
        }
    }
    if let Some((name, count)) = top_entry(&close_counts) {
        awards.push(Superlative {
            title: "Most Controversial".into(),
            winner: name.to_string(),
            avatar: avatar_of(name),
            detail: format!("Part of {} close votes", count),
        });
    }

    awards
}

/// Highest-count entry with a nonzero count, nickname ascending on ties.
fn top_entry<'a>(counts: &HashMap<&'a str, u32>) -> Option<(&'a str, u32)> {
    counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, count)| (*name, *count))
}
