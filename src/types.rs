use serde::{Deserialize, Serialize};

/// Ephemeral per-connection identifier, supplied by the client in the WS path.
pub type ClientId = String;

/// One "Who is most likely to..." prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub id: u32,
    pub text: String,
}

/// A titled list of prompts, produced by a content provider or edited by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPack {
    pub title: String,
    pub prompts: Vec<Prompt>,
}

/// Room lifecycle phase.
///
/// LOBBY -> QUESTION -> REVEAL -> {QUESTION | PODIUM}, PODIUM -> LOBBY via reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomPhase {
    Lobby,
    Question,
    Reveal,
    Podium,
}

/// A connected participant. Keyed by connection id in the roster; the nickname
/// is the durable identity within a session.
#[derive(Debug, Clone)]
pub struct Player {
    pub nickname: String,
    pub score: u32,
    pub avatar: String,
}

/// Score and avatar preserved for a participant who dropped mid-session,
/// restorable by nickname on rejoin.
#[derive(Debug, Clone)]
pub struct DisconnectedPlayer {
    pub score: u32,
    pub avatar: String,
}

/// Roster entry as sent on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerInfo {
    pub nickname: String,
    pub avatar: String,
}

/// One row of a round's ranked result. Ranks use dense competition ranking:
/// ties share a rank, the next distinct count gets its 1-based position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodiumEntry {
    pub nickname: String,
    pub avatar: String,
    pub vote_count: u32,
    pub rank: u32,
}

/// A single voter -> target pair, for the per-round breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteRecord {
    pub voter: String,
    pub target: String,
}

/// Immutable summary of one completed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub prompt: Prompt,
    pub podium: Vec<PodiumEntry>,
    pub votes: Vec<VoteRecord>,
    /// First majority winner in rank order, empty when no votes were cast.
    pub majority_winner: String,
    /// Points credited to each voter this round (zero for wrong picks and
    /// connected non-voters).
    pub prediction_points: std::collections::HashMap<String, u32>,
}

/// One row of the prediction leaderboard. Ranks are sequential (1..N) in sort
/// order; ties are not collapsed here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub nickname: String,
    pub avatar: String,
    pub score: u32,
    pub rank: u32,
}

/// An end-of-game award computed over the full round history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Superlative {
    pub title: String,
    pub winner: String,
    pub avatar: String,
    pub detail: String,
}
