use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages a client may send over the room websocket.
///
/// Organizer messages are only acted on for the organizer connection; player
/// messages only for participant connections. Anything else is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Join {
        nickname: String,
        #[serde(default)]
        avatar: String,
    },
    Vote {
        #[serde(alias = "target")]
        target_nickname: String,
    },
    // Organizer-only messages
    StartGame,
    NextQuestion,
    SkipQuestion,
    EndGame,
    ResetRoom {
        #[serde(default)]
        prompts: Option<Vec<Prompt>>,
        #[serde(default)]
        timer_seconds: Option<u32>,
        #[serde(default)]
        show_votes: Option<bool>,
    },
}

/// Messages the server sends to room connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    Error {
        message: String,
    },
    /// Connect ack for an organizer opening a brand-new room.
    RoomCreated {
        room_code: String,
    },
    /// Connect ack for a participant connection (before JOIN).
    JoinedRoom {
        room_code: String,
    },
    /// One-time snapshot sent to an observer on connect.
    SpectatorSync {
        room_code: String,
        /// RFC 3339 server wall clock, for client-side countdown display.
        server_now: String,
        state: RoomPhase,
        player_count: usize,
        players: Vec<PlayerInfo>,
        prompt_number: u32,
        total_prompts: usize,
        prediction_leaderboard: Vec<LeaderboardEntry>,
    },
    /// Full resync for an organizer reconnecting to a live session.
    OrganizerReconnected {
        room_code: String,
        server_now: String,
        state: RoomPhase,
        player_count: usize,
        players: Vec<PlayerInfo>,
        prompt_number: u32,
        total_prompts: usize,
        prediction_leaderboard: Vec<LeaderboardEntry>,
        timer_seconds: u32,
        prompts: Vec<Prompt>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<Prompt>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voted_count: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_remaining: Option<u32>,
    },
    GameStarting,
    /// Round start: the prompt everyone votes on, with pacing info.
    Question {
        prompt: Prompt,
        prompt_number: u32,
        total_prompts: usize,
        timer_seconds: u32,
        players: Vec<PlayerInfo>,
    },
    /// Per-second countdown tick.
    Timer {
        remaining: u32,
    },
    /// Vote progress, without revealing who voted for whom.
    VoteCount {
        voted: usize,
        total: usize,
    },
    /// Sent to the voter only.
    VoteConfirmed {
        target: String,
    },
    RoundResult {
        prompt: Prompt,
        podium: Vec<PodiumEntry>,
        majority_winner: String,
        prediction_points: HashMap<String, u32>,
        prediction_leaderboard: Vec<LeaderboardEntry>,
        prompt_number: u32,
        total_prompts: usize,
        is_final: bool,
        /// Per-voter breakdown, included only when the room reveals votes.
        #[serde(skip_serializing_if = "Option::is_none")]
        votes: Option<Vec<VoteRecord>>,
    },
    /// New participant joined, with the updated roster.
    PlayerJoined {
        nickname: String,
        avatar: String,
        player_count: usize,
        players: Vec<PlayerInfo>,
    },
    /// Join ack for a rejoin (retained name) or device switch, with the
    /// preserved score and enough state to render mid-round.
    Reconnected {
        score: u32,
        state: RoomPhase,
        prompt_number: u32,
        total_prompts: usize,
        avatar: String,
        players: Vec<PlayerInfo>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<Prompt>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timer_seconds: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_remaining: Option<u32>,
    },
    /// Sent to the old connection when the same nickname joins elsewhere.
    Kicked {
        message: String,
    },
    /// End-of-game aggregate: leaderboard, awards, full history.
    Podium {
        prediction_leaderboard: Vec<LeaderboardEntry>,
        superlatives: Vec<Superlative>,
        round_history: Vec<RoundRecord>,
    },
    RoomReset {
        room_code: String,
        player_count: usize,
        players: Vec<PlayerInfo>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"JOIN","nickname":"Alice","avatar":"🦊"}"#).unwrap();
        match msg {
            ClientMessage::Join { nickname, avatar } => {
                assert_eq!(nickname, "Alice");
                assert_eq!(avatar, "🦊");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        // "target" is accepted as an alias for "target_nickname"
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"VOTE","target":"Bob"}"#).unwrap();
        match msg {
            ClientMessage::Vote { target_nickname } => assert_eq!(target_nickname, "Bob"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_tag_casing() {
        let json = serde_json::to_string(&ServerMessage::Timer { remaining: 5 }).unwrap();
        assert!(json.contains(r#""type":"TIMER""#));

        let json = serde_json::to_string(&ServerMessage::VoteCount { voted: 1, total: 3 }).unwrap();
        assert!(json.contains(r#""type":"VOTE_COUNT""#));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let msg = ServerMessage::RoundResult {
            prompt: Prompt {
                id: 1,
                text: "Who is most likely to nap at work".into(),
            },
            podium: vec![],
            majority_winner: String::new(),
            prediction_points: HashMap::new(),
            prediction_leaderboard: vec![],
            prompt_number: 1,
            total_prompts: 3,
            is_final: false,
            votes: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("\"votes\""));
    }

    #[test]
    fn test_unknown_message_is_parse_error() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"HACK_THE_GIBSON"}"#);
        assert!(result.is_err());
    }
}
