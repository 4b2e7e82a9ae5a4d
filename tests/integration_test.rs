//! End-to-end session scenarios driven through the library API, with
//! unbounded channels standing in for websocket connections.

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use whosmost::config::PREDICTION_POINTS;
use whosmost::protocol::{ClientMessage, ServerMessage};
use whosmost::room::{Outbound, Room};
use whosmost::types::{Prompt, RoomPhase};

fn prompts(n: u32) -> Vec<Prompt> {
    (1..=n)
        .map(|id| Prompt {
            id,
            text: format!("Who is most likely to win round {}", id),
        })
        .collect()
}

fn new_room(rounds: u32, show_votes: bool) -> Arc<Room> {
    Arc::new(Room::new(
        "GAME42".into(),
        prompts(rounds),
        60,
        show_votes,
        "organizer-token".into(),
    ))
}

async fn join(room: &Arc<Room>, client_id: &str, nickname: &str) -> UnboundedReceiver<Outbound> {
    let (tx, rx) = mpsc::unbounded_channel();
    room.attach_player(client_id, tx).await;
    room.handle_message(
        client_id,
        ClientMessage::Join {
            nickname: nickname.into(),
            avatar: String::new(),
        },
        false,
    )
    .await;
    rx
}

async fn attach_organizer(room: &Arc<Room>) -> UnboundedReceiver<Outbound> {
    let (tx, rx) = mpsc::unbounded_channel();
    room.attach_organizer("organizer", tx).await;
    rx
}

async fn vote(room: &Arc<Room>, client_id: &str, target: &str) {
    room.handle_message(
        client_id,
        ClientMessage::Vote {
            target_nickname: target.into(),
        },
        false,
    )
    .await;
}

fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(out) = rx.try_recv() {
        if let Outbound::Message(msg) = out {
            messages.push(msg);
        }
    }
    messages
}

fn last_round_result(messages: &[ServerMessage]) -> &ServerMessage {
    messages
        .iter()
        .rev()
        .find(|m| matches!(m, ServerMessage::RoundResult { .. }))
        .expect("expected a ROUND_RESULT")
}

/// Spec walkthrough: three participants, three rounds, Charlie picked by a
/// two-vote majority every round.
#[tokio::test]
async fn test_three_round_session_with_recurring_majority() {
    let room = new_room(3, false);
    let mut alice = join(&room, "a", "Alice").await;
    let _bob = join(&room, "b", "Bob").await;
    let _charlie = join(&room, "c", "Charlie").await;
    let _org = attach_organizer(&room).await;

    room.handle_message("organizer", ClientMessage::StartGame, true)
        .await;

    for round in 1..=3u32 {
        drain(&mut alice);
        vote(&room, "a", "Charlie").await;
        vote(&room, "b", "Charlie").await;
        vote(&room, "c", "Alice").await;

        let messages = drain(&mut alice);
        match last_round_result(&messages) {
            ServerMessage::RoundResult {
                majority_winner,
                podium,
                prediction_points,
                is_final,
                votes,
                ..
            } => {
                assert_eq!(majority_winner, "Charlie");
                assert_eq!(podium[0].nickname, "Charlie");
                assert_eq!(podium[0].vote_count, 2);
                assert_eq!(podium[0].rank, 1);
                assert_eq!(podium[1].nickname, "Alice");
                assert_eq!(podium[1].rank, 2);
                assert_eq!(prediction_points.get("Alice"), Some(&PREDICTION_POINTS));
                assert_eq!(prediction_points.get("Bob"), Some(&PREDICTION_POINTS));
                assert_eq!(prediction_points.get("Charlie"), Some(&0));
                assert_eq!(*is_final, round == 3);
                // Vote breakdown stays hidden when show_votes is off
                assert!(votes.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }

        if round < 3 {
            room.handle_message("organizer", ClientMessage::NextQuestion, true)
                .await;
        }
    }

    // Advancing past the last reveal reaches the podium
    room.handle_message("organizer", ClientMessage::NextQuestion, true)
        .await;
    let messages = drain(&mut alice);
    let podium_msg = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::Podium {
                prediction_leaderboard,
                superlatives,
                round_history,
            } => Some((prediction_leaderboard, superlatives, round_history)),
            _ => None,
        })
        .expect("expected a PODIUM");

    let (leaderboard, superlatives, history) = podium_msg;
    assert_eq!(history.len(), 3);

    // Alice and Bob predicted Charlie every round, tied at 3x the award
    assert_eq!(leaderboard[0].nickname, "Alice");
    assert_eq!(leaderboard[0].score, 3 * PREDICTION_POINTS);
    assert_eq!(leaderboard[0].rank, 1);
    assert_eq!(leaderboard[1].nickname, "Bob");
    assert_eq!(leaderboard[1].score, 3 * PREDICTION_POINTS);
    assert_eq!(leaderboard[1].rank, 2);
    assert_eq!(leaderboard[2].nickname, "Charlie");
    assert_eq!(leaderboard[2].score, 0);

    let most_votes = superlatives
        .iter()
        .find(|s| s.title == "Most Likely To Everything")
        .expect("expected the total-votes award");
    assert_eq!(most_votes.winner, "Charlie");
    assert_eq!(most_votes.detail, "Received 6 total votes");
}

#[tokio::test]
async fn test_three_way_tie_everyone_wins() {
    let room = new_room(1, false);
    let mut alice = join(&room, "a", "Alice").await;
    let _bob = join(&room, "b", "Bob").await;
    let _charlie = join(&room, "c", "Charlie").await;
    let _org = attach_organizer(&room).await;

    room.handle_message("organizer", ClientMessage::StartGame, true)
        .await;
    vote(&room, "a", "Bob").await;
    vote(&room, "b", "Charlie").await;
    vote(&room, "c", "Alice").await;

    let messages = drain(&mut alice);
    match last_round_result(&messages) {
        ServerMessage::RoundResult {
            podium,
            prediction_points,
            ..
        } => {
            let ranks: Vec<u32> = podium.iter().map(|e| e.rank).collect();
            assert_eq!(ranks, vec![1, 1, 1]);
            // Every voter picked a majority winner
            for name in ["Alice", "Bob", "Charlie"] {
                assert_eq!(prediction_points.get(name), Some(&PREDICTION_POINTS));
            }
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_show_votes_includes_breakdown() {
    let room = new_room(1, true);
    let mut alice = join(&room, "a", "Alice").await;
    let _bob = join(&room, "b", "Bob").await;
    let _charlie = join(&room, "c", "Charlie").await;
    let _org = attach_organizer(&room).await;

    room.handle_message("organizer", ClientMessage::StartGame, true)
        .await;
    vote(&room, "a", "Charlie").await;
    vote(&room, "b", "Charlie").await;
    vote(&room, "c", "Alice").await;

    let messages = drain(&mut alice);
    match last_round_result(&messages) {
        ServerMessage::RoundResult { votes, .. } => {
            let votes = votes.as_ref().expect("expected the vote breakdown");
            assert_eq!(votes.len(), 3);
            assert!(votes
                .iter()
                .any(|v| v.voter == "Alice" && v.target == "Charlie"));
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

/// A participant who drops mid-round stays a legal vote target, and rejoining
/// under the same name restores the preserved score.
#[tokio::test]
async fn test_mid_round_disconnect_retention_flow() {
    let room = new_room(2, false);
    let mut alice = join(&room, "a", "Alice").await;
    let bob = join(&room, "b", "Bob").await;
    let _charlie = join(&room, "c", "Charlie").await;
    let _org = attach_organizer(&room).await;

    room.handle_message("organizer", ClientMessage::StartGame, true)
        .await;

    drop(bob);
    room.remove_connection("b").await;
    drain(&mut alice);

    // Bob is gone but still a valid target
    vote(&room, "a", "Bob").await;
    let messages = drain(&mut alice);
    assert!(messages
        .iter()
        .any(|m| matches!(m, ServerMessage::VoteConfirmed { target } if target == "Bob")));

    // Rejoin restores the retained entry, mid-round context included
    let mut rejoined = join(&room, "b2", "Bob").await;
    let messages = drain(&mut rejoined);
    let reconnected = messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::Reconnected {
                score,
                state,
                prompt,
                ..
            } => Some((*score, *state, prompt.clone())),
            _ => None,
        })
        .expect("expected a RECONNECTED ack");
    assert_eq!(reconnected.0, 0);
    assert_eq!(reconnected.1, RoomPhase::Question);
    assert!(reconnected.2.is_some());
}

/// After a reset, a fresh game runs cleanly in the same room with the same
/// connections.
#[tokio::test]
async fn test_reset_then_replay() {
    let room = new_room(1, false);
    let mut alice = join(&room, "a", "Alice").await;
    let _bob = join(&room, "b", "Bob").await;
    let _charlie = join(&room, "c", "Charlie").await;
    let _org = attach_organizer(&room).await;

    room.handle_message("organizer", ClientMessage::StartGame, true)
        .await;
    vote(&room, "a", "Charlie").await;
    vote(&room, "b", "Charlie").await;
    vote(&room, "c", "Charlie").await;
    room.handle_message("organizer", ClientMessage::NextQuestion, true)
        .await;

    room.handle_message(
        "organizer",
        ClientMessage::ResetRoom {
            prompts: Some(prompts(1)),
            timer_seconds: None,
            show_votes: None,
        },
        true,
    )
    .await;
    drain(&mut alice);

    room.handle_message("organizer", ClientMessage::StartGame, true)
        .await;
    vote(&room, "a", "Bob").await;
    vote(&room, "b", "Bob").await;
    vote(&room, "c", "Bob").await;

    let messages = drain(&mut alice);
    match last_round_result(&messages) {
        ServerMessage::RoundResult {
            majority_winner,
            prediction_leaderboard,
            ..
        } => {
            assert_eq!(majority_winner, "Bob");
            // Scores restarted from zero after the reset
            let alice_row = prediction_leaderboard
                .iter()
                .find(|e| e.nickname == "Alice")
                .unwrap();
            assert_eq!(alice_row.score, PREDICTION_POINTS);
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

/// Late joiner mid-game gets the running round and can vote in it.
#[tokio::test]
async fn test_late_joiner_can_vote() {
    let room = new_room(2, false);
    let _alice = join(&room, "a", "Alice").await;
    let _bob = join(&room, "b", "Bob").await;
    let _charlie = join(&room, "c", "Charlie").await;
    let _org = attach_organizer(&room).await;

    room.handle_message("organizer", ClientMessage::StartGame, true)
        .await;

    let mut dana = join(&room, "d", "Dana").await;
    drain(&mut dana);
    vote(&room, "d", "Alice").await;

    let messages = drain(&mut dana);
    assert!(messages
        .iter()
        .any(|m| matches!(m, ServerMessage::VoteConfirmed { target } if target == "Alice")));
}
