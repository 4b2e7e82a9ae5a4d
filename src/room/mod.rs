//! One isolated game session: roster, round progression, vote collection,
//! timers, and broadcast fan-out.
//!
//! All mutation funnels through a single `Mutex<RoomState>`; connection
//! tasks, the round timer, and the registry sweeper never touch the maps
//! directly. Outbound delivery goes through per-connection channels, so a
//! dead connection can never stall the room: a failed send is treated as an
//! implicit disconnect of that connection only.

pub mod scoring;
pub mod stats;

use crate::config::{MAX_AVATAR_LENGTH, MAX_NICKNAME_LENGTH, MIN_PLAYERS};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::sanitize::clean_text;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// What a room pushes into a connection's outbound channel.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    /// Tells the connection task to close the socket (kick, room teardown).
    Close,
}

pub type ConnectionTx = mpsc::UnboundedSender<Outbound>;

#[derive(Debug)]
pub struct Room {
    pub room_code: String,
    organizer_token: String,
    state: Mutex<RoomState>,
}

#[derive(Debug)]
struct RoomState {
    prompts: Vec<Prompt>,
    timer_seconds: u32,
    show_votes: bool,
    phase: RoomPhase,
    /// -1 before the first round starts.
    current_prompt_index: i32,
    question_started_at: Option<Instant>,
    last_activity: Instant,
    players: HashMap<ClientId, Player>,
    disconnected_players: HashMap<String, DisconnectedPlayer>,
    /// Current-round votes, voter connection id -> target nickname.
    votes: HashMap<ClientId, String>,
    prediction_scores: HashMap<String, u32>,
    round_history: Vec<RoundRecord>,
    connections: HashMap<ClientId, ConnectionTx>,
    spectators: HashMap<ClientId, ConnectionTx>,
    organizer_id: Option<ClientId>,
    timer: Option<JoinHandle<()>>,
}

impl Room {
    pub fn new(
        room_code: String,
        prompts: Vec<Prompt>,
        timer_seconds: u32,
        show_votes: bool,
        organizer_token: String,
    ) -> Self {
        Self {
            room_code,
            organizer_token,
            state: Mutex::new(RoomState {
                prompts,
                timer_seconds,
                show_votes,
                phase: RoomPhase::Lobby,
                current_prompt_index: -1,
                question_started_at: None,
                last_activity: Instant::now(),
                players: HashMap::new(),
                disconnected_players: HashMap::new(),
                votes: HashMap::new(),
                prediction_scores: HashMap::new(),
                round_history: Vec::new(),
                connections: HashMap::new(),
                spectators: HashMap::new(),
                organizer_id: None,
                timer: None,
            }),
        }
    }

    /// Compared verbatim; required for the organizer role only.
    pub fn verify_token(&self, token: &str) -> bool {
        !token.is_empty() && token == self.organizer_token
    }

    /// Register an ordinary participant connection. The JOIN message with a
    /// nickname comes later over the socket.
    pub async fn attach_player(&self, client_id: &str, tx: ConnectionTx) {
        let mut state = self.state.lock().await;
        state.touch();
        state.connections.insert(client_id.to_string(), tx);
        state.send_to(
            client_id,
            ServerMessage::JoinedRoom {
                room_code: self.room_code.clone(),
            },
        );
    }

    /// Register the organizer connection. A newer organizer displaces any
    /// stale one from the live set without closing its socket.
    pub async fn attach_organizer(&self, client_id: &str, tx: ConnectionTx) {
        let mut state = self.state.lock().await;
        state.touch();
        if let Some(old_id) = state.organizer_id.take() {
            if old_id != client_id {
                state.connections.remove(&old_id);
            }
        }
        state.connections.insert(client_id.to_string(), tx);
        state.organizer_id = Some(client_id.to_string());

        if state.current_prompt_index >= 0 || !state.players.is_empty() {
            let sync = state.organizer_sync(&self.room_code);
            state.send_to(client_id, sync);
            tracing::info!(
                "Organizer reconnected to room {} (state: {:?})",
                self.room_code,
                state.phase
            );
        } else {
            state.send_to(
                client_id,
                ServerMessage::RoomCreated {
                    room_code: self.room_code.clone(),
                },
            );
        }
    }

    /// Register a read-only observer and send it a one-time snapshot. Its
    /// inbound messages are never dispatched.
    pub async fn attach_spectator(&self, client_id: &str, tx: ConnectionTx) {
        let mut state = self.state.lock().await;
        state.touch();
        state.spectators.insert(client_id.to_string(), tx);
        let snapshot = ServerMessage::SpectatorSync {
            room_code: self.room_code.clone(),
            server_now: chrono::Utc::now().to_rfc3339(),
            state: state.phase,
            player_count: state.players.len(),
            players: state.player_list(),
            prompt_number: (state.current_prompt_index + 1) as u32,
            total_prompts: state.prompts.len(),
            prediction_leaderboard: state.leaderboard(),
        };
        state.send_to(client_id, snapshot);
    }

    /// Dispatch one inbound message. Role-gated: organizer messages from a
    /// participant connection (and vice versa) are a no-op.
    pub async fn handle_message(
        self: &Arc<Self>,
        client_id: &str,
        msg: ClientMessage,
        is_organizer: bool,
    ) {
        let mut state = self.state.lock().await;
        state.touch();

        if is_organizer {
            match msg {
                ClientMessage::StartGame => self.start_game(&mut state),
                ClientMessage::NextQuestion => {
                    if state.phase == RoomPhase::Reveal {
                        self.start_question(&mut state);
                    }
                }
                ClientMessage::SkipQuestion => {
                    if state.phase == RoomPhase::Question {
                        self.start_question(&mut state);
                    }
                }
                ClientMessage::EndGame => {
                    if matches!(state.phase, RoomPhase::Question | RoomPhase::Reveal) {
                        self.send_podium(&mut state);
                    }
                }
                ClientMessage::ResetRoom {
                    prompts,
                    timer_seconds,
                    show_votes,
                } => self.reset_room(&mut state, prompts, timer_seconds, show_votes),
                _ => {}
            }
        } else {
            match msg {
                ClientMessage::Join { nickname, avatar } => {
                    self.handle_join(&mut state, client_id, nickname, avatar)
                }
                ClientMessage::Vote { target_nickname } => {
                    self.handle_vote(&mut state, client_id, target_nickname)
                }
                _ => {}
            }
        }
    }

    /// Drop a connection. Mid-session participant data moves to the
    /// retention map; lobby participants are removed outright.
    pub async fn remove_connection(&self, client_id: &str) {
        let mut state = self.state.lock().await;
        state.remove_connection(client_id, &self.room_code);
    }

    pub async fn is_expired(&self, ttl: Duration) -> bool {
        let state = self.state.lock().await;
        state.last_activity.elapsed() > ttl
    }

    /// Tear down the room: cancel the timer and close every connection.
    /// Called by the registry when the room is swept.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        for tx in state.connections.values().chain(state.spectators.values()) {
            let _ = tx.send(Outbound::Close);
        }
        state.connections.clear();
        state.spectators.clear();
        state.organizer_id = None;
    }

    // --- organizer operations ---

    fn start_game(self: &Arc<Self>, state: &mut RoomState) {
        if state.phase != RoomPhase::Lobby {
            return;
        }
        if state.players.len() < MIN_PLAYERS {
            state.send_to_organizer(ServerMessage::Error {
                message: format!("Need at least {} players to start", MIN_PLAYERS),
            });
            return;
        }
        let nicknames: Vec<String> = state.players.values().map(|p| p.nickname.clone()).collect();
        for nickname in nicknames {
            state.prediction_scores.entry(nickname).or_insert(0);
        }
        state.broadcast(ServerMessage::GameStarting);
        self.start_question(state);
    }

    /// Advance to the next prompt, or to the podium when the pack is
    /// exhausted. Cancels any running timer first, so a stale timer can
    /// never fire against the new round.
    fn start_question(self: &Arc<Self>, state: &mut RoomState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        state.current_prompt_index += 1;
        let index = state.current_prompt_index;
        if index as usize >= state.prompts.len() {
            self.send_podium(state);
            return;
        }

        state.phase = RoomPhase::Question;
        state.votes.clear();

        let prompt = state.prompts[index as usize].clone();
        state.broadcast(ServerMessage::Question {
            prompt,
            prompt_number: (index + 1) as u32,
            total_prompts: state.prompts.len(),
            timer_seconds: state.timer_seconds,
            players: state.player_list(),
        });

        state.question_started_at = Some(Instant::now());
        state.timer = Some(self.spawn_timer(index, state.timer_seconds));
    }

    /// Per-round countdown. The captured round index is checked against
    /// current state under the lock before every tick and before firing; a
    /// cancelled or superseded timer exits without touching the room.
    fn spawn_timer(self: &Arc<Self>, round_index: i32, seconds: u32) -> JoinHandle<()> {
        let room = Arc::clone(self);
        tokio::spawn(async move {
            for remaining in (1..=seconds).rev() {
                {
                    let mut state = room.state.lock().await;
                    if state.phase != RoomPhase::Question
                        || state.current_prompt_index != round_index
                    {
                        return;
                    }
                    state.broadcast(ServerMessage::Timer { remaining });
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            let mut state = room.state.lock().await;
            if state.phase == RoomPhase::Question && state.current_prompt_index == round_index {
                room.end_round(&mut state);
            }
        })
    }

    /// The single end-of-round operation. All three triggers (all voted,
    /// timer expiry, organizer skip-to-reveal) converge here; only the first
    /// caller to observe QUESTION performs the transition, the rest no-op.
    fn end_round(&self, state: &mut RoomState) {
        if state.phase != RoomPhase::Question {
            return;
        }
        state.phase = RoomPhase::Reveal;

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let tally = scoring::tally_votes(state.votes.values());
        let avatars = state.avatar_map();
        let podium = scoring::rank_targets(&tally, &avatars);
        let winners = scoring::majority_winners(&tally);

        let vote_pairs: Vec<(ClientId, String)> = state
            .votes
            .iter()
            .map(|(id, target)| (id.clone(), target.clone()))
            .collect();

        let mut prediction_points: HashMap<String, u32> = HashMap::new();
        let mut votes_list: Vec<VoteRecord> = Vec::with_capacity(vote_pairs.len());
        for (voter_id, target) in &vote_pairs {
            let Some(nickname) = state.players.get(voter_id).map(|p| p.nickname.clone()) else {
                continue;
            };
            let points = scoring::points_for(target, &winners);
            prediction_points.insert(nickname.clone(), points);
            if points > 0 {
                *state.prediction_scores.entry(nickname.clone()).or_insert(0) += points;
                if let Some(player) = state.players.get_mut(voter_id) {
                    player.score += points;
                }
            }
            votes_list.push(VoteRecord {
                voter: nickname,
                target: target.clone(),
            });
        }
        // Connected non-voters are recorded at zero
        for player in state.players.values() {
            prediction_points.entry(player.nickname.clone()).or_insert(0);
        }

        let prompt = state.prompts[state.current_prompt_index as usize].clone();
        let majority_winner = winners.first().cloned().unwrap_or_default();
        state.round_history.push(RoundRecord {
            prompt: prompt.clone(),
            podium: podium.clone(),
            votes: votes_list.clone(),
            majority_winner: majority_winner.clone(),
            prediction_points: prediction_points.clone(),
        });

        let is_final = state.current_prompt_index as usize + 1 >= state.prompts.len();
        let leaderboard = state.leaderboard();
        state.broadcast(ServerMessage::RoundResult {
            prompt,
            podium,
            majority_winner,
            prediction_points,
            prediction_leaderboard: leaderboard,
            prompt_number: (state.current_prompt_index + 1) as u32,
            total_prompts: state.prompts.len(),
            is_final,
            votes: state.show_votes.then_some(votes_list),
        });
    }

    fn send_podium(&self, state: &mut RoomState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.phase = RoomPhase::Podium;
        let avatars = state.avatar_map();
        let superlatives =
            stats::superlatives(&state.round_history, &state.prediction_scores, &avatars);
        state.broadcast(ServerMessage::Podium {
            prediction_leaderboard: state.leaderboard(),
            superlatives,
            round_history: state.round_history.clone(),
        });
    }

    /// PODIUM -> LOBBY with fresh content. Connections stay attached; all
    /// round-scoped data and scores are cleared.
    fn reset_room(
        &self,
        state: &mut RoomState,
        prompts: Option<Vec<Prompt>>,
        timer_seconds: Option<u32>,
        show_votes: Option<bool>,
    ) {
        if state.phase != RoomPhase::Podium {
            return;
        }
        if let Some(prompts) = prompts {
            state.prompts = prompts;
        }
        if let Some(timer_seconds) = timer_seconds {
            state.timer_seconds = timer_seconds;
        }
        if let Some(show_votes) = show_votes {
            state.show_votes = show_votes;
        }
        state.phase = RoomPhase::Lobby;
        state.current_prompt_index = -1;
        state.question_started_at = None;
        state.votes.clear();
        state.round_history.clear();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        for player in state.players.values_mut() {
            player.score = 0;
        }
        state.prediction_scores = state
            .players
            .values()
            .map(|p| (p.nickname.clone(), 0))
            .collect();
        state.disconnected_players.clear();

        state.broadcast(ServerMessage::RoomReset {
            room_code: self.room_code.clone(),
            player_count: state.players.len(),
            players: state.player_list(),
        });
    }

    // --- participant operations ---

    fn handle_join(&self, state: &mut RoomState, client_id: &str, nickname: String, avatar: String) {
        let nickname = clean_text(&nickname);
        if nickname.is_empty() || nickname.chars().count() > MAX_NICKNAME_LENGTH {
            state.send_to(
                client_id,
                ServerMessage::Error {
                    message: format!("Nickname must be 1-{} characters", MAX_NICKNAME_LENGTH),
                },
            );
            return;
        }
        let avatar: String = avatar.chars().take(MAX_AVATAR_LENGTH).collect();

        // Rejoin under a retained name: restore the preserved score
        if let Some(saved) = state.disconnected_players.remove(&nickname) {
            let avatar = if saved.avatar.is_empty() {
                avatar
            } else {
                saved.avatar
            };
            state.players.insert(
                client_id.to_string(),
                Player {
                    nickname: nickname.clone(),
                    score: saved.score,
                    avatar: avatar.clone(),
                },
            );
            tracing::info!("Player '{}' reconnected to room {}", nickname, self.room_code);
            let ack = state.reconnect_ack(saved.score, avatar);
            state.send_to(client_id, ack);
            return;
        }

        // Same nickname already connected: device switch. Kick the old
        // connection and transfer its live score.
        let existing_id = state
            .players
            .iter()
            .find(|(_, p)| p.nickname == nickname)
            .map(|(id, _)| id.clone());
        if let Some(existing_id) = existing_id {
            if let Some(old_tx) = state.connections.remove(&existing_id) {
                let _ = old_tx.send(Outbound::Message(ServerMessage::Kicked {
                    message: "You joined from another device".into(),
                }));
                let _ = old_tx.send(Outbound::Close);
            }
            if let Some(player) = state.players.remove(&existing_id) {
                let ack = state.reconnect_ack(player.score, player.avatar.clone());
                state.players.insert(client_id.to_string(), player);
                state.send_to(client_id, ack);
            }
            return;
        }

        state.players.insert(
            client_id.to_string(),
            Player {
                nickname: nickname.clone(),
                score: 0,
                avatar: avatar.clone(),
            },
        );
        state.prediction_scores.entry(nickname.clone()).or_insert(0);
        state.broadcast(ServerMessage::PlayerJoined {
            nickname,
            avatar,
            player_count: state.players.len(),
            players: state.player_list(),
        });
    }

    /// Vote acceptance and the all-voted check, evaluated together under the
    /// room lock so a concurrent round-end never sees a stale count.
    fn handle_vote(&self, state: &mut RoomState, client_id: &str, target: String) {
        let target = target.trim().to_string();
        if target.is_empty() || !state.players.contains_key(client_id) {
            return;
        }
        if !state.is_valid_target(&target) {
            state.send_to(
                client_id,
                ServerMessage::Error {
                    message: format!("'{}' is not a player in this room", target),
                },
            );
            return;
        }
        if state.phase != RoomPhase::Question || state.votes.contains_key(client_id) {
            // First vote wins; retries and late votes are ignored
            return;
        }
        state.votes.insert(client_id.to_string(), target.clone());
        let all_voted = state.votes.len() >= state.players.len();

        state.broadcast(ServerMessage::VoteCount {
            voted: state.votes.len(),
            total: state.players.len(),
        });
        state.send_to(client_id, ServerMessage::VoteConfirmed { target });

        if all_voted {
            self.end_round(state);
        }
    }
}

impl RoomState {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn player_list(&self) -> Vec<PlayerInfo> {
        let mut list: Vec<PlayerInfo> = self
            .players
            .values()
            .map(|p| PlayerInfo {
                nickname: p.nickname.clone(),
                avatar: p.avatar.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        list
    }

    /// Avatars for everyone still in the session, connected or retained.
    fn avatar_map(&self) -> HashMap<String, String> {
        let mut avatars: HashMap<String, String> = self
            .players
            .values()
            .map(|p| (p.nickname.clone(), p.avatar.clone()))
            .collect();
        for (nickname, saved) in &self.disconnected_players {
            avatars
                .entry(nickname.clone())
                .or_insert_with(|| saved.avatar.clone());
        }
        avatars
    }

    fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        stats::prediction_leaderboard(&self.prediction_scores, &self.avatar_map())
    }

    /// A vote target must be someone in the session: currently connected or
    /// in disconnected-retention.
    fn is_valid_target(&self, target: &str) -> bool {
        self.players.values().any(|p| p.nickname == target)
            || self.disconnected_players.contains_key(target)
    }

    fn time_remaining(&self) -> u32 {
        match self.question_started_at {
            Some(started) => self
                .timer_seconds
                .saturating_sub(started.elapsed().as_secs() as u32),
            None => 0,
        }
    }

    fn current_prompt(&self) -> Option<Prompt> {
        if self.current_prompt_index >= 0 {
            self.prompts.get(self.current_prompt_index as usize).cloned()
        } else {
            None
        }
    }

    fn reconnect_ack(&self, score: u32, avatar: String) -> ServerMessage {
        let mid_question = self.phase == RoomPhase::Question;
        ServerMessage::Reconnected {
            score,
            state: self.phase,
            prompt_number: (self.current_prompt_index + 1) as u32,
            total_prompts: self.prompts.len(),
            avatar,
            players: self.player_list(),
            prompt: if mid_question { self.current_prompt() } else { None },
            timer_seconds: mid_question.then_some(self.timer_seconds),
            time_remaining: mid_question.then(|| self.time_remaining()),
        }
    }

    fn organizer_sync(&self, room_code: &str) -> ServerMessage {
        let mid_question = self.phase == RoomPhase::Question;
        ServerMessage::OrganizerReconnected {
            room_code: room_code.to_string(),
            server_now: chrono::Utc::now().to_rfc3339(),
            state: self.phase,
            player_count: self.players.len(),
            players: self.player_list(),
            prompt_number: (self.current_prompt_index + 1) as u32,
            total_prompts: self.prompts.len(),
            prediction_leaderboard: self.leaderboard(),
            timer_seconds: self.timer_seconds,
            prompts: self.prompts.clone(),
            prompt: if mid_question { self.current_prompt() } else { None },
            voted_count: mid_question.then_some(self.votes.len()),
            time_remaining: mid_question.then(|| self.time_remaining()),
        }
    }

    /// Send to one connection; a failed send removes that connection.
    fn send_to(&mut self, client_id: &str, msg: ServerMessage) {
        let failed = match self
            .connections
            .get(client_id)
            .or_else(|| self.spectators.get(client_id))
        {
            Some(tx) => tx.send(Outbound::Message(msg)).is_err(),
            None => false,
        };
        if failed {
            self.remove_connection(client_id, "");
        }
    }

    fn send_to_organizer(&mut self, msg: ServerMessage) {
        if let Some(organizer_id) = self.organizer_id.clone() {
            self.send_to(&organizer_id, msg);
        }
    }

    /// Fan out to every participant, the organizer, and all observers. Dead
    /// connections are cleaned up afterwards; one slow or dead peer never
    /// stalls the rest.
    fn broadcast(&mut self, msg: ServerMessage) {
        let mut dead: Vec<ClientId> = Vec::new();
        for (client_id, tx) in self.connections.iter().chain(self.spectators.iter()) {
            if tx.send(Outbound::Message(msg.clone())).is_err() {
                dead.push(client_id.clone());
            }
        }
        for client_id in dead {
            self.remove_connection(&client_id, "");
        }
    }

    fn remove_connection(&mut self, client_id: &str, room_code: &str) {
        self.connections.remove(client_id);
        self.spectators.remove(client_id);

        if let Some(player) = self.players.remove(client_id) {
            if self.phase == RoomPhase::Lobby {
                self.prediction_scores.remove(&player.nickname);
                tracing::info!("Player '{}' left room {}", player.nickname, room_code);
            } else {
                tracing::info!(
                    "Player '{}' disconnected from room {} (data preserved)",
                    player.nickname,
                    room_code
                );
                self.disconnected_players.insert(
                    player.nickname,
                    DisconnectedPlayer {
                        score: player.score,
                        avatar: player.avatar,
                    },
                );
            }
        }
        if self.organizer_id.as_deref() == Some(client_id) {
            self.organizer_id = None;
            tracing::info!("Organizer disconnected from room {}", room_code);
        }
    }
}
