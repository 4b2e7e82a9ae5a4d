//! Server configuration and game tuning constants.

use std::time::Duration;

/// A round needs enough people for voting to mean anything.
pub const MIN_PLAYERS: usize = 3;

/// Points for picking a majority winner.
pub const PREDICTION_POINTS: u32 = 100;

pub const MAX_NICKNAME_LENGTH: usize = 20;
pub const MAX_AVATAR_LENGTH: usize = 10;

pub const MIN_PROMPTS: usize = 3;
pub const MAX_PROMPTS: u32 = 20;
pub const DEFAULT_NUM_PROMPTS: u32 = 10;
pub const MAX_PROMPT_LENGTH: usize = 500;

/// Generated packs kept in memory, and for how long.
pub const MAX_PACKS: usize = 100;
pub const PACK_TTL: Duration = Duration::from_secs(3600);

pub const MAX_ROOMS: usize = 50;

pub const MIN_TIMER_SECONDS: u32 = 15;
pub const MAX_TIMER_SECONDS: u32 = 120;
pub const DEFAULT_TIMER_SECONDS: u32 = 60;

pub const ROOM_CODE_LENGTH: usize = 6;
pub const MAX_ROOM_CODE_ATTEMPTS: u32 = 10;
pub const ORGANIZER_TOKEN_LENGTH: usize = 32;

/// How often the registry checks for idle rooms.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Inbound websocket frames larger than this get an ERROR, not a dispatch.
pub const MAX_WS_MESSAGE_SIZE: usize = 4096;
/// Inbound messages allowed per connection per second.
pub const WS_RATE_LIMIT_PER_SEC: u32 = 10;

/// Per-IP window for the pack generation endpoint.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
pub const RATE_LIMIT_MAX: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: [u8; 4],
    pub port: u16,
    /// Rooms idle longer than this are swept.
    pub room_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: [0, 0, 0, 0],
            port: 8000,
            room_ttl: Duration::from_secs(1800),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: defaults.host,
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            room_ttl: std::env::var("ROOM_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.room_ttl),
        }
    }
}
