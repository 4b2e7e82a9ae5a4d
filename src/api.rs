//! HTTP endpoints: prompt pack CRUD, room creation, provider listing.
//!
//! Pack generation is the only expensive route and is rate limited per
//! source IP. Everything else is cheap map access.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::app::AppState;
use crate::config::{
    DEFAULT_NUM_PROMPTS, DEFAULT_TIMER_SECONDS, MAX_PROMPTS, MAX_PROMPT_LENGTH, MAX_TIMER_SECONDS,
    MIN_PROMPTS, MIN_TIMER_SECONDS, ORGANIZER_TOKEN_LENGTH,
};
use crate::llm::{PackRequest, Vibe};
use crate::registry::RegistryError;
use crate::sanitize::{clean_text, looks_like_injection};
use crate::types::Prompt;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Too many requests, slow down")]
    RateLimited,

    #[error("{0}")]
    Unavailable(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AtCapacity(_) => Self::Unavailable(err.to_string()),
            RegistryError::CodeSpaceExhausted => Self::Unavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/providers", get(list_providers))
        .route("/prompts/generate", post(generate_pack))
        .route("/prompts/{pack_id}", get(get_pack).put(update_pack))
        .route(
            "/prompts/{pack_id}/prompt/{prompt_id}",
            delete(delete_prompt),
        )
        .route("/room/create", post(create_room))
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "whosmost",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "active_rooms": state.registry.room_count().await,
    }))
}

#[derive(Debug, Serialize)]
struct ProviderInfo {
    id: String,
    model: String,
    available: bool,
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderInfo>> {
    let providers = match &state.engine {
        Some(engine) => engine
            .provider_status()
            .await
            .into_iter()
            .map(|(id, model, available)| ProviderInfo {
                id,
                model,
                available,
            })
            .collect(),
        None => vec![],
    };
    Json(providers)
}

#[derive(Debug, Deserialize)]
pub struct GeneratePackRequest {
    pub vibe: String,
    #[serde(default)]
    pub num_prompts: Option<u32>,
    #[serde(default)]
    pub custom_theme: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PackResponse {
    pub pack_id: String,
    pub title: String,
    pub prompts: Vec<Prompt>,
}

async fn generate_pack(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<GeneratePackRequest>,
) -> Result<Json<PackResponse>, ApiError> {
    if !state.generate_limiter.check(&addr.ip().to_string()).await {
        return Err(ApiError::RateLimited);
    }

    let engine = state
        .engine
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("No LLM provider configured".to_string()))?;

    let num_prompts = request.num_prompts.unwrap_or(DEFAULT_NUM_PROMPTS);
    if !(MIN_PROMPTS as u32..=MAX_PROMPTS).contains(&num_prompts) {
        return Err(ApiError::BadRequest(format!(
            "num_prompts must be between {} and {}",
            MIN_PROMPTS, MAX_PROMPTS
        )));
    }

    let custom_theme = match request.custom_theme {
        Some(raw) => {
            if looks_like_injection(&raw) {
                return Err(ApiError::BadRequest(
                    "Theme contains disallowed content".to_string(),
                ));
            }
            let theme = clean_text(&raw);
            if theme.is_empty() || theme.chars().count() > MAX_PROMPT_LENGTH {
                return Err(ApiError::BadRequest("Invalid custom theme".to_string()));
            }
            Some(theme)
        }
        None => None,
    };

    let vibe = Vibe::parse(&request.vibe, custom_theme)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown vibe '{}'", request.vibe)))?;

    let pack = engine
        .generate(&PackRequest {
            vibe,
            num_prompts,
            timeout: state.llm_config.default_timeout,
        })
        .await
        .map_err(|e| {
            tracing::error!("Pack generation failed: {}", e);
            ApiError::Unavailable("Pack generation failed, try again".to_string())
        })?;

    let pack_id = ulid::Ulid::new().to_string();
    state.store_pack(pack_id.clone(), pack.clone()).await;
    tracing::info!("Generated pack {} ({} prompts)", pack_id, pack.prompts.len());

    Ok(Json(PackResponse {
        pack_id,
        title: pack.title,
        prompts: pack.prompts,
    }))
}

async fn get_pack(
    State(state): State<Arc<AppState>>,
    Path(pack_id): Path<String>,
) -> Result<Json<PackResponse>, ApiError> {
    let pack = state
        .get_pack(&pack_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Pack '{}' not found", pack_id)))?;
    Ok(Json(PackResponse {
        pack_id,
        title: pack.title,
        prompts: pack.prompts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePackRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub prompts: Vec<Prompt>,
}

async fn update_pack(
    State(state): State<Arc<AppState>>,
    Path(pack_id): Path<String>,
    Json(request): Json<UpdatePackRequest>,
) -> Result<Json<PackResponse>, ApiError> {
    let mut existing = state
        .get_pack(&pack_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Pack '{}' not found", pack_id)))?;

    let prompts = validate_prompts(request.prompts)?;
    existing.prompts = prompts;
    if let Some(title) = request.title {
        let title = clean_text(&title);
        if !title.is_empty() {
            existing.title = title;
        }
    }

    state.store_pack(pack_id.clone(), existing.clone()).await;
    Ok(Json(PackResponse {
        pack_id,
        title: existing.title,
        prompts: existing.prompts,
    }))
}

async fn delete_prompt(
    State(state): State<Arc<AppState>>,
    Path((pack_id, prompt_id)): Path<(String, u32)>,
) -> Result<Json<PackResponse>, ApiError> {
    let mut pack = state
        .get_pack(&pack_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Pack '{}' not found", pack_id)))?;

    if !pack.prompts.iter().any(|p| p.id == prompt_id) {
        return Err(ApiError::NotFound(format!(
            "Prompt {} not in pack '{}'",
            prompt_id, pack_id
        )));
    }
    if pack.prompts.len() <= MIN_PROMPTS {
        return Err(ApiError::BadRequest(format!(
            "A pack needs at least {} prompts",
            MIN_PROMPTS
        )));
    }

    pack.prompts.retain(|p| p.id != prompt_id);
    state.store_pack(pack_id.clone(), pack.clone()).await;
    Ok(Json(PackResponse {
        pack_id,
        title: pack.title,
        prompts: pack.prompts,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub pack_id: Option<String>,
    /// Inline prompts, used when no pack_id is given.
    #[serde(default)]
    pub prompts: Option<Vec<Prompt>>,
    #[serde(default)]
    pub timer_seconds: Option<u32>,
    #[serde(default)]
    pub show_votes: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room_code: String,
    pub organizer_token: String,
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let prompts = match (&request.pack_id, request.prompts) {
        (Some(pack_id), _) => {
            state
                .get_pack(pack_id)
                .await
                .ok_or_else(|| ApiError::NotFound(format!("Pack '{}' not found", pack_id)))?
                .prompts
        }
        (None, Some(prompts)) => validate_prompts(prompts)?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Either pack_id or prompts is required".to_string(),
            ))
        }
    };

    let timer_seconds = request.timer_seconds.unwrap_or(DEFAULT_TIMER_SECONDS);
    if !(MIN_TIMER_SECONDS..=MAX_TIMER_SECONDS).contains(&timer_seconds) {
        return Err(ApiError::BadRequest(format!(
            "timer_seconds must be between {} and {}",
            MIN_TIMER_SECONDS, MAX_TIMER_SECONDS
        )));
    }

    let organizer_token = generate_token();
    let room = state
        .registry
        .create_room(
            prompts,
            timer_seconds,
            request.show_votes.unwrap_or(false),
            organizer_token.clone(),
        )
        .await?;

    Ok(Json(CreateRoomResponse {
        room_code: room.room_code.clone(),
        organizer_token,
    }))
}

/// Sanitize an incoming prompt list and enforce the count/length bounds.
fn validate_prompts(prompts: Vec<Prompt>) -> Result<Vec<Prompt>, ApiError> {
    let mut cleaned = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let text = clean_text(&prompt.text);
        if text.is_empty() || text.chars().count() > MAX_PROMPT_LENGTH {
            return Err(ApiError::BadRequest(format!(
                "Prompt {} text must be 1-{} characters",
                prompt.id, MAX_PROMPT_LENGTH
            )));
        }
        cleaned.push(Prompt {
            id: cleaned.len() as u32 + 1,
            text,
        });
    }
    if cleaned.len() < MIN_PROMPTS || cleaned.len() > MAX_PROMPTS as usize {
        return Err(ApiError::BadRequest(format!(
            "A game needs between {} and {} prompts",
            MIN_PROMPTS, MAX_PROMPTS
        )));
    }
    Ok(cleaned)
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ORGANIZER_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::config::Config;
    use crate::llm::LlmConfig;
    use crate::types::PromptPack;

    fn prompts(n: u32) -> Vec<Prompt> {
        (1..=n)
            .map(|id| Prompt {
                id,
                text: format!("Who is most likely to win round {}", id),
            })
            .collect()
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(Config::default(), LlmConfig::default()))
    }

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), ORGANIZER_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_validate_prompts_renumbers_and_sanitizes() {
        let mut input = prompts(3);
        input[1].text = "<i>Who is most likely to dance on tables</i>".into();
        input[2].id = 99;

        let validated = validate_prompts(input).unwrap();
        let ids: Vec<u32> = validated.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(validated[1].text, "Who is most likely to dance on tables");
    }

    #[test]
    fn test_validate_prompts_count_bounds() {
        assert!(validate_prompts(prompts(2)).is_err());
        assert!(validate_prompts(prompts(3)).is_ok());
        assert!(validate_prompts(prompts(MAX_PROMPTS)).is_ok());
        assert!(validate_prompts(prompts(MAX_PROMPTS + 1)).is_err());
    }

    #[tokio::test]
    async fn test_create_room_validates_timer() {
        let state = test_state();
        let result = create_room(
            State(state),
            Json(CreateRoomRequest {
                pack_id: None,
                prompts: Some(prompts(3)),
                timer_seconds: Some(5),
                show_votes: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_create_room_from_inline_prompts() {
        let state = test_state();
        let Json(response) = create_room(
            State(Arc::clone(&state)),
            Json(CreateRoomRequest {
                pack_id: None,
                prompts: Some(prompts(3)),
                timer_seconds: None,
                show_votes: Some(true),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.room_code.len(), 6);
        assert!(state.registry.get(&response.room_code).await.is_some());
    }

    #[tokio::test]
    async fn test_create_room_unknown_pack() {
        let state = test_state();
        let result = create_room(
            State(state),
            Json(CreateRoomRequest {
                pack_id: Some("nope".into()),
                prompts: None,
                timer_seconds: None,
                show_votes: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_prompt_respects_floor() {
        let state = test_state();
        state
            .store_pack(
                "p1".into(),
                PromptPack {
                    title: "T".into(),
                    prompts: prompts(3),
                },
            )
            .await;

        let result = delete_prompt(State(Arc::clone(&state)), Path(("p1".into(), 1))).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));

        state
            .store_pack(
                "p2".into(),
                PromptPack {
                    title: "T".into(),
                    prompts: prompts(4),
                },
            )
            .await;
        let Json(response) = delete_prompt(State(state), Path(("p2".into(), 2)))
            .await
            .unwrap();
        assert_eq!(response.prompts.len(), 3);
        assert!(!response.prompts.iter().any(|p| p.text.contains("round 2")));
    }

    #[tokio::test]
    async fn test_update_pack_replaces_prompts() {
        let state = test_state();
        state
            .store_pack(
                "p1".into(),
                PromptPack {
                    title: "Old".into(),
                    prompts: prompts(3),
                },
            )
            .await;

        let Json(response) = update_pack(
            State(Arc::clone(&state)),
            Path("p1".into()),
            Json(UpdatePackRequest {
                title: Some("New Title".into()),
                prompts: prompts(5),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.title, "New Title");
        assert_eq!(response.prompts.len(), 5);
    }
}
