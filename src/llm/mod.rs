//! LLM-backed prompt pack generation.
//!
//! Providers implement [`PromptProvider`]; the [`PromptEngine`] picks one,
//! retries transient failures, and validates/sanitizes whatever comes back
//! before it reaches a room.

mod ollama;
mod openai;

use crate::config::{MAX_PROMPT_LENGTH, MIN_PROMPTS};
use crate::sanitize::clean_text;
use crate::types::{Prompt, PromptPack};
use async_trait::async_trait;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),

    #[error("Generated pack failed validation: {0}")]
    InvalidPack(String),
}

/// The mood of a generated pack. `Custom` carries a free-text theme that has
/// already been screened for prompt injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vibe {
    Party,
    Spicy,
    Wholesome,
    Work,
    Custom(String),
}

impl Vibe {
    pub fn parse(vibe: &str, custom_theme: Option<String>) -> Option<Self> {
        match vibe {
            "party" => Some(Self::Party),
            "spicy" => Some(Self::Spicy),
            "wholesome" => Some(Self::Wholesome),
            "work" => Some(Self::Work),
            "custom" => custom_theme.map(Self::Custom),
            _ => None,
        }
    }

    fn description(&self) -> String {
        match self {
            Self::Party => "fun, lighthearted party questions about embarrassing moments, \
                wild nights out, and silly habits"
                .to_string(),
            Self::Spicy => "bold, cheeky questions about dating, flirting, and guilty \
                pleasures (keep it playful, nothing explicit)"
                .to_string(),
            Self::Wholesome => "warm, feel-good questions about kindness, friendship, and \
                endearing quirks"
                .to_string(),
            Self::Work => "office-safe questions about work habits, meetings, and \
                coworker quirks"
                .to_string(),
            Self::Custom(theme) => format!("questions themed around: {}", theme),
        }
    }
}

/// What the engine asks a provider for.
#[derive(Debug, Clone)]
pub struct PackRequest {
    pub vibe: Vibe,
    pub num_prompts: u32,
    pub timeout: Duration,
}

impl PackRequest {
    fn system_prompt(&self) -> String {
        format!(
            "You generate question packs for a party game. Every question must start \
             with \"Who is most likely to\" and describe a single concrete scenario. \
             Questions must be short (under 15 words), funny, and answerable about any \
             person in a group of friends. Never mention specific names, brands, or \
             anything hateful.\n\n\
             Generate exactly {count} questions with this vibe: {vibe}.\n\n\
             Respond with ONLY a JSON object, no other text:\n\
             {{\"title\": \"<short pack title>\", \"prompts\": \
             [{{\"id\": 1, \"text\": \"Who is most likely to ...\"}}, ...]}}",
            count = self.num_prompts,
            vibe = self.vibe.description(),
        )
    }
}

/// Trait that all pack providers implement.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    /// Generate one pack for the given request.
    async fn generate_pack(&self, request: &PackRequest) -> LlmResult<PromptPack>;

    /// Stable provider id ("openai", "ollama").
    fn id(&self) -> &str;

    /// Model name, for the providers listing.
    fn model(&self) -> &str;

    /// Cheap reachability probe.
    async fn is_available(&self) -> bool;
}

/// Picks a provider and retries transient failures with backoff. Validation
/// failures count as retryable; the model often gets it right the second time.
pub struct PromptEngine {
    providers: Vec<Box<dyn PromptProvider>>,
    max_retries: u32,
}

impl PromptEngine {
    pub fn new(providers: Vec<Box<dyn PromptProvider>>) -> Self {
        Self {
            providers,
            max_retries: 3,
        }
    }

    /// (id, model, reachable) for every configured provider.
    pub async fn provider_status(&self) -> Vec<(String, String, bool)> {
        let probes = self.providers.iter().map(|p| async move {
            (p.id().to_string(), p.model().to_string(), p.is_available().await)
        });
        futures::future::join_all(probes).await
    }

    pub async fn generate(&self, request: &PackRequest) -> LlmResult<PromptPack> {
        let provider = self
            .providers
            .first()
            .ok_or_else(|| LlmError::ConfigError("No LLM providers configured".to_string()))?;

        let mut last_error = LlmError::ApiError("no attempts made".to_string());
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }
            match provider.generate_pack(request).await {
                Ok(pack) => match validate_pack(pack, request.num_prompts) {
                    Ok(pack) => return Ok(pack),
                    Err(e) => {
                        tracing::warn!(
                            "Pack from {} failed validation (attempt {}): {}",
                            provider.id(),
                            attempt + 1,
                            e
                        );
                        last_error = e;
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        "Provider {} failed (attempt {}): {}",
                        provider.id(),
                        attempt + 1,
                        e
                    );
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// Sanitize and validate a generated pack. Prompts get sequential ids
/// regardless of what the model emitted.
fn validate_pack(pack: PromptPack, expected: u32) -> LlmResult<PromptPack> {
    let title = clean_text(&pack.title);
    let title = if title.is_empty() {
        "Generated Pack".to_string()
    } else {
        title
    };

    let mut prompts = Vec::with_capacity(pack.prompts.len());
    for prompt in pack.prompts {
        let text = clean_text(&prompt.text);
        if text.chars().count() < 10 || text.chars().count() > MAX_PROMPT_LENGTH {
            continue;
        }
        prompts.push(Prompt {
            id: prompts.len() as u32 + 1,
            text,
        });
    }

    if prompts.len() < MIN_PROMPTS {
        return Err(LlmError::InvalidPack(format!(
            "only {} usable prompts (need at least {})",
            prompts.len(),
            MIN_PROMPTS
        )));
    }
    prompts.truncate(expected as usize);
    Ok(PromptPack { title, prompts })
}

/// Strip markdown code fences that chat models love to wrap JSON in.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

fn parse_pack_json(text: &str) -> LlmResult<PromptPack> {
    serde_json::from_str(strip_code_fences(text)).map_err(|e| LlmError::ParseError(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_base_url: Option<String>,
    pub ollama_model: String,
    pub default_provider: String,
    pub default_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: Some("http://localhost:11434".to_string()),
            ollama_model: "llama3.2".to_string(),
            default_provider: "openai".to_string(),
            default_timeout: Duration::from_secs(30),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let openai_model = std::env::var("OPENAI_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        let ollama_base_url = match std::env::var("OLLAMA_BASE_URL") {
            Ok(url) => {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => Some("http://localhost:11434".to_string()),
        };

        let ollama_model = std::env::var("OLLAMA_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "llama3.2".to_string());

        Self {
            openai_api_key,
            openai_model,
            ollama_base_url,
            ollama_model,
            default_provider: std::env::var("DEFAULT_PROVIDER")
                .unwrap_or_else(|_| "openai".to_string()),
            default_timeout: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
        }
    }

    /// Build an engine with the configured providers, preferred one first.
    /// Returns None when nothing is configured; the server then runs without
    /// pack generation.
    pub fn build_engine(&self) -> Option<PromptEngine> {
        let mut providers: Vec<Box<dyn PromptProvider>> = Vec::new();

        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }
        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )));
        }

        if providers.is_empty() {
            return None;
        }
        providers.sort_by_key(|p| p.id() != self.default_provider);
        Some(PromptEngine::new(providers))
    }
}
