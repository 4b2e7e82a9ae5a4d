//! Process-wide shared state handed to every handler.

use crate::abuse::RateLimiter;
use crate::config::{Config, MAX_PACKS, PACK_TTL, RATE_LIMIT_MAX, RATE_LIMIT_WINDOW};
use crate::llm::{LlmConfig, PromptEngine};
use crate::registry::SessionRegistry;
use crate::types::PromptPack;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// A generated pack waiting to be used by a room, evicted after [`PACK_TTL`].
#[derive(Debug, Clone)]
pub struct StoredPack {
    pub pack: PromptPack,
    pub created_at: Instant,
}

pub struct AppState {
    pub config: Config,
    pub registry: Arc<SessionRegistry>,
    pub packs: RwLock<HashMap<String, StoredPack>>,
    /// None when no provider is configured; pack generation then 503s.
    pub engine: Option<PromptEngine>,
    pub llm_config: LlmConfig,
    pub generate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, llm_config: LlmConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.room_ttl));
        let engine = llm_config.build_engine();
        Self {
            config,
            registry,
            packs: RwLock::new(HashMap::new()),
            engine,
            llm_config,
            generate_limiter: RateLimiter::new(RATE_LIMIT_MAX, RATE_LIMIT_WINDOW),
        }
    }

    /// Insert a pack, evicting expired packs first and oldest packs beyond
    /// the cap.
    pub async fn store_pack(&self, pack_id: String, pack: PromptPack) {
        let mut packs = self.packs.write().await;
        packs.retain(|_, stored| stored.created_at.elapsed() < PACK_TTL);
        while packs.len() >= MAX_PACKS {
            let oldest = packs
                .iter()
                .min_by_key(|(_, stored)| stored.created_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    packs.remove(&id);
                }
                None => break,
            }
        }
        packs.insert(
            pack_id,
            StoredPack {
                pack,
                created_at: Instant::now(),
            },
        );
    }

    pub async fn get_pack(&self, pack_id: &str) -> Option<PromptPack> {
        let packs = self.packs.read().await;
        packs
            .get(pack_id)
            .filter(|stored| stored.created_at.elapsed() < PACK_TTL)
            .map(|stored| stored.pack.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Prompt;

    fn pack(title: &str) -> PromptPack {
        PromptPack {
            title: title.into(),
            prompts: vec![
                Prompt { id: 1, text: "Who is most likely to sleep in".into() },
                Prompt { id: 2, text: "Who is most likely to go viral".into() },
                Prompt { id: 3, text: "Who is most likely to forget a birthday".into() },
            ],
        }
    }

    #[tokio::test]
    async fn test_store_and_get_pack() {
        let state = AppState::new(Config::default(), LlmConfig::default());
        state.store_pack("p1".into(), pack("Pack One")).await;

        let fetched = state.get_pack("p1").await.unwrap();
        assert_eq!(fetched.title, "Pack One");
        assert!(state.get_pack("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_pack_cap_evicts_oldest() {
        let state = AppState::new(Config::default(), LlmConfig::default());
        for i in 0..MAX_PACKS {
            state.store_pack(format!("p{}", i), pack("x")).await;
            // Distinct creation instants so "oldest" is well-defined
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        state.store_pack("newest".into(), pack("x")).await;

        let packs = state.packs.read().await;
        assert_eq!(packs.len(), MAX_PACKS);
        assert!(packs.contains_key("newest"));
        assert!(!packs.contains_key("p0"));
    }
}
