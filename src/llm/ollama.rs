use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama provider, talking to a local instance over its generate API.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");

        Self {
            base_url,
            model,
            client,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    /// Constrains the model to emit valid JSON.
    format: String,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl PromptProvider for OllamaProvider {
    async fn generate_pack(&self, request: &PackRequest) -> LlmResult<PromptPack> {
        let ollama_request = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: request.system_prompt(),
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = tokio::time::timeout(
            request.timeout,
            self.client.post(&url).json(&ollama_request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(request.timeout))?
        .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ApiError(format!(
                "Ollama API returned status: {}",
                response.status()
            )));
        }

        let ollama_response: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        parse_pack_json(&ollama_response.response)
    }

    fn id(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .client
            .get(&self.base_url)
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        matches!(probe, Ok(resp) if resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Only run with Ollama running locally
    async fn test_ollama_generate_pack() {
        let provider =
            OllamaProvider::new("http://localhost:11434".to_string(), "llama3.2".to_string());

        let request = PackRequest {
            vibe: Vibe::Party,
            num_prompts: 5,
            timeout: Duration::from_secs(60),
        };

        let pack = provider.generate_pack(&request).await.unwrap();
        assert!(!pack.prompts.is_empty());
        println!("Generated pack: {:?}", pack);
    }
}
