//! Generation engine backed by a text-generation server's `/generate` route.

use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Completion, GenerationEngine, SamplingParams};
use crate::error::{GateError, GateResult};

#[derive(Debug, Serialize)]
struct GenerateParameters {
    temperature: f32,
    top_p: f32,
    max_new_tokens: usize,
    do_sample: bool,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generated_text: String,
}

/// HTTP client for a running text-generation server.
#[derive(Debug, Clone)]
pub struct HttpGenerationEngine {
    client: Client,
    base_url: String,
}

impl HttpGenerationEngine {
    pub fn new(base_url: &str) -> GateResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(300))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> GateResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GateError::Generation(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpGenerationEngine {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn generate_url(&self) -> String {
        format!("{}/generate", self.base_url)
    }

    async fn generate_one(&self, prompt: &str, params: &SamplingParams) -> GateResult<Completion> {
        let body = GenerateRequest {
            inputs: prompt,
            parameters: GenerateParameters {
                temperature: params.temperature,
                top_p: params.top_p,
                max_new_tokens: params.max_new_tokens,
                do_sample: true,
            },
        };

        let response = self
            .client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| GateError::Generation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GateError::Generation(format!(
                "server returned {}: {}",
                status, text
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GateError::Generation(format!("invalid response body: {}", e)))?;
        debug!("Generated {} chars for prompt {:?}", reply.generated_text.len(), prompt);

        Ok(Completion {
            prompt: prompt.to_string(),
            text: reply.generated_text,
        })
    }
}

impl GenerationEngine for HttpGenerationEngine {
    async fn generate(
        &self,
        prompts: &[String],
        params: &SamplingParams,
    ) -> GateResult<Vec<Completion>> {
        try_join_all(prompts.iter().map(|p| self.generate_one(p, params))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_url_trims_slash() {
        let engine = HttpGenerationEngine::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(engine.generate_url(), "http://127.0.0.1:8080/generate");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            inputs: "Hello",
            parameters: GenerateParameters {
                temperature: 0.5,
                top_p: 0.9,
                max_new_tokens: 8,
                do_sample: true,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["inputs"], "Hello");
        assert_eq!(json["parameters"]["max_new_tokens"], 8);
        assert_eq!(json["parameters"]["do_sample"], true);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_generation_error() {
        let timeout = Duration::from_secs(2);
        let engine = HttpGenerationEngine::with_timeout("http://127.0.0.1:9", timeout).unwrap();
        let err = engine
            .generate(&["hi".to_string()], &SamplingParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Generation(_)));
    }
}
