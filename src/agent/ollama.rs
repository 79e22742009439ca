use super::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const GENERATE_PATH: &str = "/api/generate";

/// Agent backend talking to a local or remote Ollama server
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Accepts either the server root or the full generate URL
    pub fn new(url: &str, model: String, timeout: Duration) -> LlmResult<Self> {
        let root = url.trim().trim_end_matches('/');
        let root = root.strip_suffix(GENERATE_PATH).unwrap_or(root);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: format!("{}{}", root, GENERATE_PATH),
            model,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let started = Instant::now();
        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            stream: false,
            options: SamplingOptions {
                num_predict: request.max_tokens,
            },
        };

        let call = async {
            self.client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json::<GenerateReply>()
                .await
        };
        let reply = tokio::time::timeout(request.timeout, call)
            .await
            .map_err(|_| LlmError::Timeout(request.timeout))?
            .map_err(|e| {
                if e.is_decode() {
                    LlmError::ParseError(e.to_string())
                } else {
                    LlmError::ApiError(e.to_string())
                }
            })?;

        tracing::debug!(
            "Ollama {} replied in {:?} ({} chars)",
            self.model,
            started.elapsed(),
            reply.response.len()
        );

        Ok(GenerateResponse {
            text: reply.response.trim().to_string(),
            metadata: ResponseMetadata {
                provider: self.name().to_string(),
                model: self.model.clone(),
                tokens_used: reply.eval_count,
                latency_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(url: &str) -> OllamaProvider {
        OllamaProvider::new(url, "qwen2.5".to_string(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_from_server_root() {
        assert_eq!(
            provider("http://localhost:11434/").endpoint,
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn test_endpoint_from_full_url() {
        assert_eq!(
            provider("http://gpu-box:11434/api/generate").endpoint,
            "http://gpu-box:11434/api/generate"
        );
    }

    #[test]
    fn test_body_omits_unset_token_limit() {
        let body = GenerateBody {
            model: "m",
            prompt: "p",
            stream: false,
            options: SamplingOptions { num_predict: None },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert!(json["options"].get("num_predict").is_none());
    }

    #[tokio::test]
    #[ignore] // Only run with Ollama running locally
    async fn test_ollama_generate() {
        let response = provider("http://localhost:11434")
            .generate(GenerateRequest {
                prompt: "Reply with the JSON {\"move\": [3, 3]}".to_string(),
                max_tokens: Some(100),
                timeout: Duration::from_secs(30),
            })
            .await
            .unwrap();

        assert!(!response.text.is_empty());
        assert_eq!(response.metadata.provider, "ollama");
    }
}
