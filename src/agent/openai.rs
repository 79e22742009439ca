use super::*;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use std::time::Instant;

/// Backend for any OpenAI-compatible chat completions endpoint
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

/// Accept either the API base (`http://host/v1`) or the full endpoint
/// (`http://host/v1/chat/completions`) and return the API base.
pub fn api_base_from_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/chat/completions")
        .unwrap_or(trimmed)
        .to_string()
}

impl OpenAiProvider {
    pub fn new(url: &str, api_key: Option<String>, model: String) -> Self {
        let mut config = OpenAIConfig::new().with_api_base(api_base_from_url(url));
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        let client = Client::with_config(config);

        Self { client, model }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
        let start = Instant::now();

        let user_message = ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(request.prompt),
            name: None,
        };

        let mut req_builder = CreateChatCompletionRequestArgs::default();
        req_builder.model(&self.model).messages([user_message.into()]);
        if let Some(max_tokens) = request.max_tokens {
            req_builder.max_tokens(max_tokens);
        }

        let chat_request = req_builder
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let response =
            tokio::time::timeout(request.timeout, self.client.chat().create(chat_request))
                .await
                .map_err(|_| LlmError::Timeout(request.timeout))?
                .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::ParseError("No content in response".to_string()))?;

        Ok(GenerateResponse {
            text: text.trim().to_string(),
            metadata: ResponseMetadata {
                provider: "openai".to_string(),
                model: self.model.clone(),
                tokens_used: response.usage.map(|u| u.total_tokens),
                latency_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_from_full_endpoint() {
        assert_eq!(
            api_base_from_url("http://10.0.0.5:8000/v1/chat/completions"),
            "http://10.0.0.5:8000/v1"
        );
        assert_eq!(
            api_base_from_url("http://10.0.0.5:8000/v1/chat/completions/"),
            "http://10.0.0.5:8000/v1"
        );
        assert_eq!(
            api_base_from_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
    }

    #[tokio::test]
    #[ignore] // Only run against a live endpoint
    async fn test_openai_generate() {
        let url = std::env::var("AGENT_TEST_URL").expect("AGENT_TEST_URL not set");
        let provider = OpenAiProvider::new(
            &url,
            std::env::var("OPENAI_API_KEY").ok(),
            "gpt-4o-mini".to_string(),
        );

        let response = provider
            .generate(GenerateRequest {
                prompt: "Name one opening move in go as JSON {\"move\": [x, y]}".to_string(),
                max_tokens: Some(100),
                timeout: Duration::from_secs(30),
            })
            .await
            .unwrap();

        assert!(!response.text.is_empty());
        assert_eq!(response.metadata.provider, "openai");
    }
}
