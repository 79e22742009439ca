mod ollama;
mod openai;
pub mod prompt;
pub mod reply;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{AgentEndpoint, Board, ChatRecord, MoveRecord, ProviderKind, Side};

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Rationale attached to a fallback move after a degraded consultation
pub const FALLBACK_RATIONALE: &str =
    "I ran into a problem working out my move, so I played a random open point this time.";

/// Rationale reported when the board has no open point left
pub const NO_MOVE_RATIONALE: &str = "There are no open points left on the board.";

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur while consulting a remote agent
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

    #[error("Illegal move ({x}, {y}): {reason}")]
    IllegalMove { x: i64, y: i64, reason: String },
}

/// Request to generate a completion
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    pub provider: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub latency_ms: u64,
}

/// A chat backend a remote agent talks to
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    fn name(&self) -> &str;
}

/// Read-only view handed to a move source
#[derive(Debug, Clone)]
pub struct MoveContext {
    pub board: Board,
    pub side: Side,
    pub moves: Vec<MoveRecord>,
    pub chat: Vec<ChatRecord>,
}

/// A coordinate chosen by a move source, with its explanation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveProposal {
    pub x: usize,
    pub y: usize,
    pub rationale: String,
}

/// The only failure a move source reports: nowhere left to play
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no move available: {rationale}")]
pub struct SourceUnavailable {
    pub rationale: String,
}

/// Automated producer of moves for one side.
///
/// Implementations must resolve in bounded time and must not fail for any reason
/// other than the board having no legal point left.
#[async_trait]
pub trait MoveSource: Send + Sync {
    async fn request_move(&self, ctx: &MoveContext) -> Result<MoveProposal, SourceUnavailable>;

    fn name(&self) -> &str;
}

/// Pick a uniformly random empty point, or report that none is left
pub fn fallback_move(board: &Board) -> Result<MoveProposal, SourceUnavailable> {
    let points = board.empty_points();
    match points.choose(&mut rand::rng()) {
        Some(&(x, y)) => Ok(MoveProposal {
            x,
            y,
            rationale: FALLBACK_RATIONALE.to_string(),
        }),
        None => Err(SourceUnavailable {
            rationale: NO_MOVE_RATIONALE.to_string(),
        }),
    }
}

/// Move source backed by a language model reached over the network
pub struct RemoteAgent {
    provider: Box<dyn LlmProvider>,
    timeout: Duration,
    max_tokens: u32,
}

impl RemoteAgent {
    pub fn new(provider: Box<dyn LlmProvider>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            provider,
            timeout,
            max_tokens,
        }
    }

    async fn consult(&self, ctx: &MoveContext) -> LlmResult<MoveProposal> {
        let request = GenerateRequest {
            prompt: prompt::build_prompt(ctx),
            max_tokens: Some(self.max_tokens),
            timeout: self.timeout,
        };
        tracing::debug!("Prompt for {}: {}", ctx.side.label(), request.prompt);

        let response = self.provider.generate(request).await?;
        tracing::info!(
            "Agent {} answered in {}ms",
            response.metadata.model,
            response.metadata.latency_ms
        );
        tracing::debug!("Agent reply: {}", response.text);

        reply::parse_move(&response.text, &ctx.board)
    }
}

#[async_trait]
impl MoveSource for RemoteAgent {
    async fn request_move(&self, ctx: &MoveContext) -> Result<MoveProposal, SourceUnavailable> {
        match self.consult(ctx).await {
            Ok(proposal) => {
                tracing::info!(
                    "Agent chose ({}, {}) for {}",
                    proposal.x,
                    proposal.y,
                    ctx.side.label()
                );
                Ok(proposal)
            }
            Err(e) => {
                tracing::warn!(
                    "Consultation with {} failed: {}. Falling back to a random point",
                    self.provider.name(),
                    e
                );
                fallback_move(&ctx.board)
            }
        }
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

/// Configuration for remote agents
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Bearer key sent to OpenAI-compatible endpoints
    pub openai_api_key: Option<String>,
    /// Model used when a session does not name one
    pub default_model: String,
    /// Upper bound on a single consultation
    pub timeout: Duration,
    pub max_tokens: u32,
    /// Pause before each chained automated turn
    pub move_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            default_model: "DeepSeek-R1".to_string(),
            timeout: Duration::from_secs(120),
            max_tokens: 8192,
            move_delay: Duration::from_millis(1000),
        }
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Parse a non-blank variable, warning when it is set but unusable
fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = non_blank_env(key)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring invalid {} {:?}, using the default", key, value);
            None
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            openai_api_key: non_blank_env("OPENAI_API_KEY"),
            default_model: non_blank_env("AGENT_DEFAULT_MODEL").unwrap_or(defaults.default_model),
            timeout: parsed_env("AGENT_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_tokens: parsed_env("AGENT_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            move_delay: parsed_env("AGENT_MOVE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.move_delay),
        }
    }

    /// Build the move source for one side
    pub fn build_source(&self, endpoint: &AgentEndpoint) -> LlmResult<Arc<dyn MoveSource>> {
        let url = endpoint.url.trim();
        if url.is_empty() {
            return Err(LlmError::ConfigError("Agent URL is empty".to_string()));
        }
        let model = if endpoint.model.trim().is_empty() {
            self.default_model.clone()
        } else {
            endpoint.model.trim().to_string()
        };

        let provider: Box<dyn LlmProvider> = match endpoint.provider {
            ProviderKind::OpenAi => Box::new(OpenAiProvider::new(
                url,
                self.openai_api_key.clone(),
                model,
            )),
            ProviderKind::Ollama => Box::new(OllamaProvider::new(url, model, self.timeout)?),
        };
        tracing::info!("Agent configured: {} at {}", provider.name(), url);

        Ok(Arc::new(RemoteAgent::new(
            provider,
            self.timeout,
            self.max_tokens,
        )))
    }
}
