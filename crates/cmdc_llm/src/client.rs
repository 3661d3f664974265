//! Reasoning service adapter.
//!
//! Supports OpenAI-compatible chat completion APIs (DeepSeek, OpenAI) and
//! Anthropic, selected via environment variables. Each call is a single
//! HTTP attempt; retries are the caller's decision (see [`crate::RetryPolicy`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::prompts::{CONNECTION_CHECK_PROMPT, SYSTEM_PROMPT};
use crate::retry::RetryPolicy;

/// A prompt sent to the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }
}

/// Narrow contract to the external reasoning service.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Send one prompt and return the raw text answer.
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "reasoning-service"
    }
}

/// LLM provider type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Any endpoint speaking the OpenAI chat completions protocol
    OpenAiCompatible { base_url: String },
    Anthropic,
}

impl LlmProvider {
    pub const DEEPSEEK_BASE_URL: &'static str = "https://api.deepseek.com/v1";
    pub const OPENAI_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn deepseek() -> Self {
        Self::OpenAiCompatible {
            base_url: Self::DEEPSEEK_BASE_URL.to_string(),
        }
    }

    pub fn openai() -> Self {
        Self::OpenAiCompatible {
            base_url: Self::OPENAI_BASE_URL.to_string(),
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible { base_url } if base_url.contains("deepseek") => "deepseek-chat",
            Self::OpenAiCompatible { .. } => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }
}

/// Sampling options.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Adapter that performs the HTTP calls
pub struct LlmAdapter {
    provider: LlmProvider,
    api_key: String,
    model: String,
    options: LlmOptions,
    client: reqwest::Client,
}

impl LlmAdapter {
    /// Create a new adapter with explicit configuration
    pub fn new(provider: LlmProvider, api_key: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| provider.default_model().to_string());
        Self {
            provider,
            api_key,
            model,
            options: LlmOptions::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_options(mut self, options: LlmOptions) -> Self {
        self.options = options;
        self
    }

    /// Create an adapter from environment variables
    ///
    /// Checks in order:
    /// 1. DEEPSEEK_API_KEY
    /// 2. OPENAI_API_KEY
    /// 3. ANTHROPIC_API_KEY
    ///
    /// `CMDC_LLM_MODEL` overrides the model and `CMDC_LLM_BASE_URL` the
    /// endpoint of OpenAI-compatible providers.
    pub fn from_env() -> LlmResult<Self> {
        let custom_model = non_empty_env("CMDC_LLM_MODEL");
        let custom_base = non_empty_env("CMDC_LLM_BASE_URL");

        let with_base = |provider: LlmProvider| match (&provider, &custom_base) {
            (LlmProvider::OpenAiCompatible { .. }, Some(base_url)) => {
                LlmProvider::OpenAiCompatible {
                    base_url: base_url.clone(),
                }
            }
            _ => provider,
        };

        if let Some(api_key) = non_empty_env("DEEPSEEK_API_KEY") {
            return Ok(Self::new(with_base(LlmProvider::deepseek()), api_key, custom_model));
        }

        if let Some(api_key) = non_empty_env("OPENAI_API_KEY") {
            return Ok(Self::new(with_base(LlmProvider::openai()), api_key, custom_model));
        }

        if let Some(api_key) = non_empty_env("ANTHROPIC_API_KEY") {
            return Ok(Self::new(LlmProvider::Anthropic, api_key, custom_model));
        }

        Err(LlmError::NotConfigured)
    }

    /// Get the current provider
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Get the current model
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Verify credentials and reachability with a trivial prompt.
    ///
    /// Unlike regular calls this one exhausts every attempt of `policy`.
    pub async fn check_connection(&self, policy: &RetryPolicy) -> LlmResult<()> {
        let request = CompletionRequest::new(CONNECTION_CHECK_PROMPT)
            .with_system("Respond with \"Ready\"");
        let policy = policy.clone().exhaustive();
        policy.run(|| self.complete(&request)).await.map(|_| ())
    }

    // OpenAI-compatible chat completion
    async fn complete_openai(&self, base_url: &str, request: &CompletionRequest) -> LlmResult<String> {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    // Anthropic messages API
    async fn complete_anthropic(&self, request: &CompletionRequest) -> LlmResult<String> {
        let url = "https://api.anthropic.com/v1/messages";

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            system: Some(request.system.clone()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        result
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl ReasoningService for LlmAdapter {
    async fn complete(&self, request: &CompletionRequest) -> LlmResult<String> {
        debug!(model = %self.model, prompt_len = request.prompt.len(), "calling reasoning service");
        match &self.provider {
            LlmProvider::OpenAiCompatible { base_url } => self.complete_openai(base_url, request).await,
            LlmProvider::Anthropic => self.complete_anthropic(request).await,
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}
