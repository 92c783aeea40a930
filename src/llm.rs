//! Generative model backends.
//!
//! A [`GenerativeModel`] turns a fully rendered prompt into answer text.
//! It sees nothing but the prompt: retrieval, context assembly and the
//! answer timeout all live in [`crate::answer`].
//!
//! | Config `llm.provider` | Backend | Credentials |
//! |-----------------------|---------|-------------|
//! | `gemini` | Google Generative Language API | `GOOGLE_API_KEY` |
//! | `openai` | OpenAI-compatible chat completions | `OPENAI_API_KEY` |
//! | `ollama` | Local Ollama `/api/generate` | none |
//! | `mock`   | [`MockModel`], scripted replies | none |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{CompanionError, Result};
use crate::retry::{send_with_retry, RetryPolicy};

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Provider name used in logs and error messages.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the model named by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn GenerativeModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiModel::new(
            config,
            std::env::var("GOOGLE_API_KEY").ok(),
        )?)),
        "openai" => Ok(Arc::new(OpenAIModel::new(
            config,
            std::env::var("OPENAI_API_KEY").ok(),
        )?)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        "mock" => Ok(Arc::new(MockModel::default())),
        other => Err(CompanionError::Config(format!("Unknown llm provider: {other}"))),
    }
}

/// Hosted backends check their key when a prompt is sent, not at startup.
fn require_key<'a>(key: &'a Option<String>, var: &str) -> Result<&'a str> {
    key.as_deref()
        .ok_or_else(|| CompanionError::Config(format!("{var} environment variable not set")))
}

// Per-request timeout is left to the caller's overall answer timeout; the
// client bound only guards against a dead socket.
fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.saturating_add(5)))
        .build()
        .map_err(|e| CompanionError::Config(format!("failed to build HTTP client: {e}")))
}

fn invalid_response(provider: &str, err: impl std::fmt::Display) -> CompanionError {
    CompanionError::provider(provider, format!("invalid response: {err}"), false)
}

// ============ Gemini ============

pub struct GeminiModel {
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            api_key,
            temperature: config.temperature,
            client: http_client(config)?,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPartOut<'a>>,
}

#[derive(Serialize)]
struct GeminiPartOut<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPartIn>,
}

#[derive(Deserialize)]
struct GeminiPartIn {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = require_key(&self.api_key, "GOOGLE_API_KEY")?;
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPartOut { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
            },
        };
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = send_with_retry("gemini", self.retry, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
        })
        .await?;

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| invalid_response("gemini", e))?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .ok_or_else(|| invalid_response("gemini", "no candidates returned"))?;
        Ok(text)
    }
}

// ============ OpenAI ============

pub struct OpenAIModel {
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAIModel {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            temperature: config.temperature,
            client: http_client(config)?,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageOut<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessageOut<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageIn,
}

#[derive(Deserialize)]
struct ChatMessageIn {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerativeModel for OpenAIModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = require_key(&self.api_key, "OPENAI_API_KEY")?;
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessageOut {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = send_with_retry("openai", self.retry, || {
            self.client
                .post(&url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
        })
        .await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| invalid_response("openai", e))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| invalid_response("openai", "no choices returned"))
    }
}

// ============ Ollama ============

pub struct OllamaModel {
    model: String,
    url: String,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            client: http_client(config)?,
            retry: RetryPolicy::new(config.max_retries),
        })
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl GenerativeModel for OllamaModel {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };
        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));

        let response = send_with_retry("ollama", self.retry, || {
            self.client.post(&url).json(&body).send()
        })
        .await?;

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| invalid_response("ollama", e))?;
        Ok(parsed.response)
    }
}

// ============ Mock ============

/// Scripted model for tests and offline runs.
///
/// Replies are popped in order; once the script is exhausted every call
/// returns the default reply. Each prompt is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockModel {
    replies: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    fail_with: Option<String>,
}

const MOCK_DEFAULT_REPLY: &str = "mock answer";

impl MockModel {
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    /// Sleep before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with a non-retryable provider error.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(CompanionError::provider("mock", message.clone(), false));
        }
        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front());
        Ok(next.unwrap_or_else(|| MOCK_DEFAULT_REPLY.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::tests::{http_response, spawn_mock_server};

    fn config(provider: &str, url: String) -> LlmConfig {
        LlmConfig {
            provider: provider.into(),
            url: Some(url),
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn mock_pops_replies_then_falls_back() {
        let model = MockModel::with_replies(["first", "second"]);
        assert_eq!(model.generate("a").await.unwrap(), "first");
        assert_eq!(model.generate("b").await.unwrap(), "second");
        assert_eq!(model.generate("c").await.unwrap(), MOCK_DEFAULT_REPLY);
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn mock_failure_is_provider_error() {
        let model = MockModel::default().failing("quota exceeded");
        let err = model.generate("x").await.unwrap_err();
        assert!(matches!(err, CompanionError::Provider { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn gemini_joins_candidate_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello "},{"text":"world"}]}}]}"#;
        let url = spawn_mock_server(vec![http_response("200 OK", body)]).await;
        let model = GeminiModel::new(&config("gemini", url), Some("key".into())).unwrap();
        assert_eq!(model.generate("hi").await.unwrap(), "Hello world");
    }

    #[tokio::test]
    async fn gemini_without_candidates_is_error() {
        let url = spawn_mock_server(vec![http_response("200 OK", r#"{"candidates":[]}"#)]).await;
        let model = GeminiModel::new(&config("gemini", url), Some("key".into())).unwrap();
        assert!(model.generate("hi").await.is_err());
    }

    #[tokio::test]
    async fn openai_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"It parses TOML."}}]}"#;
        let url = spawn_mock_server(vec![http_response("200 OK", body)]).await;
        let model = OpenAIModel::new(&config("openai", url), Some("sk".into())).unwrap();
        assert_eq!(model.generate("q").await.unwrap(), "It parses TOML.");
    }

    #[tokio::test]
    async fn ollama_generate() {
        let body = r#"{"model":"llama3","response":"local answer","done":true}"#;
        let url = spawn_mock_server(vec![http_response("200 OK", body)]).await;
        let model = OllamaModel::new(&config("ollama", url)).unwrap();
        assert_eq!(model.generate("q").await.unwrap(), "local answer");
    }

    #[tokio::test]
    async fn unauthorized_is_not_retryable() {
        let url = spawn_mock_server(vec![http_response("401 Unauthorized", "bad key")]).await;
        let model = OpenAIModel::new(&config("openai", url), Some("sk".into())).unwrap();
        let err = model.generate("q").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_key_fails_at_generate_time() {
        let model = GeminiModel::new(&config("gemini", "http://127.0.0.1:9".into()), None).unwrap();
        let err = model.generate("q").await.unwrap_err();
        assert!(matches!(err, CompanionError::Config(_)));
        assert!(err.to_string().contains("GOOGLE_API_KEY"));

        let model = OpenAIModel::new(&config("openai", "http://127.0.0.1:9".into()), None).unwrap();
        let err = model.generate("q").await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn hosted_models_build_without_keys() {
        assert_eq!(create_model(&LlmConfig::default()).unwrap().name(), "gemini");
        let cfg = LlmConfig {
            provider: "openai".into(),
            ..LlmConfig::default()
        };
        assert_eq!(create_model(&cfg).unwrap().name(), "openai");
    }

    #[test]
    fn create_mock_and_unknown() {
        let cfg = LlmConfig {
            provider: "mock".into(),
            ..LlmConfig::default()
        };
        assert_eq!(create_model(&cfg).unwrap().name(), "mock");

        let cfg = LlmConfig {
            provider: "claude-on-a-toaster".into(),
            ..LlmConfig::default()
        };
        assert!(create_model(&cfg).is_err());
    }
}
