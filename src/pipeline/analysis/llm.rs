use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::AnalysisError;
use crate::config::LlmConfig;

/// Azure OpenAI chat-completions client.
///
/// Holds configuration only; the blocking HTTP client is built per call so
/// the value can be created and dropped inside the async runtime.
pub struct AzureOpenAiClient {
    config: LlmConfig,
}

impl AzureOpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    /// Default deployment to pass as `model` to `generate`.
    pub fn deployment(&self) -> &str {
        &self.config.deployment
    }

    fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint, deployment, self.config.api_version
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
        }
    }
}

/// Request body for `/chat/completions`
#[derive(Serialize)]
struct ChatCompletionRequest {
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Response body from `/chat/completions`
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Content of the first choice; missing or blank content is an error.
fn extract_content(response: ChatCompletionResponse) -> Result<String, AnalysisError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(AnalysisError::EmptyCompletion)
}

impl LlmClient for AzureOpenAiClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, AnalysisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::HttpClient(e.to_string()))?;

        let body = ChatCompletionRequest {
            messages: vec![ChatMessage::new("system", system), ChatMessage::new("user", prompt)],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = client
            .post(self.completions_url(model))
            .header("api-key", &self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    AnalysisError::LlmConnection(self.config.endpoint.clone())
                } else if e.is_timeout() {
                    AnalysisError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    AnalysisError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::LlmError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| AnalysisError::ResponseParsing(e.to_string()))?;

        extract_content(parsed)
    }
}

/// Mock LLM client for testing: replays scripted results, then repeats the
/// fallback response.
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Result<String, AnalysisError>>>,
    response: String,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Results returned, in order, before the fixed response.
    pub fn with_script(self, script: Vec<Result<String, AnalysisError>>) -> Self {
        Self {
            scripted: Mutex::new(script.into()),
            ..self
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = match self.scripted.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Ok(self.response.clone()))
    }
}
