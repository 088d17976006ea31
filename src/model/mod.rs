use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::GeminiConfig;

/// Failure of a single generation attempt.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("request rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("response blocked: {0}")]
    Blocked(String),
    #[error("empty response")]
    Empty,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GenerateError {
    /// Timeouts, network failures, overloaded upstreams and empty output are
    /// worth another attempt. Anything the API refused outright is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerateError::Timeout
                | GenerateError::Transport(_)
                | GenerateError::Upstream { .. }
                | GenerateError::Empty
        )
    }
}

impl From<reqwest::Error> for GenerateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerateError::Timeout
        } else if err.is_decode() {
            GenerateError::Malformed(err.to_string())
        } else {
            GenerateError::Transport(err.to_string())
        }
    }
}

/// Anything that turns a prompt document into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Sampling settings sent with every request.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    // Short, lively answers; the persona asks for 1-2 sentences anyway.
    fn default() -> Self {
        Self {
            temperature: 0.9,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens: 200,
        }
    }
}

// A wrapper for the Gemini generateContent API
pub struct GeminiClient {
    api_key: String,
    model: String,
    api_base: String,
    settings: GenerationSettings,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, api_key: String) -> Self {
        info!("Using Gemini model {} at {}", config.model, config.api_base);

        Self {
            api_key,
            model: config.model.clone(),
            api_base: config.api_base.clone(),
            settings: GenerationSettings::default(),
            client: Client::new(),
        }
    }

    /// Returns `None` when no credential is configured.
    pub fn from_config(config: &GeminiConfig) -> Option<Self> {
        config.api_key.clone().map(|api_key| Self::new(config, api_key))
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, self.model)
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "contents": [
                { "role": "user", "parts": [{ "text": prompt }] }
            ],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topP": self.settings.top_p,
                "topK": self.settings.top_k,
                "maxOutputTokens": self.settings.max_output_tokens,
                "responseMimeType": "text/plain"
            }
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let payload = self.payload(prompt);
        debug!("Payload: {}", payload);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let response_json: Value = response.json().await?;
        debug!("Response JSON: {}", response_json);

        let text = extract_text(&response_json)?;
        info!("Response length: {} characters", text.len());
        Ok(text)
    }
}

/// 429 and 5xx are the upstream being busy; every other non-success status
/// is a definitive refusal (bad key, bad model name, bad request).
pub fn classify_status(status: StatusCode, body: String) -> GenerateError {
    let body = truncate(&body, 200);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GenerateError::Upstream {
            status: status.as_u16(),
            body,
        }
    } else {
        GenerateError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

/// Joins the text parts of the first candidate.
pub fn extract_text(response: &Value) -> Result<String, GenerateError> {
    if let Some(reason) = response
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(|reason| reason.as_str())
    {
        return Err(GenerateError::Blocked(reason.to_string()));
    }

    let candidate = match response.get("candidates").and_then(|candidates| candidates.get(0)) {
        Some(candidate) => candidate,
        None if response.get("candidates").is_some() => return Err(GenerateError::Empty),
        None => return Err(GenerateError::Malformed("missing candidates".to_string())),
    };

    let text: String = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.get("finishReason").and_then(|r| r.as_str()) {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                Err(GenerateError::Blocked(reason.to_string()))
            }
            _ => Err(GenerateError::Empty),
        };
    }

    Ok(text)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
