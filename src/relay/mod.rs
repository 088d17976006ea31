pub mod fallback;
pub mod prompt;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

use crate::config::{RelayConfig, RetryPolicy};
use crate::model::{GeminiClient, GenerateError, TextGenerator};
use fallback::FallbackResponder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<Turn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Message is required")]
    InvalidRequest,
    #[error("AI service unavailable")]
    ServiceUnavailable(String),
    #[error("Internal server error")]
    Internal(String),
}

impl RelayError {
    pub fn details(&self) -> Option<&str> {
        match self {
            RelayError::InvalidRequest => None,
            RelayError::ServiceUnavailable(detail) | RelayError::Internal(detail) => Some(detail),
        }
    }
}

/// Turns one chat request into one reply. Holds no per-conversation state;
/// callers resend their history with every request.
pub struct ChatRelay {
    generator: Option<Arc<dyn TextGenerator>>,
    retry: RetryPolicy,
    history_window: usize,
    fallback_on_error: bool,
    fallback: FallbackResponder,
}

impl ChatRelay {
    pub fn new(config: &RelayConfig, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            generator,
            retry: config.retry.clone(),
            history_window: config.history_window,
            fallback_on_error: config.fallback_on_error,
            fallback: FallbackResponder,
        }
    }

    /// Wires up the Gemini client when a credential is present; otherwise
    /// the relay runs offline on canned replies.
    pub fn from_config(config: &RelayConfig) -> Self {
        let generator = GeminiClient::from_config(&config.gemini)
            .map(|client| Arc::new(client) as Arc<dyn TextGenerator>);
        if generator.is_none() {
            warn!("GEMINI_API_KEY not set, chat runs in offline mode");
        }
        Self::new(config, generator)
    }

    pub fn is_online(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn handle(
        &self,
        request: &ChatRequest,
        request_id: Uuid,
    ) -> Result<Reply, RelayError> {
        if request.message.trim().is_empty() {
            return Err(RelayError::InvalidRequest);
        }

        let Some(generator) = self.generator.as_deref() else {
            info!("[{}] Offline mode, answering from fallback pool", request_id);
            return Ok(self.fallback_reply(&request.message));
        };

        let prompt = prompt::build_prompt(&request.history, &request.message, self.history_window);
        debug!("[{}] Prompt: {}", request_id, prompt);

        match self.generate_with_retry(generator, &prompt, request_id).await {
            Ok(text) => Ok(Reply {
                text,
                source: ReplySource::Model,
            }),
            Err(err) if self.fallback_on_error => {
                warn!("[{}] Degrading to fallback reply after: {:?}", request_id, err);
                Ok(self.fallback_reply(&request.message))
            }
            Err(err) => Err(err),
        }
    }

    fn fallback_reply(&self, message: &str) -> Reply {
        Reply {
            text: self.fallback.respond(message).to_string(),
            source: ReplySource::Fallback,
        }
    }

    async fn generate_with_retry(
        &self,
        generator: &dyn TextGenerator,
        prompt: &str,
        request_id: Uuid,
    ) -> Result<String, RelayError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = GenerateError::Empty;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                sleep(self.retry.backoff).await;
            }
            info!("[{}] Generation attempt {}/{}", request_id, attempt, max_attempts);

            // Dropping the timed-out future drops its in-flight request.
            let call = AssertUnwindSafe(generator.generate(prompt)).catch_unwind();
            let err = match timeout(self.retry.timeout, call).await {
                Ok(Ok(Ok(text))) if !text.trim().is_empty() => return Ok(text.trim().to_string()),
                Ok(Ok(Ok(_))) => GenerateError::Empty,
                Ok(Ok(Err(err))) => err,
                Ok(Err(_panic)) => {
                    error!("[{}] Generator panicked on attempt {}", request_id, attempt);
                    return Err(RelayError::Internal("generator panicked".to_string()));
                }
                Err(_elapsed) => GenerateError::Timeout,
            };

            if !err.is_retryable() {
                error!("[{}] Generation rejected: {}", request_id, err);
                return Err(RelayError::ServiceUnavailable(err.to_string()));
            }

            warn!("[{}] Attempt {} failed: {}", request_id, attempt, err);
            last_error = err;
        }

        Err(RelayError::ServiceUnavailable(format!(
            "gave up after {} attempts: {}",
            max_attempts, last_error
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    enum Step {
        Reply(&'static str),
        Fail(fn() -> GenerateError),
        Hang,
        Panic,
    }

    struct ScriptedGenerator {
        steps: Vec<Step>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.steps.get(idx).unwrap_or(&Step::Hang) {
                Step::Reply(text) => Ok(text.to_string()),
                Step::Fail(make) => Err(make()),
                Step::Hang => std::future::pending().await,
                Step::Panic => panic!("boom"),
            }
        }
    }

    fn relay_with(generator: Option<Arc<ScriptedGenerator>>, config: RelayConfig) -> ChatRelay {
        ChatRelay::new(&config, generator.map(|g| g as Arc<dyn TextGenerator>))
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_calling_out() {
        let generator = ScriptedGenerator::new(vec![Step::Reply("never")]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        for message in ["", "   \n"] {
            let mut req = request(message);
            req.history = vec![Turn {
                speaker: Speaker::User,
                text: "earlier".into(),
            }];
            let err = relay.handle(&req, Uuid::new_v4()).await.unwrap_err();
            assert!(matches!(err, RelayError::InvalidRequest));
        }
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn offline_mode_uses_fallback_pools() {
        let relay = relay_with(None, RelayConfig::default());
        assert!(!relay.is_online());

        let reply = relay.handle(&request("hello"), Uuid::new_v4()).await.unwrap();
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(fallback::Pool::Greeting.lines().contains(&reply.text.as_str()));
    }

    #[tokio::test]
    async fn offline_relay_built_from_config_never_calls_out() {
        let relay = ChatRelay::from_config(&RelayConfig::default());
        assert!(!relay.is_online());
        let reply = relay.handle(&request("tell me a joke"), Uuid::new_v4()).await.unwrap();
        assert!(fallback::Pool::Joke.lines().contains(&reply.text.as_str()));
    }

    #[tokio::test]
    async fn missing_credential_opens_no_connection_even_with_api_base_set() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = RelayConfig::default();
        config.gemini.api_base = format!("http://{}", listener.local_addr().unwrap());
        config.gemini.api_key = None;

        let relay = ChatRelay::from_config(&config);
        for message in ["hello", "how are you", "tell me a joke", "luminatus?", "zzz"] {
            let reply = relay.handle(&request(message), Uuid::new_v4()).await.unwrap();
            assert_eq!(reply.source, ReplySource::Fallback);
            assert!(fallback::classify(message).lines().contains(&reply.text.as_str()));
        }

        let accepted = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err(), "offline relay reached the network");
    }

    #[tokio::test]
    async fn successful_generation_is_returned() {
        let generator = ScriptedGenerator::new(vec![Step::Reply("  Beep boop 🤖 ")]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        let reply = relay.handle(&request("hi"), Uuid::new_v4()).await.unwrap();
        assert_eq!(reply.text, "Beep boop 🤖");
        assert_eq!(reply.source, ReplySource::Model);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn prompt_carries_only_the_trailing_window() {
        let generator = ScriptedGenerator::new(vec![Step::Reply("ok")]);
        let mut config = RelayConfig::default();
        config.history_window = 3;
        let relay = relay_with(Some(generator.clone()), config);

        let history = (0..5)
            .map(|i| Turn {
                speaker: Speaker::User,
                text: format!("old-{i}"),
            })
            .collect();
        let req = ChatRequest {
            message: "now".into(),
            history,
        };
        relay.handle(&req, Uuid::new_v4()).await.unwrap();

        let prompt = generator.prompts.lock().unwrap()[0].clone();
        assert!(!prompt.contains("old-0") && !prompt.contains("old-1"));
        let a = prompt.find("old-2").unwrap();
        let b = prompt.find("old-3").unwrap();
        let c = prompt.find("old-4").unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_upstream_is_attempted_twice_then_unavailable() {
        let generator = ScriptedGenerator::new(vec![Step::Hang, Step::Hang]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        let started = Instant::now();
        let err = relay.handle(&request("hi"), Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, RelayError::ServiceUnavailable(_)));
        assert!(err.details().unwrap().contains("timed out"));
        assert_eq!(generator.calls(), 2);
        // timeout x 2 + one backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(21) && elapsed < Duration::from_secs(22));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_first_reply_is_retried() {
        let generator =
            ScriptedGenerator::new(vec![Step::Reply("   "), Step::Reply("second wind! 💨")]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        let started = Instant::now();
        let reply = relay.handle(&request("hi"), Uuid::new_v4()).await.unwrap();
        assert_eq!(reply.text, "second wind! 💨");
        assert_eq!(generator.calls(), 2);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_replies_exhaust_to_unavailable() {
        let generator = ScriptedGenerator::new(vec![Step::Reply(""), Step::Reply("")]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        let err = relay.handle(&request("hi"), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RelayError::ServiceUnavailable(_)));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_then_success() {
        let generator = ScriptedGenerator::new(vec![
            Step::Fail(|| GenerateError::Transport("connection reset".into())),
            Step::Reply("back online"),
        ]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        let reply = relay.handle(&request("hi"), Uuid::new_v4()).await.unwrap();
        assert_eq!(reply.text, "back online");
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn definitive_rejection_is_not_retried() {
        let generator = ScriptedGenerator::new(vec![
            Step::Fail(|| GenerateError::Rejected {
                status: 401,
                body: "API key not valid".into(),
            }),
            Step::Reply("unreachable"),
        ]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        let started = Instant::now();
        let err = relay.handle(&request("hi"), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RelayError::ServiceUnavailable(_)));
        assert!(err.details().unwrap().contains("401"));
        assert_eq!(generator.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn panicking_generator_becomes_internal_error() {
        let generator = ScriptedGenerator::new(vec![Step::Panic]);
        let relay = relay_with(Some(generator.clone()), RelayConfig::default());

        let err = relay.handle(&request("hi"), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RelayError::Internal(_)));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn degrade_mode_answers_from_fallback_on_failure() {
        let generator = ScriptedGenerator::new(vec![Step::Hang, Step::Hang]);
        let mut config = RelayConfig::default();
        config.fallback_on_error = true;
        let relay = relay_with(Some(generator.clone()), config);

        let reply = relay.handle(&request("tell me a joke"), Uuid::new_v4()).await.unwrap();
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(fallback::Pool::Joke.lines().contains(&reply.text.as_str()));
        assert_eq!(generator.calls(), 2);
    }
}
