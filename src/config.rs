use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_HISTORY_WINDOW: usize = 50;

/// Timeout/retry policy applied to every outbound generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub gemini: GeminiConfig,
    pub retry: RetryPolicy,
    pub history_window: usize,
    pub fallback_on_error: bool,
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig {
                api_key: None,
                model: DEFAULT_MODEL.to_string(),
                api_base: DEFAULT_API_BASE.to_string(),
            },
            retry: RetryPolicy::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
            fallback_on_error: false,
            host: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: None,
        }
    }
}

impl RelayConfig {
    /// Reads the process environment. Call after `dotenv()`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, so tests don't touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // A blank key is the same as no key: offline mode.
        let api_key = lookup("GEMINI_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let retry = RetryPolicy {
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "CHAT_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            max_attempts: parse_or(&lookup, "CHAT_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS).max(1),
            backoff: Duration::from_millis(parse_or(
                &lookup,
                "CHAT_BACKOFF_MS",
                DEFAULT_BACKOFF_MS,
            )),
        };

        let config = Self {
            gemini: GeminiConfig {
                api_key,
                model: lookup("GEMINI_MODEL").unwrap_or(defaults.gemini.model),
                api_base: lookup("GEMINI_API_BASE")
                    .map(|b| b.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.gemini.api_base),
            },
            retry,
            history_window: parse_or(&lookup, "CHAT_HISTORY_WINDOW", DEFAULT_HISTORY_WINDOW),
            fallback_on_error: parse_or(&lookup, "CHAT_FALLBACK_ON_ERROR", false),
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            static_dir: lookup("STATIC_DIR").map(PathBuf::from),
        };

        info!(
            "Relay config: model={}, timeout={:?}, attempts={}, backoff={:?}, window={}, credential={}",
            config.gemini.model,
            config.retry.timeout,
            config.retry.max_attempts,
            config.retry.backoff,
            config.history_window,
            if config.gemini.api_key.is_some() { "set" } else { "unset (offline mode)" },
        );

        config
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        None => default,
    }
}
