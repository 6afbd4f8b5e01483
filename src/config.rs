//! Runtime configuration, read from the environment.
//!
//! `.env` in the working directory is loaded first; otherwise the per-user
//! `config.env` under the platform config directory is used. Variables already
//! present in the process environment are never overridden.

use crate::error::{ChatError, ChatResult};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_SIDECAR: &str = "candle-vllm";
pub const DEFAULT_SIDECAR_ARGS: &str = "--port {port} --model-id unsloth/Qwen3-4B-GGUF \
     --weight-file Qwen3-4B-Q4_0.gguf qwen3 --quant gguf --temperature 0.0 --penalty 1.0";
pub const DEFAULT_MODEL: &str = "qwen3";
pub const DEFAULT_MAX_HISTORY: usize = 100;
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_GREETING: &str = "Hello! I'm ZarSage, your farming advisor. \
     Start the model, then ask me anything about your crops, soil or weather.";

/// System prompt that drives ZarSage's voice.
pub const DEFAULT_PREAMBLE: &str = r#"
You are ZarSage, a warm, friendly, and knowledgeable AI agricultural advisor who helps farmers worldwide.

• First turn of a new chat: greet the user, introduce yourself once, and invite their question.
• After that: never repeat your name or the full introduction unless the user seems confused.
• Keep a conversational, encouraging tone; speak like a helpful neighbor.
• Give practical, evidence-based guidance on crop selection, growth optimisation, pest management, sustainable farming, soil health, weather adaptation, and market strategies.
• Tailor advice to the user's location, climate, and crops when possible; ask politely if you need more context.
• Use clear language that farmers of all technical backgrounds can follow; break complex ideas into simple steps with real-world examples.
• If you're unsure, say so honestly and suggest reliable next steps.
• End each reply with encouragement or an open offer to help with anything else.
"#;

/// How to reach (and, if needed, launch) the model server.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    /// Base URL of an already-running server. When set, no process is spawned.
    pub endpoint: Option<String>,
    pub sidecar_program: String,
    /// Arguments for the sidecar; `{port}` is replaced with the chosen port.
    pub sidecar_args: Vec<String>,
    pub port: u16,
    pub model: String,
    pub preamble: String,
    pub max_history: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            sidecar_program: DEFAULT_SIDECAR.to_string(),
            sidecar_args: split_args(DEFAULT_SIDECAR_ARGS),
            port: DEFAULT_PORT,
            model: DEFAULT_MODEL.to_string(),
            preamble: DEFAULT_PREAMBLE.to_string(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub start_timeout: Duration,
    pub completion_timeout: Duration,
    pub greeting: String,
    pub log_level: tracing::Level,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            start_timeout: DEFAULT_START_TIMEOUT,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            greeting: DEFAULT_GREETING.to_string(),
            log_level: tracing::Level::INFO,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> ChatResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ChatResult<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = AppConfig::default();
        let model = ModelConfig {
            endpoint: get("LLM_ENDPOINT").map(|url| url.trim_end_matches('/').to_string()),
            sidecar_program: get("ZARSAGE_SIDECAR").unwrap_or(defaults.model.sidecar_program),
            sidecar_args: get("ZARSAGE_SIDECAR_ARGS")
                .map(|raw| split_args(&raw))
                .unwrap_or(defaults.model.sidecar_args),
            port: parse_or("ZARSAGE_PORT", get("ZARSAGE_PORT"), defaults.model.port)?,
            model: get("ZARSAGE_MODEL").unwrap_or(defaults.model.model),
            preamble: lookup("ZARSAGE_PREAMBLE")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.model.preamble),
            max_history: parse_or(
                "ZARSAGE_MAX_HISTORY",
                get("ZARSAGE_MAX_HISTORY"),
                defaults.model.max_history,
            )?,
        };
        if model.max_history < 2 {
            return Err(ChatError::config("ZARSAGE_MAX_HISTORY must be at least 2"));
        }

        Ok(Self {
            model,
            start_timeout: parse_secs(
                "ZARSAGE_START_TIMEOUT_SECS",
                get("ZARSAGE_START_TIMEOUT_SECS"),
                defaults.start_timeout,
            )?,
            completion_timeout: parse_secs(
                "ZARSAGE_COMPLETION_TIMEOUT_SECS",
                get("ZARSAGE_COMPLETION_TIMEOUT_SECS"),
                defaults.completion_timeout,
            )?,
            greeting: get("ZARSAGE_GREETING").unwrap_or(defaults.greeting),
            log_level: parse_or("ZARSAGE_LOG", get("ZARSAGE_LOG"), defaults.log_level)?,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> ChatResult<T> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ChatError::config(format!("{key}: cannot parse {value:?}"))),
        None => Ok(default),
    }
}

fn parse_secs(key: &str, raw: Option<String>, default: Duration) -> ChatResult<Duration> {
    let secs: u64 = parse_or(key, raw, default.as_secs())?;
    if secs == 0 {
        return Err(ChatError::config(format!("{key} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Per-user fallback location of the env file.
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("zarsage").join("config.env"))
}

/// Loads `.env` for desktop development, falling back to the user config file.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    if let Some(path) = user_config_file()
        && path.exists()
        && let Err(err) = dotenvy::from_path(&path)
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to load config file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ChatResult<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.model.port, 1234);
        assert!(config.model.sidecar_args.contains(&"{port}".to_string()));
        assert!(config.model.endpoint.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("LLM_ENDPOINT", "http://localhost:8080/v1/"),
            ("ZARSAGE_PORT", "4321"),
            ("ZARSAGE_SIDECAR_ARGS", "--port {port}  --quant gguf"),
            ("ZARSAGE_COMPLETION_TIMEOUT_SECS", "30"),
            ("ZARSAGE_LOG", "debug"),
        ])
        .unwrap();

        assert_eq!(config.model.endpoint.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(config.model.port, 4321);
        assert_eq!(config.model.sidecar_args, ["--port", "{port}", "--quant", "gguf"]);
        assert_eq!(config.completion_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn blank_values_fall_back() {
        let config = config_from(&[("ZARSAGE_MODEL", "   "), ("ZARSAGE_GREETING", "")]).unwrap();
        assert_eq!(config.model.model, DEFAULT_MODEL);
        assert_eq!(config.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config_from(&[("ZARSAGE_PORT", "not-a-port")]),
            Err(ChatError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("ZARSAGE_START_TIMEOUT_SECS", "0")]),
            Err(ChatError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("ZARSAGE_MAX_HISTORY", "1")]),
            Err(ChatError::Config(_))
        ));
    }
}
