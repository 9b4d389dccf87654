// ABOUTME: Configuration loading for nexus.
// ABOUTME: Reads ~/.nexus/config.toml (or --config), applies PORT and CLI overrides, validates limits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::PhraseRule;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    pub phrases: PhrasesConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory of browser assets served for any unmatched GET.
    pub static_dir: Option<PathBuf>,
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: None,
            cors_permissive: true,
        }
    }
}

/// Text-generation provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// Model used when the new turn carries an image.
    pub vision_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            max_tokens: 150,
            temperature: 0.9,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            system_prompt: String::new(),
        }
    }
}

/// Speech-synthesis configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub model: String,
    pub voice: String,
    pub response_format: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: "tts-1".to_string(),
            voice: "nova".to_string(),
            response_format: "mp3".to_string(),
        }
    }
}

/// Conversation history limits and durability.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Turns kept per session for the context window. Must be even.
    pub max_turns: usize,
    /// Turns kept per session in the snapshot file.
    pub retention: usize,
    pub snapshot_path: Option<PathBuf>,
    /// Session key used when a request omits one.
    pub default_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            retention: 50,
            snapshot_path: None,
            default_key: "default".to_string(),
        }
    }
}

/// Upstream call bounding.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub workers: usize,
    pub speech_workers: usize,
    pub generate_timeout_ms: u64,
    pub speech_timeout_ms: u64,
    pub fallback_text: String,
    pub shutdown_grace_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            speech_workers: 2,
            generate_timeout_ms: 15_000,
            speech_timeout_ms: 20_000,
            fallback_text: "I lost the signal for a moment. Could you say that again?"
                .to_string(),
            shutdown_grace_ms: 5_000,
        }
    }
}

impl DispatchConfig {
    pub fn generate_timeout(&self) -> Duration {
        Duration::from_millis(self.generate_timeout_ms)
    }

    pub fn speech_timeout(&self) -> Duration {
        Duration::from_millis(self.speech_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Canned replies that bypass the upstream call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhrasesConfig {
    pub enabled: bool,
    pub rules: Vec<PhraseRule>,
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
        }
    }
}

/// Log output configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from ~/.nexus/config.toml, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Path to the config file.
    pub fn config_path() -> PathBuf {
        Self::base_dir().join("config.toml")
    }

    /// Path to the secrets env file, loaded after a local `.env`.
    pub fn secrets_env_path() -> PathBuf {
        Self::base_dir().join("secrets.env")
    }

    fn base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nexus")
    }

    /// Apply the `PORT` environment variable, as set by most hosting platforms.
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid PORT '{}': {}", port, e))?;
        }
        Ok(())
    }

    /// Check limits that the session store and dispatch pool rely on.
    pub fn validate(&self) -> anyhow::Result<()> {
        let session = &self.session;
        if session.max_turns < 2 || session.max_turns % 2 != 0 {
            anyhow::bail!(
                "session.max_turns must be an even number >= 2, got {}",
                session.max_turns
            );
        }
        if session.retention < session.max_turns {
            anyhow::bail!(
                "session.retention ({}) must be >= session.max_turns ({})",
                session.retention,
                session.max_turns
            );
        }
        let dispatch = &self.dispatch;
        if dispatch.workers == 0 || dispatch.speech_workers == 0 {
            anyhow::bail!("dispatch.workers and dispatch.speech_workers must be >= 1");
        }
        if dispatch.generate_timeout_ms == 0 || dispatch.speech_timeout_ms == 0 {
            anyhow::bail!("dispatch timeouts must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.vision_model, "gpt-4o");
        assert_eq!(config.session.max_turns, 20);
        assert_eq!(config.session.default_key, "default");
        assert_eq!(config.speech.voice, "nova");
        assert!(config.phrases.enabled);
        assert!(config.phrases.rules.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn parse_config_toml() {
        let toml_str = r#"
[server]
port = 8080
static_dir = "web"

[llm]
provider = "ollama"
model = "llama3"
max_tokens = 300

[session]
max_turns = 8
retention = 32
snapshot_path = "/var/lib/nexus/sessions.json"

[dispatch]
workers = 6
generate_timeout_ms = 5000
fallback_text = "one moment"

[[phrases.rules]]
phrase = "hello"
reply = "hey there"

[[phrases.rules]]
phrase = "bye"
reply = "see you"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.static_dir, Some(PathBuf::from("web")));
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.max_tokens, 300);
        assert_eq!(config.session.max_turns, 8);
        assert_eq!(config.session.retention, 32);
        assert_eq!(config.dispatch.workers, 6);
        assert_eq!(config.dispatch.generate_timeout(), Duration::from_secs(5));
        assert_eq!(config.dispatch.fallback_text, "one moment");
        assert_eq!(config.phrases.rules.len(), 2);
        assert_eq!(config.phrases.rules[1], PhraseRule::new("bye", "see you"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let toml_str = r#"
[llm]
model = "gpt-4.1-mini"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.model, "gpt-4.1-mini");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.dispatch.workers, 4);
    }

    #[test]
    fn odd_turn_cap_is_rejected() {
        let mut config = Config::default();
        config.session.max_turns = 7;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("even"));
    }

    #[test]
    fn retention_below_turn_cap_is_rejected() {
        let mut config = Config::default();
        config.session.max_turns = 12;
        config.session.retention = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = Config::default();
        config.dispatch.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn example_config_parses_and_validates() {
        let config: Config = toml::from_str(include_str!("../config.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.phrases.rules, vec![PhraseRule::new("ping", "pong")]);
    }
}
