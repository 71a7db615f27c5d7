//! Configuration parsing and validation for voxrelay.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

/// Convention env var for the chat-completion key.
pub const CHAT_KEY_ENV: &str = "GROQ_API_KEY";
/// Convention env var for the primary speech key.
pub const SPEECH_KEY_ENV: &str = "HUME_API_KEY";
/// Convention env var for the backup speech key.
pub const SPEECH_BACKUP_KEY_ENV: &str = "HUME_API_KEY_BACKUP";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub chat: ChatConfig,
    pub speech: SpeechConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Total timeout for a single upstream call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Connect timeout for upstream calls, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Cross-origin policy for the browser frontend.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Exact origins, e.g. "http://localhost:3000"
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Regex patterns matched against the full origin (preview deployments)
    #[serde(default = "default_origin_patterns")]
    pub allowed_origin_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_credentials: bool,
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
    ]
}

fn default_origin_patterns() -> Vec<String> {
    vec![r"^https://.*\.vercel\.app$".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            allowed_origin_patterns: default_origin_patterns(),
            allow_credentials: true,
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`, so every use is grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How an API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was picked up from its convention env var (holds var name)
    Convention(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Chat-completion upstream (OpenAI-compatible, Groq by default).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub url: String,
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the built-in persona instruction when set.
    pub system_prompt: Option<String>,
}

impl ChatConfig {
    /// The system instruction prepended to every completion request.
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(crate::prompt::SYSTEM_PROMPT)
    }
}

/// Audio container requested from the speech upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Speech-synthesis upstream (Hume by default).
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub url: String,
    pub api_key: Option<ApiKey>,
    /// Used only after the primary key fails with a rate/quota error.
    pub backup_api_key: Option<ApiKey>,
    pub format: AudioFormat,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{key}': {message}")]
    EnvVar {
        var: String,
        key: String,
        message: String,
    },
}

/// Raw chat section; `api_key` may still contain `${VAR}` references.
#[derive(Debug, Deserialize)]
pub struct RawChatConfig {
    #[serde(default = "default_chat_url")]
    url: String,
    api_key: Option<String>,
    #[serde(default = "default_chat_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    system_prompt: Option<String>,
}

fn default_chat_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_chat_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

impl Default for RawChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            api_key: None,
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

/// Raw speech section; key values may still contain `${VAR}` references.
#[derive(Debug, Deserialize)]
pub struct RawSpeechConfig {
    #[serde(default = "default_speech_url")]
    url: String,
    api_key: Option<String>,
    backup_api_key: Option<String>,
    #[serde(default)]
    format: AudioFormat,
}

fn default_speech_url() -> String {
    "https://api.hume.ai".to_string()
}

impl Default for RawSpeechConfig {
    fn default() -> Self {
        Self {
            url: default_speech_url(),
            api_key: None,
            backup_api_key: None,
            format: AudioFormat::default(),
        }
    }
}

/// Raw configuration deserialized directly from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    cors: CorsConfig,
    #[serde(default)]
    chat: RawChatConfig,
    #[serde(default)]
    speech: RawSpeechConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl RawConfig {
    /// Parse raw configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Log level, readable before keys are resolved.
    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, key_name: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            key: key_name.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                key: key_name.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            key: key_name.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in '{}')",
                var_name, key_name
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Resolve one key: `${VAR}` expansion, literal, or convention env var.
///
/// An empty value (literal or from the environment) counts as absent.
fn resolve_key_with<F>(
    raw: Option<&str>,
    key_name: &str,
    convention_var: &str,
    lookup: &F,
) -> Result<(Option<ApiKey>, KeySource), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let resolved = match raw {
        Some(raw_key) if raw_key.contains("${") => {
            let expanded = expand_env_vars_with(raw_key, key_name, lookup)?;
            (Some(expanded), KeySource::EnvExpanded)
        }
        Some(raw_key) => (Some(raw_key.to_string()), KeySource::Literal),
        None => match lookup(convention_var) {
            Some(value) => (Some(value), KeySource::Convention(convention_var.to_string())),
            None => (None, KeySource::None),
        },
    };

    match resolved {
        (Some(value), source) if !value.trim().is_empty() => Ok((Some(ApiKey::from(value)), source)),
        _ => Ok((None, KeySource::None)),
    }
}

impl Config {
    /// Load configuration from an optional TOML file, resolving keys from the environment.
    ///
    /// Without a path every section takes its defaults. Returns the config and
    /// per-key source information.
    pub fn load(path: Option<&Path>) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let raw = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                RawConfig::parse_str(&content)?
            }
            None => RawConfig::default(),
        };

        let (config, key_sources) = Self::from_raw(raw)?;
        config.validate()?;
        Ok((config, key_sources))
    }

    /// Convert raw config to final config using real environment variables.
    pub fn from_raw(raw: RawConfig) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        Self::from_raw_with(raw, |name| std::env::var(name).ok())
    }

    /// Convert raw config to final config with a custom variable lookup.
    pub fn from_raw_with<F>(
        raw: RawConfig,
        lookup: F,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (chat_key, chat_source) =
            resolve_key_with(raw.chat.api_key.as_deref(), "chat.api_key", CHAT_KEY_ENV, &lookup)?;
        let (speech_key, speech_source) = resolve_key_with(
            raw.speech.api_key.as_deref(),
            "speech.api_key",
            SPEECH_KEY_ENV,
            &lookup,
        )?;
        let (backup_key, backup_source) = resolve_key_with(
            raw.speech.backup_api_key.as_deref(),
            "speech.backup_api_key",
            SPEECH_BACKUP_KEY_ENV,
            &lookup,
        )?;

        let key_sources = vec![
            ("chat.api_key".to_string(), chat_source),
            ("speech.api_key".to_string(), speech_source),
            ("speech.backup_api_key".to_string(), backup_source),
        ];

        let config = Config {
            server: raw.server,
            cors: raw.cors,
            chat: ChatConfig {
                url: raw.chat.url,
                api_key: chat_key,
                model: raw.chat.model,
                temperature: raw.chat.temperature,
                max_tokens: raw.chat.max_tokens,
                system_prompt: raw.chat.system_prompt,
            },
            speech: SpeechConfig {
                url: raw.speech.url,
                api_key: speech_key,
                backup_api_key: backup_key,
                format: raw.speech.format,
            },
            logging: raw.logging,
        };

        Ok((config, key_sources))
    }

    /// Validate the configuration.
    ///
    /// Missing keys only produce warnings; the service still starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.url.trim().is_empty() {
            return Err(ConfigError::Validation("chat.url is empty".to_string()));
        }
        if self.speech.url.trim().is_empty() {
            return Err(ConfigError::Validation("speech.url is empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ConfigError::Validation(format!(
                "chat.temperature must be within 0.0..=2.0, got {}",
                self.chat.temperature
            )));
        }
        if self.chat.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "chat.max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for pattern in &self.cors.allowed_origin_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("Invalid origin pattern '{}': {}", pattern, e))
            })?;
        }

        if self.chat.api_key.is_none() {
            tracing::warn!(
                env = CHAT_KEY_ENV,
                "No chat API key configured - /chat requests will be rejected upstream"
            );
        }
        if self.speech.api_key.is_none() {
            tracing::warn!(
                env = SPEECH_KEY_ENV,
                "No speech API key configured - /tts requests will be rejected upstream"
            );
        }
        if self.speech.backup_api_key.is_none() {
            tracing::warn!(
                env = SPEECH_BACKUP_KEY_ENV,
                "No backup speech API key configured - rate-limit failover disabled"
            );
        }

        Ok(())
    }
}
