//! Configuration system for objattr.
//!
//! Uses `figment` for layered configuration: defaults -> user config file -> explicit
//! config file -> environment. The user config lives at `~/.config/objattr/config.toml`
//! (platform equivalent via `directories`).

use crate::attention::AttentionReduction;
use crate::error::ConfigError;
use crate::merge::SurfaceForm;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjattrConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub syntactic: SyntacticConfig,
    #[serde(default)]
    pub attention: AttentionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl ObjattrConfig {
    /// Reject values the attributors cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.batch_size == 0 {
            return Err(invalid("llm.batch_size", "must be at least 1"));
        }
        if self.llm.max_retries == 0 {
            return Err(invalid("llm.max_retries", "must be at least 1"));
        }
        if self.llm.max_in_flight == 0 {
            return Err(invalid("llm.max_in_flight", "must be at least 1"));
        }
        if self.llm.backoff_min_ms > self.llm.backoff_max_ms {
            return Err(invalid(
                "llm.backoff_min_ms",
                "must not exceed llm.backoff_max_ms",
            ));
        }
        if self.attention.n_blocks_to_average == 0 {
            return Err(invalid("attention.n_blocks_to_average", "must be at least 1"));
        }
        if self.app.text_max_len == 0 {
            return Err(invalid("app.text_max_len", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Which attribution strategy serves requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributorKind {
    #[default]
    Syntactic,
    Attention,
    Llm,
}

impl std::fmt::Display for AttributorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntactic => write!(f, "syntactic"),
            Self::Attention => write!(f, "attention"),
            Self::Llm => write!(f, "llm"),
        }
    }
}

/// Application-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inputs longer than this many characters are truncated by the HTTP front.
    #[serde(default = "default_text_max_len")]
    pub text_max_len: usize,
    /// Strategy used by `extract` and the HTTP front.
    #[serde(default)]
    pub attributor: AttributorKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            text_max_len: default_text_max_len(),
            attributor: AttributorKind::default(),
        }
    }
}

fn default_text_max_len() -> usize {
    1024
}

/// Syntactic attributor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntacticConfig {
    /// Lowercase surface forms in the output.
    #[serde(default = "default_true")]
    pub lowercase: bool,
}

impl Default for SyntacticConfig {
    fn default() -> Self {
        Self { lowercase: true }
    }
}

impl SyntacticConfig {
    pub fn surface_form(&self) -> SurfaceForm {
        if self.lowercase {
            SurfaceForm::Lowercase
        } else {
            SurfaceForm::AsIs
        }
    }
}

/// Attention attributor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionConfig {
    #[serde(default)]
    pub reduction: AttentionReduction,
    /// Number of leading layers averaged by `mean_of_blocks`.
    #[serde(default = "default_n_blocks")]
    pub n_blocks_to_average: usize,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            reduction: AttentionReduction::default(),
            n_blocks_to_average: default_n_blocks(),
        }
    }
}

fn default_n_blocks() -> usize {
    12
}

/// LLM attributor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the chat completions handler, appended to `base_url`.
    #[serde(default = "default_handler")]
    pub handler: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Explicit API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Number of texts per corpus request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum attempts per batch request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Requests allowed in flight at once across all batches.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Seed for the backoff jitter; random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            handler: default_handler(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_in_flight: default_max_in_flight(),
            request_timeout_secs: default_request_timeout(),
            seed: None,
            prompts: PromptConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.handler)
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_handler() -> String {
    "/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_max_retries() -> u32 {
    10
}

fn default_backoff_min_ms() -> u64 {
    30_000
}

fn default_backoff_max_ms() -> u64 {
    120_000
}

fn default_max_in_flight() -> usize {
    1
}

fn default_request_timeout() -> u64 {
    120
}

/// Prompt fragments. `{input_text}` and `{input_texts}` are substituted at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_task")]
    pub task: String,
    #[serde(default = "default_example")]
    pub example: String,
    #[serde(default = "default_multi_text_example")]
    pub multi_text_example: String,
    #[serde(default = "default_input")]
    pub input: String,
    #[serde(default = "default_multi_text_input")]
    pub multi_text_input: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            task: default_task(),
            example: default_example(),
            multi_text_example: default_multi_text_example(),
            input: default_input(),
            multi_text_input: default_multi_text_input(),
        }
    }
}

fn default_task() -> String {
    "Extract every object (noun) mentioned in the text together with the adjectives that \
     describe it. Include objects that have no adjectives with an empty list. Answer with \
     JSON only.\n"
        .to_string()
}

fn default_example() -> String {
    "Example:\nText: Yellow car is driving on dirty road\n\
     Answer: {\"objects\": {\"car\": [\"yellow\"], \"road\": [\"dirty\"]}}\n"
        .to_string()
}

fn default_multi_text_example() -> String {
    "Each text is wrapped in angle brackets. Answer with one JSON object whose keys are the \
     texts exactly as given, without the brackets.\nExample:\n\
     Texts: [\"<Furry white rabbit>\", \"<Yellow car is driving on dirty road>\"]\n\
     Answer: {\"Furry white rabbit\": {\"objects\": {\"rabbit\": [\"furry\", \"white\"]}}, \
     \"Yellow car is driving on dirty road\": {\"objects\": {\"car\": [\"yellow\"], \
     \"road\": [\"dirty\"]}}}\n"
        .to_string()
}

fn default_input() -> String {
    "Text: {input_text}\nAnswer:".to_string()
}

fn default_multi_text_input() -> String {
    "Texts: {input_texts}\nAnswer:".to_string()
}

/// HTTP front settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "objattr", "objattr")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `OBJATTR_`, `__` for nesting)
/// 2. Explicit config file (`--config`)
/// 3. User config (`~/.config/objattr/config.toml`)
/// 4. Built-in defaults
pub fn load_config(explicit: Option<&Path>) -> Result<ObjattrConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ObjattrConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(invalid(
                "--config",
                &format!("{} does not exist", path.display()),
            ));
        }
        figment = figment.merge(Toml::file(path));
    }

    // OBJATTR_LLM__MODEL, OBJATTR_APP__ATTRIBUTOR, ...
    figment = figment.merge(Env::prefixed("OBJATTR_").split("__"));

    let config: ObjattrConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
