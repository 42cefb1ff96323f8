//! Configuration management
//!
//! Settings are resolved in this order (later wins):
//! 1. Built-in defaults
//! 2. `cs-agent.toml` (or the file passed with `--config`)
//! 3. Environment variables
//!
//! Inside the config file, `${VAR_NAME}` is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;
use crate::prompt::PromptProfile;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "cs-agent.toml";

/// Completion API dialect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat completions API (and compatible endpoints)
    #[default]
    OpenAi,
    /// Anthropic messages API
    Claude,
}

impl LlmProvider {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "claude" | "anthropic" => Self::Claude,
            _ => Self::OpenAi,
        }
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Claude => "claude-sonnet-4-20250514",
        }
    }
}

/// What the chat service does when the completion call fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Propagate the failure; the user turn stays in the log
    #[default]
    Error,
    /// Roll back the user turn and answer with the fallback reply
    Fallback,
}

impl FailurePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (empty means every completion call fails)
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Model to use
    pub model: String,

    /// API provider
    pub provider: LlmProvider,

    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,

    /// Upper bound on a single completion call
    pub timeout_secs: u64,

    /// Optional completion length cap
    pub max_tokens: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            provider: LlmProvider::OpenAi,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: None,
        }
    }
}

fn default_model() -> String {
    LlmProvider::OpenAi.default_model().to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    pub host: String,

    /// Port for HTTP API server
    pub port: u16,

    /// Allowed CORS origins. `None` allows any origin.
    pub allowed_origins: Option<Vec<String>>,

    /// Serve the chat page from this HTML file instead of the built-in one
    pub chat_page_path: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            allowed_origins: None,
            chat_page_path: None,
        }
    }
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

/// Session retention limits. Zero disables a limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum turns kept per session
    pub max_turns: usize,

    /// Idle time after which a session is discarded
    pub ttl_secs: u64,

    /// Maximum number of live sessions
    pub max_sessions: usize,

    /// How often the background sweeper drops expired sessions
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 100,
            ttl_secs: 3600,
            max_sessions: 10_000,
            sweep_interval_secs: 300,
        }
    }
}

/// Prompt content configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Built-in profile name ("storefront" or "cod-policy")
    pub profile: String,

    /// Replaces the profile's system rules
    pub system_rules: Option<String>,

    /// Replaces the profile's business context
    pub business_context: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            profile: default_prompt_profile(),
            system_rules: None,
            business_context: None,
        }
    }
}

fn default_prompt_profile() -> String {
    "storefront".to_string()
}

impl PromptConfig {
    /// Resolve the configured profile, applying any custom strings on top
    pub fn resolve(&self) -> crate::Result<PromptProfile> {
        let mut profile = PromptProfile::from_name(&self.profile).ok_or_else(|| {
            Error::Config(format!("Unknown prompt profile: {}", self.profile))
        })?;

        if let Some(rules) = &self.system_rules {
            profile.system_rules = rules.clone();
        }
        if let Some(context) = &self.business_context {
            profile.business_context = context.clone();
        }

        Ok(profile)
    }
}

/// Chat turn handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Longest accepted user message, in characters (0 = unlimited)
    pub max_input_chars: usize,

    /// Behavior when the completion call fails
    pub on_failure: FailurePolicy,

    /// Reply returned under the fallback policy
    pub fallback_reply: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 4000,
            on_failure: FailurePolicy::Error,
            fallback_reply: default_fallback_reply(),
        }
    }
}

fn default_fallback_reply() -> String {
    "Please contact our human support team for assistance.".to_string()
}

/// Main configuration for cs-agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub prompt: PromptConfig,
    pub chat: ChatConfig,
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment.
    ///
    /// Unknown variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();

        Ok(cfg)
    }

    /// Parse configuration from TOML text (environment references expanded)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);

        let toml: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Self::from_toml_config(toml)
    }

    /// Load configuration from the default location.
    ///
    /// Uses `./cs-agent.toml` when present, otherwise the environment only.
    pub fn load() -> crate::Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from defaults and environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn from_toml_config(toml: TomlConfig) -> crate::Result<Self> {
        let defaults = Self::default();

        let llm = toml.llm.unwrap_or_default();
        let provider = llm
            .provider
            .map(|p| LlmProvider::parse(&p))
            .unwrap_or_default();
        let llm_config = LlmConfig {
            api_key: llm.api_key.unwrap_or_default(),
            model: llm
                .model
                .unwrap_or_else(|| provider.default_model().to_string()),
            provider,
            base_url: llm.base_url,
            timeout_secs: llm.timeout_secs.unwrap_or(defaults.llm.timeout_secs),
            max_tokens: llm.max_tokens,
        };

        let api = toml.api.unwrap_or_default();
        let api_config = ApiConfig {
            host: api.host.unwrap_or(defaults.api.host),
            port: api.port.unwrap_or(defaults.api.port),
            allowed_origins: api.allowed_origins,
            chat_page_path: api.chat_page_path,
        };

        let session = toml.session.unwrap_or_default();
        let session_config = SessionConfig {
            max_turns: session.max_turns.unwrap_or(defaults.session.max_turns),
            ttl_secs: session.ttl_secs.unwrap_or(defaults.session.ttl_secs),
            max_sessions: session.max_sessions.unwrap_or(defaults.session.max_sessions),
            sweep_interval_secs: session
                .sweep_interval_secs
                .unwrap_or(defaults.session.sweep_interval_secs),
        };

        let prompt = toml.prompt.unwrap_or_default();
        let prompt_config = PromptConfig {
            profile: prompt.profile.unwrap_or(defaults.prompt.profile),
            system_rules: prompt.system_rules,
            business_context: prompt.business_context,
        };

        let chat = toml.chat.unwrap_or_default();
        let on_failure = match chat.on_failure {
            Some(value) => FailurePolicy::parse(&value).ok_or_else(|| {
                Error::Config(format!("Unknown failure policy: {}", value))
            })?,
            None => defaults.chat.on_failure,
        };
        let chat_config = ChatConfig {
            max_input_chars: chat.max_input_chars.unwrap_or(defaults.chat.max_input_chars),
            on_failure,
            fallback_reply: chat.fallback_reply.unwrap_or(defaults.chat.fallback_reply),
        };

        Ok(Config {
            llm: llm_config,
            api: api_config,
            session: session_config,
            prompt: prompt_config,
            chat: chat_config,
        })
    }

    /// Override settings from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override settings from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // LLM_API_KEY wins over the OpenAI-specific name
        if let Some(api_key) = var("LLM_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.llm.api_key = api_key;
        }
        let model = var("LLM_MODEL");
        if let Some(provider) = var("LLM_PROVIDER") {
            let provider = LlmProvider::parse(&provider);
            // Follow the provider switch unless a model was picked explicitly
            if model.is_none() && self.llm.model == self.llm.provider.default_model() {
                self.llm.model = provider.default_model().to_string();
            }
            self.llm.provider = provider;
        }
        if let Some(model) = model {
            self.llm.model = model;
        }
        if let Some(base_url) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Some(secs) = var("LLM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.llm.timeout_secs = secs;
        }

        if let Some(host) = var("API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = var("API_PORT").and_then(|v| v.parse().ok()) {
            self.api.port = port;
        }
        if let Some(origins) = var("API_ALLOWED_ORIGINS") {
            self.api.allowed_origins = Some(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }
        if let Some(path) = var("CHAT_PAGE_PATH") {
            self.api.chat_page_path = Some(path);
        }

        if let Some(n) = var("SESSION_MAX_TURNS").and_then(|v| v.parse().ok()) {
            self.session.max_turns = n;
        }
        if let Some(secs) = var("SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.session.ttl_secs = secs;
        }
        if let Some(n) = var("SESSION_MAX_SESSIONS").and_then(|v| v.parse().ok()) {
            self.session.max_sessions = n;
        }

        if let Some(profile) = var("PROMPT_PROFILE") {
            self.prompt.profile = profile;
        }
        if let Some(policy) = var("CHAT_FAILURE_POLICY").and_then(|v| FailurePolicy::parse(&v)) {
            self.chat.on_failure = policy;
        }
    }

    /// Check settings that would otherwise fail later at runtime
    pub fn validate(&self) -> crate::Result<()> {
        self.prompt.resolve()?;

        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".to_string()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be positive".to_string()));
        }

        Ok(())
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    api: Option<TomlApiConfig>,
    session: Option<TomlSessionConfig>,
    prompt: Option<TomlPromptConfig>,
    chat: Option<TomlChatConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlLlmConfig {
    /// "openai" or "claude"
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlApiConfig {
    host: Option<String>,
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
    chat_page_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSessionConfig {
    max_turns: Option<usize>,
    ttl_secs: Option<u64>,
    max_sessions: Option<usize>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlPromptConfig {
    profile: Option<String>,
    system_rules: Option<String>,
    business_context: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlChatConfig {
    max_input_chars: Option<usize>,
    on_failure: Option<String>,
    fallback_reply: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.session.max_turns, 100);
        assert_eq!(config.prompt.profile, "storefront");
        assert_eq!(config.chat.on_failure, FailurePolicy::Error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("CS_AGENT_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${CS_AGENT_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${CS_AGENT_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("CS_AGENT_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_passthrough() {
        assert_eq!(Config::expand_env_vars("no_vars_here"), "no_vars_here");
        assert_eq!(Config::expand_env_vars("cost: $5"), "cost: $5");
        assert_eq!(Config::expand_env_vars("${}_content"), "_content");
    }

    #[test]
    fn test_toml_parsing() {
        let config = Config::from_toml_str(
            r#"
[llm]
provider = "claude"
model = "claude-sonnet-4-20250514"
api_key = "test_key"
timeout_secs = 15

[api]
port = 9090
chat_page_path = "static/chat.html"

[session]
max_turns = 20
ttl_secs = 0

[prompt]
profile = "cod-policy"

[chat]
on_failure = "fallback"
fallback_reply = "Call us."
"#,
        )
        .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Claude);
        assert_eq!(config.llm.model, "claude-sonnet-4-20250514");
        assert_eq!(config.llm.api_key, "test_key");
        assert_eq!(config.llm.timeout_secs, 15);
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.api.chat_page_path.as_deref(), Some("static/chat.html"));
        assert_eq!(config.session.max_turns, 20);
        assert_eq!(config.session.ttl_secs, 0);
        assert_eq!(config.session.max_sessions, 10_000);
        assert_eq!(config.prompt.profile, "cod-policy");
        assert_eq!(config.chat.on_failure, FailurePolicy::Fallback);
        assert_eq!(config.chat.fallback_reply, "Call us.");
    }

    #[test]
    fn test_toml_rejects_unknown_failure_policy() {
        let err = Config::from_toml_str("[chat]\non_failure = \"retry\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nmax_sessions = 3").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.session.max_sessions, 3);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_toml_file("/nonexistent/cs-agent.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("LLM_MODEL", "gpt-4o"),
            ("API_PORT", "3001"),
            ("API_ALLOWED_ORIGINS", "http://a.test, http://b.test"),
            ("SESSION_MAX_TURNS", "10"),
            ("CHAT_FAILURE_POLICY", "fallback"),
        ]));

        assert_eq!(config.llm.api_key, "sk-openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.api.port, 3001);
        assert_eq!(
            config.api.allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
        assert_eq!(config.session.max_turns, 10);
        assert_eq!(config.chat.on_failure, FailurePolicy::Fallback);
    }

    #[test]
    fn test_llm_api_key_takes_precedence() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("LLM_API_KEY", "sk-generic"),
        ]));
        assert_eq!(config.llm.api_key, "sk-generic");
    }

    #[test]
    fn test_overrides_ignore_empty_and_invalid() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("LLM_MODEL", ""),
            ("API_PORT", "not-a-port"),
            ("CHAT_FAILURE_POLICY", "shrug"),
        ]));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.chat.on_failure, FailurePolicy::Error);
    }

    #[test]
    fn test_provider_switch_picks_matching_model() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("LLM_PROVIDER", "claude")]));
        assert_eq!(config.llm.provider, LlmProvider::Claude);
        assert_eq!(config.llm.model, LlmProvider::Claude.default_model());

        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("LLM_PROVIDER", "anthropic"),
            ("LLM_MODEL", "claude-3-5-haiku-latest"),
        ]));
        assert_eq!(config.llm.model, "claude-3-5-haiku-latest");

        let config = Config::from_toml_str("[llm]\nprovider = \"claude\"\n").unwrap();
        assert_eq!(config.llm.model, LlmProvider::Claude.default_model());
    }

    #[test]
    fn test_provider_switch_keeps_configured_model() {
        let mut config =
            Config::from_toml_str("[llm]\nmodel = \"my-proxy-model\"\n").unwrap();
        config.apply_overrides(lookup(&[("LLM_PROVIDER", "claude")]));
        assert_eq!(config.llm.model, "my-proxy-model");
    }

    #[test]
    fn test_prompt_resolve_with_custom_strings() {
        let prompt = PromptConfig {
            profile: "storefront".to_string(),
            system_rules: Some("Be brief.".to_string()),
            business_context: None,
        };
        let profile = prompt.resolve().unwrap();
        assert_eq!(profile.system_rules, "Be brief.");
        assert_eq!(
            profile.business_context,
            PromptProfile::storefront().business_context
        );
    }

    #[test]
    fn test_validate_rejects_unknown_profile() {
        let mut config = Config::default();
        config.prompt.profile = "bakery".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
