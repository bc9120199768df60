//! Configuration types.
//!
//! Loaded from `shipwright.toml`; every field has a default so an empty file
//! (or no file) is a valid configuration. Secrets never live here: API keys
//! and the deploy token are read from the environment by the clients.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::machine::RetryPolicy;

/// Default config file name.
pub const CONFIG_FILE: &str = "shipwright.toml";

/// Env var overriding the config path.
pub const CONFIG_ENV: &str = "SHIPWRIGHT_CONFIG";

/// Env var overriding the primary model.
pub const MODEL_ENV: &str = "SHIPWRIGHT_LLM_MODEL";

/// Generation provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
}

impl std::str::FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(CoreError::Config(format!("unknown provider: {}", other))),
        }
    }
}

/// Model tier requested by a caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Highest quality model, used for generation and fixes
    #[default]
    Primary,
    /// Cheaper, faster model, used as fallback
    Fast,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fast => "fast",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the local build runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Host process via `sh -c`
    #[default]
    Process,
    /// docker/podman CLI with the workspace bind-mounted
    Container,
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: ProviderKind,
    pub base_url: Option<String>,
    /// Model name per tier name (`primary`, `fast`)
    pub models: HashMap<String, String>,
    /// Tier to switch to on the final retries, keyed by tier name
    pub fallback: HashMap<String, ModelTier>,
    /// Retries after the initial call
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let mut fallback = HashMap::new();
        fallback.insert(ModelTier::Primary.as_str().to_string(), ModelTier::Fast);
        Self {
            provider: ProviderKind::OpenAi,
            base_url: None,
            models: HashMap::new(),
            fallback,
            max_retries: 3,
            base_backoff_ms: 1000,
            max_backoff_ms: 16_000,
            request_timeout_secs: 120,
            max_tokens: 16_384,
            temperature: 0.2,
        }
    }
}

impl GenerationConfig {
    /// Configured model for a tier, falling back to the provider default.
    pub fn model_for(&self, tier: ModelTier) -> String {
        if let Some(model) = self.models.get(tier.as_str()) {
            return model.clone();
        }
        match (self.provider, tier) {
            (ProviderKind::OpenAi, ModelTier::Primary) => "gpt-4o".to_string(),
            (ProviderKind::OpenAi, ModelTier::Fast) => "gpt-4o-mini".to_string(),
            (ProviderKind::Anthropic, ModelTier::Primary) => "claude-sonnet-4-20250514".to_string(),
            (ProviderKind::Anthropic, ModelTier::Fast) => "claude-3-5-haiku-20241022".to_string(),
        }
    }

    pub fn fallback_for(&self, tier: ModelTier) -> Option<ModelTier> {
        self.fallback.get(tier.as_str()).copied().filter(|t| *t != tier)
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    pub max_iterations: u32,
    pub stuck_threshold: u32,
    pub command: String,
    pub install: Option<String>,
    pub timeout_secs: u64,
    pub runner: RunnerKind,
    pub image: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            stuck_threshold: 2,
            command: "npm run build".to_string(),
            install: None,
            timeout_secs: 300,
            runner: RunnerKind::Process,
            image: "node:20-bookworm".to_string(),
        }
    }
}

impl BuildConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_iterations, self.stuck_threshold)
    }
}

/// `[deploy]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeployConfig {
    pub base_url: String,
    pub max_attempts: u32,
    pub stuck_threshold: u32,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    /// Substrings (lowercase) marking a failure as transient, added to the built-in list
    pub transient_markers: Vec<String>,
    /// Files under this directory are deployed in the prerequisite phase
    pub prerequisite_dir: String,
    /// JSON file in the FileSet receiving prerequisite outputs
    pub injection_path: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".to_string(),
            max_attempts: 4,
            stuck_threshold: 3,
            poll_interval_ms: 2000,
            timeout_secs: 600,
            transient_markers: Vec::new(),
            prerequisite_dir: "contracts/".to_string(),
            injection_path: "src/deployments.json".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.stuck_threshold)
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Idle project entries older than this are evicted from memory
    pub ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".shipwright"),
            ttl_secs: 3600,
        }
    }
}

/// `[templates]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemplatesConfig {
    pub root: Option<PathBuf>,
    pub base_url: Option<String>,
    pub default_template: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root: None,
            base_url: None,
            default_template: "nextjs".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShipwrightConfig {
    pub generation: GenerationConfig,
    pub build: BuildConfig,
    pub deploy: DeployConfig,
    pub store: StoreConfig,
    pub templates: TemplatesConfig,
}

impl ShipwrightConfig {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> CoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        debug!("Loading config from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Resolve the config path (explicit, then `SHIPWRIGHT_CONFIG`, then
    /// `./shipwright.toml`) and load it; a missing default file yields defaults.
    pub fn discover(explicit: Option<&Path>) -> CoreResult<Self> {
        let mut config = if let Some(path) = explicit {
            Self::load(path)?
        } else if let Ok(path) = std::env::var(CONFIG_ENV) {
            Self::load(path)?
        } else if Path::new(CONFIG_FILE).exists() {
            Self::load(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.is_empty()) {
            self.generation
                .models
                .insert(ModelTier::Primary.as_str().to_string(), model);
        }
        if !self.generation.models.contains_key(ModelTier::Primary.as_str())
            && lookup("OPENAI_API_KEY").is_none()
            && lookup("ANTHROPIC_API_KEY").is_some()
        {
            self.generation.provider = ProviderKind::Anthropic;
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.build.max_iterations == 0 {
            return Err(CoreError::Config("build.max_iterations must be at least 1".into()));
        }
        if self.deploy.max_attempts == 0 {
            return Err(CoreError::Config("deploy.max_attempts must be at least 1".into()));
        }
        if self.build.stuck_threshold == 0 || self.deploy.stuck_threshold == 0 {
            return Err(CoreError::Config("stuck_threshold must be at least 1".into()));
        }
        if self.generation.max_backoff_ms < self.generation.base_backoff_ms {
            return Err(CoreError::Config(
                "generation.max_backoff_ms must not be below base_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}
