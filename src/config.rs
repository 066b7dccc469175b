//! Configuration management
//!
//! Provider settings, per-role model budgets, curation thresholds, and
//! playbook location. Stored as TOML in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::delta::ApplyPolicy;
use crate::learning::atomicity::DEFAULT_MIN_ATOMICITY;
use crate::learning::similarity::DEFAULT_SIMILARITY_THRESHOLD;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Completion provider connection
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub reflector: RoleConfig,
    #[serde(default)]
    pub curator: CuratorConfig,
    #[serde(default)]
    pub generator: RoleConfig,
    #[serde(default)]
    pub playbook: PlaybookConfig,
}

/// Completion provider settings (the API key is not stored here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Used by any role that does not name its own model
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_base_url() -> String {
    crate::llm::openrouter::OPENROUTER_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            default_model: default_model(),
        }
    }
}

/// Model and token budget for one learning role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Falls back to `provider.default_model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Extra attempts after an unparseable or failed completion
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_max_retries() -> u32 {
    1
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
        }
    }
}

impl RoleConfig {
    pub fn model_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.model.as_deref().unwrap_or(fallback)
    }
}

/// Curator role plus its candidate filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratorConfig {
    #[serde(flatten)]
    pub role: RoleConfig,
    /// Token overlap at which an ADD becomes a TAG on the existing bullet
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// ADDs scoring below this are dropped
    #[serde(default = "default_min_atomicity")]
    pub min_atomicity: f64,
    /// Turn reflection helpful/harmful tags into TAG operations
    #[serde(default = "default_true")]
    pub apply_reflection_tags: bool,
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_min_atomicity() -> f64 {
    DEFAULT_MIN_ATOMICITY
}

fn default_true() -> bool {
    true
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            role: RoleConfig::default(),
            similarity_threshold: default_similarity_threshold(),
            min_atomicity: default_min_atomicity(),
            apply_reflection_tags: default_true(),
        }
    }
}

/// Where the playbook lives and how deltas are applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookConfig {
    /// Defaults to `<data_dir>/playbook.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub apply_policy: ApplyPolicy,
    /// Save after every learning cycle that changed something
    #[serde(default = "default_true")]
    pub autosave: bool,
}

impl Default for PlaybookConfig {
    fn default() -> Self {
        Self {
            path: None,
            apply_policy: ApplyPolicy::default(),
            autosave: default_true(),
        }
    }
}

impl PlaybookConfig {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("playbook.json")),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults on first use
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject thresholds outside [0, 1]
    pub fn validate(&self) -> Result<()> {
        let curator = &self.curator;
        if !(0.0..=1.0).contains(&curator.similarity_threshold) {
            anyhow::bail!("curator.similarity_threshold must be within 0..=1");
        }
        if !(0.0..=1.0).contains(&curator.min_atomicity) {
            anyhow::bail!("curator.min_atomicity must be within 0..=1");
        }
        if self.provider.timeout_secs == 0 {
            anyhow::bail!("provider.timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn reflector_model(&self) -> &str {
        self.reflector.model_or(&self.provider.default_model)
    }

    pub fn curator_model(&self) -> &str {
        self.curator.role.model_or(&self.provider.default_model)
    }

    pub fn generator_model(&self) -> &str {
        self.generator.model_or(&self.provider.default_model)
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "ace-playbook", "ace-playbook")
        .context("Failed to get project directories")
}

/// Path of `config.toml`
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Provider:   {}", config.provider.base_url);
    println!("Timeout:    {}s", config.provider.timeout_secs);
    println!();
    println!("{:<10} {:<32} {:>10} {:>8}", "Role", "Model", "MaxTokens", "Retries");
    for (role, rc, model) in [
        ("reflector", &config.reflector, config.reflector_model()),
        ("curator", &config.curator.role, config.curator_model()),
        ("generator", &config.generator, config.generator_model()),
    ] {
        println!("{:<10} {:<32} {:>10} {:>8}", role, model, rc.max_tokens, rc.max_retries);
    }
    println!();
    println!("Similarity threshold: {:.2}", config.curator.similarity_threshold);
    println!("Min atomicity:        {:.2}", config.curator.min_atomicity);
    println!("Reflection tags:      {}", config.curator.apply_reflection_tags);
    println!();
    println!("Playbook:     {}", config.playbook.resolved_path()?.display());
    println!("Apply policy: {}", config.playbook.apply_policy);
    println!("Autosave:     {}", config.playbook.autosave);
    println!("API key:      {}", if crate::llm::credentials::has_api_key() { "set" } else { "missing" });
    Ok(())
}

pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.reflector.max_tokens, 2048);
        assert_eq!(config.reflector.max_retries, 1);
        assert_eq!(config.curator.similarity_threshold, 0.70);
        assert_eq!(config.curator.min_atomicity, 0.50);
        assert!(config.curator.apply_reflection_tags);
        assert_eq!(config.playbook.apply_policy, ApplyPolicy::Strict);
        assert!(config.playbook.autosave);
        assert_eq!(config.reflector_model(), config.provider.default_model);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [curator]
            model = "anthropic/claude-3.5-haiku"
            similarity_threshold = 0.8

            [playbook]
            apply_policy = "lenient"
            "#,
        )
        .unwrap();

        assert_eq!(config.curator_model(), "anthropic/claude-3.5-haiku");
        assert_eq!(config.curator.similarity_threshold, 0.8);
        assert_eq!(config.curator.role.max_tokens, 2048);
        assert_eq!(config.playbook.apply_policy, ApplyPolicy::Lenient);
        assert_eq!(config.generator_model(), default_model());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.reflector.model = Some("openai/gpt-4o".to_string());
        config.playbook.path = Some(dir.path().join("pb.json"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[curator]\nmin_atomicity = 1.5\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_default_config_toml_parses() {
        let parsed: Config = toml::from_str(&default_config_toml()).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
