//! Layered configuration.
//!
//! Values come from an optional TOML file; every field has a default, so an
//! empty file (or no file) is a valid configuration. The CLI applies flag
//! and environment overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{BuildError, Result};
use crate::inference::RetryPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitewrightConfig {
    pub inference: InferenceConfig,
    pub council: CouncilConfig,
    pub generation: GenerationConfig,
    pub quality: QualityConfig,
    pub site: SiteConfig,
    pub publish: PublishConfig,
    pub notify: NotifyConfig,
}

impl SitewrightConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => Err(BuildError::Config(format!(
                "config file not found: {}",
                p.display()
            ))),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| BuildError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.council.max_rounds == 0 {
            return Err(BuildError::Config(
                "council.max_rounds must be at least 1".to_string(),
            ));
        }
        if self.quality.max_fix_attempts == 0 {
            return Err(BuildError::Config(
                "quality.max_fix_attempts must be at least 1".to_string(),
            ));
        }
        if self.generation.max_concurrency == 0 {
            return Err(BuildError::Config(
                "generation.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.quality.test_command.is_empty() {
            return Err(BuildError::Config(
                "quality.test_command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BuildError::Config(e.to_string()))
    }
}

/// `[inference]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            timeout_secs: 180,
            max_retries: 2,
            backoff_ms: 2000,
        }
    }
}

impl InferenceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_unit: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// `[council]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    pub max_rounds: u32,
    pub proposer_temperature: f32,
    pub reviewer_temperature: f32,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            max_rounds: 2,
            proposer_temperature: 0.8,
            reviewer_temperature: 0.3,
        }
    }
}

/// `[generation]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Pages generated concurrently; 1 is strictly sequential.
    pub max_concurrency: usize,
    pub design_temperature: f32,
    pub page_temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            design_temperature: 0.5,
            page_temperature: 0.7,
        }
    }
}

/// `[quality]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub enabled: bool,
    pub max_fix_attempts: u32,
    /// Commands run once while materialising the test project.
    pub setup_commands: Vec<Vec<String>>,
    pub test_command: Vec<String>,
    pub timeout_secs: u64,
    pub setup_timeout_secs: u64,
    /// Structured results file written by the test runner, relative to the
    /// test project directory.
    pub results_file: String,
    /// Failure lines forwarded to each repair prompt.
    pub max_failure_lines: usize,
    pub repair_temperature: f32,
    /// Port the static file server listens on during tests.
    pub server_port: u16,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_fix_attempts: 3,
            setup_commands: vec![
                vec![
                    "npm".to_string(),
                    "install".to_string(),
                    "--no-audit".to_string(),
                    "--no-fund".to_string(),
                ],
                vec![
                    "npx".to_string(),
                    "playwright".to_string(),
                    "install".to_string(),
                    "chromium".to_string(),
                ],
            ],
            test_command: vec![
                "npx".to_string(),
                "playwright".to_string(),
                "test".to_string(),
            ],
            timeout_secs: 600,
            setup_timeout_secs: 900,
            results_file: "test-results/results.json".to_string(),
            max_failure_lines: 15,
            repair_temperature: 0.4,
            server_port: 4173,
        }
    }
}

/// `[site]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Working directory for checkouts and test projects.
    pub work_dir: PathBuf,
    /// Public base URL override; otherwise taken from the hosting collaborator.
    pub base_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(".sitewright"),
            base_url: None,
        }
    }
}

/// Where the site goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Write into a local directory only.
    Local,
    /// Create a GitHub repository and enable Pages.
    Github,
}

/// `[publish]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub mode: PublishMode,
    /// Account or organisation owning created repositories.
    pub owner: Option<String>,
    pub private: bool,
    pub branch: String,
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            mode: PublishMode::Local,
            owner: None,
            private: false,
            branch: "main".to_string(),
            timeout_secs: 120,
        }
    }
}

/// `[notify]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config = SitewrightConfig::from_toml("").unwrap();
        assert_eq!(config, SitewrightConfig::default());
        assert_eq!(config.council.max_rounds, 2);
        assert_eq!(config.quality.max_fix_attempts, 3);
        assert_eq!(config.inference.max_retries, 2);
    }

    #[test]
    fn test_partial_override() {
        let config = SitewrightConfig::from_toml(
            r#"
            [council]
            max_rounds = 4

            [publish]
            mode = "github"
            owner = "acme"
            "#,
        )
        .unwrap();
        assert_eq!(config.council.max_rounds, 4);
        assert_eq!(config.council.reviewer_temperature, 0.3);
        assert_eq!(config.publish.mode, PublishMode::Github);
        assert_eq!(config.publish.owner.as_deref(), Some("acme"));
    }

    #[test]
    fn test_validation_rejects_zero_bounds() {
        let err = SitewrightConfig::from_toml("[quality]\nmax_fix_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_fix_attempts"));

        let err = SitewrightConfig::from_toml("[council]\nmax_rounds = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = InferenceConfig::default().retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff_unit, Duration::from_millis(2000));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SitewrightConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(SitewrightConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        assert!(SitewrightConfig::load_or_default(None).is_ok());
        assert!(SitewrightConfig::load_or_default(Some(Path::new("/nonexistent/sw.toml"))).is_err());
    }
}
