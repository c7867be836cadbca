//! Configuration management (backend chain, safety policy, UI settings).
//!
//! Settings live in `~/.cognate/config.toml` and can be overridden by
//! environment variables (`OPENROUTER_API_KEY`, `COGNATE_USE_MOCK`). A missing
//! config file is not an error; defaults apply. A file that exists but fails
//! to parse is fatal.

use crate::error::CognateError;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Backend chain selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendChainConfig {
    /// Name of the backend tried first.
    #[serde(default = "default_backend_name")]
    pub default: String,
    /// Additional backends tried in order after the default fails.
    #[serde(default)]
    pub fallback: Vec<String>,
}

fn default_backend_name() -> String {
    "openrouter".to_string()
}

impl Default for BackendChainConfig {
    fn default() -> Self {
        Self {
            default: default_backend_name(),
            fallback: Vec::new(),
        }
    }
}

/// Per-backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Credential written directly into the config file.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of an environment variable holding the credential.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Default model for this backend.
    #[serde(default)]
    pub model: Option<String>,
}

/// Danger detection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Whether dangerous commands require interactive confirmation.
    #[serde(default = "default_true")]
    pub confirm_dangerous: bool,
    /// Regex patterns marking a command as dangerous. Empty means use the
    /// built-in defaults.
    #[serde(default)]
    pub dangerous_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            confirm_dangerous: true,
            dangerous_patterns: Vec::new(),
        }
    }
}

/// Interactive session settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    /// Auto-abort the selection session after this many seconds of
    /// inactivity. Zero disables the timer.
    #[serde(default)]
    pub selection_timeout_secs: u64,
}

/// File-backed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub backend: BackendChainConfig,
    #[serde(default)]
    pub backends: HashMap<String, BackendSettings>,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub ui: UiConfig,
    /// Use the deterministic mock backend instead of the network.
    #[serde(default)]
    pub use_mock: bool,
}

impl FileConfig {
    /// Load configuration from file and apply environment overrides.
    pub fn load() -> Result<Self, CognateError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path)?,
            _ => {
                info!("no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path with no environment overrides applied.
    pub fn load_from_path(path: &Path) -> Result<Self, CognateError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CognateError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: FileConfig = toml::from_str(&content)
            .map_err(|e| CognateError::Config(format!("invalid TOML in {}: {e}", path.display())))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if std::env::var("COGNATE_USE_MOCK").is_ok() {
            self.use_mock = true;
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".cognate").join("config.toml"))
    }

    /// Selection timeout as a duration, `None` when disabled.
    pub fn selection_timeout(&self) -> Option<Duration> {
        match self.ui.selection_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Resolved per-invocation policy handed to the core pipeline.
///
/// CLI flags take precedence over the file config; this struct is the merged
/// result and never changes after construction.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Requested model, possibly `backend/model` qualified.
    pub model: Option<String>,
    /// Number of command candidates to request, clamped to 1..=10.
    pub num_options: u8,
    /// Whether dangerous commands require confirmation.
    pub confirm_dangerous: bool,
    /// Operator asked to skip all prompting.
    pub force: bool,
    /// Operator asked for the interactive cycling session.
    pub interactive: bool,
    /// Print candidates without running any session.
    pub dry_run: bool,
    /// Danger patterns (empty means built-in defaults).
    pub dangerous_patterns: Vec<String>,
    /// Inactivity auto-abort for the selection session.
    pub selection_timeout: Option<Duration>,
}

impl Policy {
    /// Merge CLI-level choices with the file config.
    pub fn resolve(
        config: &FileConfig,
        model: Option<String>,
        num_options: u8,
        force: bool,
        interactive: bool,
        dry_run: bool,
    ) -> Self {
        Self {
            model,
            num_options: num_options.clamp(1, 10),
            confirm_dangerous: config.safety.confirm_dangerous,
            force,
            interactive,
            dry_run,
            dangerous_patterns: config.safety.dangerous_patterns.clone(),
            selection_timeout: config.selection_timeout(),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::resolve(&FileConfig::default(), None, 1, false, false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FileConfig::default();
        assert_eq!(config.backend.default, "openrouter");
        assert!(config.backend.fallback.is_empty());
        assert!(config.safety.confirm_dangerous);
        assert!(config.safety.dangerous_patterns.is_empty());
        assert_eq!(config.selection_timeout(), None);
        assert!(!config.use_mock);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
use_mock = true

[backend]
default = "openrouter"
fallback = ["mock"]

[backends.openrouter]
api_key_env = "OPENROUTER_API_KEY"
model = "openai/gpt-4o"

[safety]
confirm_dangerous = false
dangerous_patterns = ["rm\\s+-rf"]

[ui]
selection_timeout_secs = 30
"#
        )
        .unwrap();

        let config = FileConfig::load_from_path(file.path()).unwrap();
        assert!(config.use_mock);
        assert_eq!(config.backend.fallback, vec!["mock".to_string()]);
        assert_eq!(
            config.backends["openrouter"].model.as_deref(),
            Some("openai/gpt-4o")
        );
        assert!(!config.safety.confirm_dangerous);
        assert_eq!(config.safety.dangerous_patterns.len(), 1);
        assert_eq!(config.selection_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = [not toml").unwrap();

        let err = FileConfig::load_from_path(file.path()).unwrap_err();
        assert!(matches!(err, CognateError::Config(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[safety]\nconfirm_dangerous = false").unwrap();

        let config = FileConfig::load_from_path(file.path()).unwrap();
        assert!(!config.safety.confirm_dangerous);
        // Untouched sections keep their defaults.
        assert_eq!(config.backend.default, "openrouter");
    }

    #[test]
    fn test_policy_clamps_num_options() {
        let config = FileConfig::default();
        let low = Policy::resolve(&config, None, 0, false, false, false);
        let high = Policy::resolve(&config, None, 50, false, false, false);
        assert_eq!(low.num_options, 1);
        assert_eq!(high.num_options, 10);
    }

    #[test]
    fn test_policy_carries_safety_settings() {
        let mut config = FileConfig::default();
        config.safety.confirm_dangerous = false;
        config.safety.dangerous_patterns = vec!["custom".to_string()];
        config.ui.selection_timeout_secs = 5;

        let policy = Policy::resolve(&config, None, 3, true, true, false);
        assert!(!policy.confirm_dangerous);
        assert_eq!(policy.dangerous_patterns, vec!["custom".to_string()]);
        assert_eq!(policy.selection_timeout, Some(Duration::from_secs(5)));
        assert!(policy.force);
        assert!(policy.interactive);
    }
}
