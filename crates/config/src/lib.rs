//! Configuration loading and validation for agentichat.
//!
//! Two YAML layers: the global file at `~/.agentichat/config.yaml` and an
//! optional workspace-local override at `./.agentichat/config.yaml`
//! (workspace values win, deep-merged per mapping key). Credentials come
//! from the environment, either via `${ENV_VAR}` references in `api_key`
//! or the `AGENTICHAT_API_KEY` fallback.

pub mod model_metadata;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use agentichat_core::BackendConfig;

pub use model_metadata::ModelMetadataStore;

/// The root configuration structure, mapping `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the active backend entry.
    #[serde(default = "default_backend_name")]
    pub default_backend: String,

    /// Configured backends by name.
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,

    /// Filesystem sandbox settings.
    #[serde(default)]
    pub sandbox: SandboxSettings,

    /// Confirmation toggles.
    #[serde(default)]
    pub confirmations: ConfirmationSettings,

    /// Conversation compression settings.
    #[serde(default)]
    pub compression: CompressionSettings,

    /// Agent-loop iteration ceiling.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Data directory override (default `~/.agentichat`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_backend_name() -> String {
    "local".into()
}
fn default_max_iterations() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Per-file byte cap.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Glob patterns the sandbox refuses to touch.
    #[serde(default = "default_blocked_paths")]
    pub blocked_paths: Vec<String>,
}

fn default_max_file_size() -> u64 {
    1_000_000
}

fn default_blocked_paths() -> Vec<String> {
    [
        "**/.env",
        "**/*.key",
        "**/*.pem",
        "**/id_rsa",
        "**/credentials.json",
        "**/.ssh/*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            blocked_paths: default_blocked_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    /// Confirm file writes, deletions, and moves.
    #[serde(default = "default_true")]
    pub text_operations: bool,

    /// Confirm shell invocations.
    #[serde(default = "default_true")]
    pub shell_commands: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            text_operations: true,
            shell_commands: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Trigger compression automatically.
    #[serde(default)]
    pub auto_enabled: bool,

    /// Message count at which the conversation is considered full.
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: usize,

    /// Messages preserved after automatic compression.
    #[serde(default = "default_auto_keep")]
    pub auto_keep: usize,

    /// Fraction of the threshold at which a warning is shown.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Hard message ceiling; reaching it forces compression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
}

fn default_auto_threshold() -> usize {
    20
}
fn default_auto_keep() -> usize {
    5
}
fn default_warning_threshold() -> f64 {
    0.75
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            auto_enabled: false,
            auto_threshold: default_auto_threshold(),
            auto_keep: default_auto_keep(),
            warning_threshold: default_warning_threshold(),
            max_messages: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_backend: default_backend_name(),
            backends: HashMap::new(),
            sandbox: SandboxSettings::default(),
            confirmations: ConfirmationSettings::default(),
            compression: CompressionSettings::default(),
            max_iterations: default_max_iterations(),
            data_dir: None,
        }
    }
}

impl Config {
    /// Load the layered configuration: `~/.agentichat/config.yaml` overlaid
    /// by `./.agentichat/config.yaml`, then environment credentials.
    pub fn load() -> Result<Self, ConfigError> {
        let global = dirs_home().join(".agentichat").join("config.yaml");
        let workspace = PathBuf::from(".agentichat").join("config.yaml");
        Self::load_layered(&global, &workspace)
    }

    /// Load from explicit layer paths. Missing files are fine; missing
    /// both yields the defaults.
    pub fn load_layered(global: &Path, workspace: &Path) -> Result<Self, ConfigError> {
        let base = read_yaml(global)?;
        let overlay = read_yaml(workspace)?;

        let merged = match (base, overlay) {
            (None, None) => {
                info!("No config file found, using defaults");
                return Ok(Self::default());
            }
            (Some(base), None) => base,
            (None, Some(overlay)) => overlay,
            (Some(base), Some(overlay)) => {
                debug!("Merging workspace config over global config");
                merge_values(base, overlay)
            }
        };

        let mut config: Config =
            serde_yaml::from_value(merged).map_err(|e| ConfigError::ParseError {
                path: global.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.resolve_api_keys();
        config.validate()?;
        Ok(config)
    }

    /// Expand `${ENV_VAR}` references in backend api keys and fall back to
    /// `AGENTICHAT_API_KEY` for remote backends without a key.
    pub fn resolve_api_keys(&mut self) {
        for backend in self.backends.values_mut() {
            if let Some(key) = &backend.api_key {
                if let Some(var) = key.strip_prefix("${").and_then(|k| k.strip_suffix('}')) {
                    backend.api_key = std::env::var(var).ok();
                }
            }
            if backend.api_key.is_none() {
                if let Ok(key) = std::env::var("AGENTICHAT_API_KEY") {
                    backend.api_key = Some(key);
                }
            }
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backends.is_empty() && !self.backends.contains_key(&self.default_backend) {
            return Err(ConfigError::ValidationError(format!(
                "default_backend '{}' does not name a configured backend",
                self.default_backend
            )));
        }
        if !(0.0..=1.0).contains(&self.compression.warning_threshold) {
            return Err(ConfigError::ValidationError(
                "compression.warning_threshold must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }

    /// The data directory (`~/.agentichat` unless overridden).
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| dirs_home().join(".agentichat"))
    }

    /// Select a backend entry, honoring an explicit override name.
    pub fn backend_entry(&self, name: Option<&str>) -> Result<(String, BackendConfig), ConfigError> {
        let name = name.unwrap_or(&self.default_backend);
        self.backends
            .get(name)
            .map(|config| (name.to_string(), config.clone()))
            .ok_or_else(|| {
                ConfigError::ValidationError(format!("backend '{name}' is not configured"))
            })
    }

    /// A starter config for first runs.
    pub fn example_yaml() -> &'static str {
        "default_backend: local\n\
         backends:\n\
         \x20 local:\n\
         \x20   type: local\n\
         \x20   url: http://localhost:11434\n\
         \x20   model: qwen3:8b\n\
         \x20 remote:\n\
         \x20   type: remote\n\
         \x20   url: https://albert.api.etalab.gouv.fr\n\
         \x20   model: albert-large\n\
         \x20   api_key: ${ALBERT_API_KEY}\n\
         \x20   context_max_tokens: 32000\n\
         sandbox:\n\
         \x20 max_file_size: 1000000\n\
         compression:\n\
         \x20 auto_enabled: true\n\
         \x20 auto_threshold: 20\n\
         \x20 auto_keep: 5\n\
         max_iterations: 10\n"
    }
}

fn read_yaml(path: &Path) -> Result<Option<serde_yaml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let value = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Recursive merge: overlay mappings win per key, everything else replaces.
fn merge_values(base: serde_yaml::Value, overlay: serde_yaml::Value) -> serde_yaml::Value {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(mut base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            serde_yaml::Value::Mapping(base)
        }
        (_, overlay) => overlay,
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
