//! Layered configuration loading.
//!
//! The priority chain (later overrides earlier):
//! 1. Built-in defaults ([`PocketConfig::default()`])
//! 2. User-level: `~/.pocket-agent/config.toml`
//! 3. Workspace-level: `./.pocket-agent/config.toml`
//! 4. Environment variables (see [`ENV_MAPPINGS`])
//!
//! CLI flags are applied by the caller on the returned config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::PocketConfig;
use crate::PocketError;

/// Maximum config file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024; // 1 MB

/// Directory name used for both the user and workspace config layers.
const CONFIG_DIR_NAME: &str = ".pocket-agent";

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    BuiltinDefault,
    UserFile(PathBuf),
    WorkspaceFile(PathBuf),
    EnvVar(String),
    CliFlag(String),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::BuiltinDefault => write!(f, "built-in default"),
            ConfigSource::UserFile(p) => write!(f, "user file: {}", p.display()),
            ConfigSource::WorkspaceFile(p) => write!(f, "workspace file: {}", p.display()),
            ConfigSource::EnvVar(name) => write!(f, "env var: {name}"),
            ConfigSource::CliFlag(name) => write!(f, "flag: {name}"),
        }
    }
}

/// The merged config plus provenance for each field.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub config: PocketConfig,
    /// Dot-separated field path -> the source that determined its value.
    pub sources: HashMap<String, ConfigSource>,
    /// Config files that were found and loaded, in priority order.
    pub source_files: Vec<PathBuf>,
}

impl EffectiveConfig {
    /// Render the config as TOML with the API token masked.
    pub fn render_masked(&self) -> String {
        let mut shown = self.config.clone();
        shown.api_token = shown.api_token.as_deref().map(mask_sensitive);
        toml::to_string_pretty(&shown).unwrap_or_else(|e| format!("# unrenderable config: {e}"))
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    /// Override for the user config path (for testing).
    user_config_path: Option<PathBuf>,
    /// Override for the workspace config path (for testing).
    workspace_config_path: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_config_path: None,
            workspace_config_path: None,
        }
    }

    /// Override the user config file path.
    #[must_use]
    pub fn with_user_path(mut self, path: PathBuf) -> Self {
        self.user_config_path = Some(path);
        self
    }

    /// Override the workspace config file path.
    #[must_use]
    pub fn with_workspace_path(mut self, path: PathBuf) -> Self {
        self.workspace_config_path = Some(path);
        self
    }

    fn user_path(&self) -> PathBuf {
        self.user_config_path.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(CONFIG_DIR_NAME).join("config.toml")
        })
    }

    fn workspace_path(&self) -> PathBuf {
        self.workspace_config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR_NAME).join("config.toml"))
    }

    /// Load and merge configuration from all layers.
    pub fn load(&self) -> Result<EffectiveConfig, PocketError> {
        let mut sources = HashMap::new();
        let mut source_files = Vec::new();

        let mut merged = toml::Value::try_from(PocketConfig::default())
            .map_err(|e| PocketError::ConfigError(format!("failed to serialize defaults: {e}")))?;
        if let toml::Value::Table(ref table) = merged {
            for key in table.keys() {
                sources.insert(key.clone(), ConfigSource::BuiltinDefault);
            }
        }

        let user_path = self.user_path();
        if user_path.exists() {
            let layer = read_layer(&user_path, "user")?;
            deep_merge(&mut merged, &layer);
            record_sources(&layer, &mut sources, ConfigSource::UserFile(user_path.clone()));
            source_files.push(user_path);
        }

        let workspace_path = self.workspace_path();
        if workspace_path.exists() {
            let layer = read_layer(&workspace_path, "workspace")?;
            deep_merge(&mut merged, &layer);
            record_sources(
                &layer,
                &mut sources,
                ConfigSource::WorkspaceFile(workspace_path.clone()),
            );
            source_files.push(workspace_path);
        }

        apply_env_overrides(&mut merged, &mut sources)?;

        let config: PocketConfig = merged
            .try_into()
            .map_err(|e| PocketError::ConfigError(format!("failed to parse merged config: {e}")))?;

        validate_config(&config)?;

        tracing::debug!(
            files = source_files.len(),
            debug_port = config.debug_port,
            "configuration loaded"
        );

        Ok(EffectiveConfig {
            config,
            sources,
            source_files,
        })
    }
}

/// Read one config layer and parse it as TOML.
fn read_layer(path: &Path, label: &str) -> Result<toml::Value, PocketError> {
    let content = read_config_file(path)?;
    toml::from_str(&content)
        .map_err(|e| PocketError::ConfigError(format!("invalid {label} config: {e}")))
}

/// Read a config file, refusing oversized files and embedded null bytes.
fn read_config_file(path: &Path) -> Result<String, PocketError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        PocketError::ConfigError(format!("cannot read config file {}: {e}", path.display()))
    })?;

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(PocketError::ConfigError(format!(
            "config file {} exceeds maximum size of {} bytes (actual: {} bytes)",
            path.display(),
            MAX_CONFIG_FILE_SIZE,
            metadata.len()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        PocketError::ConfigError(format!("cannot read config file {}: {e}", path.display()))
    })?;

    if content.contains('\0') {
        return Err(PocketError::ConfigError(format!(
            "config file {} contains null bytes",
            path.display()
        )));
    }

    Ok(content)
}

/// Merge `overlay` into `base`. Tables merge key by key; anything else
/// in the overlay replaces the base value outright.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Attribute every key set by `layer` to `source`.
fn record_sources(
    layer: &toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
    source: ConfigSource,
) {
    if let toml::Value::Table(table) = layer {
        for (key, value) in table {
            sources.insert(key.clone(), source.clone());
            record_nested_sources(value, sources, &source, key);
        }
    }
}

/// Walk nested tables, attributing dotted key paths.
fn record_nested_sources(
    value: &toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
    source: &ConfigSource,
    prefix: &str,
) {
    if let toml::Value::Table(table) = value {
        for (key, val) in table {
            let path = format!("{prefix}.{key}");
            sources.insert(path.clone(), source.clone());
            record_nested_sources(val, sources, source, &path);
        }
    }
}

/// Known environment variable mapping.
pub struct EnvMapping {
    pub env_var: &'static str,
    /// TOML path segments.
    pub toml_path: &'static [&'static str],
}

/// All supported environment variable overrides.
pub const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        env_var: "POCKET_AGENT_SERVER_URL",
        toml_path: &["server_url"],
    },
    EnvMapping {
        env_var: "CURSOR_DEBUG_PORT",
        toml_path: &["debug_port"],
    },
    EnvMapping {
        env_var: "POCKET_AGENT_POLL_INTERVAL",
        toml_path: &["poll_interval_ms"],
    },
    EnvMapping {
        env_var: "POCKET_AGENT_API_TOKEN",
        toml_path: &["api_token"],
    },
];

/// Apply the [`ENV_MAPPINGS`] overrides that are set in the environment.
fn apply_env_overrides(
    merged: &mut toml::Value,
    sources: &mut HashMap<String, ConfigSource>,
) -> Result<(), PocketError> {
    for mapping in ENV_MAPPINGS {
        if let Ok(raw_value) = std::env::var(mapping.env_var) {
            validate_env_value(mapping.env_var, &raw_value)?;

            let Some(toml_val) = env_value_to_toml(mapping.env_var, mapping.toml_path, &raw_value)?
            else {
                continue;
            };
            set_nested_value(merged, mapping.toml_path, toml_val);

            sources.insert(
                mapping.toml_path.join("."),
                ConfigSource::EnvVar(mapping.env_var.to_string()),
            );
        }
    }
    Ok(())
}

/// Reject env values carrying null bytes or control characters.
fn validate_env_value(var_name: &str, value: &str) -> Result<(), PocketError> {
    if value.contains('\0') {
        return Err(PocketError::ConfigError(format!(
            "environment variable {var_name} contains null bytes"
        )));
    }
    for ch in value.chars() {
        if ch.is_control() && ch != '\t' && ch != '\n' && ch != '\r' {
            return Err(PocketError::ConfigError(format!(
                "environment variable {var_name} contains control character U+{:04X}",
                ch as u32
            )));
        }
    }
    Ok(())
}

/// Convert an env value into the TOML type of its target field.
///
/// `Ok(None)` means the value is ignored and the lower layers stand. An
/// unusable poll interval is ignored with a warning and falls back to
/// whatever the defaults or files set.
fn env_value_to_toml(
    env_var: &str,
    toml_path: &[&str],
    raw: &str,
) -> Result<Option<toml::Value>, PocketError> {
    match toml_path.last().copied().unwrap_or("") {
        "debug_port" => {
            let num: i64 = raw.trim().parse().map_err(|e| {
                PocketError::ConfigError(format!(
                    "environment variable {env_var} must be numeric: {e}"
                ))
            })?;
            Ok(Some(toml::Value::Integer(num)))
        }
        "poll_interval_ms" => match raw.trim().parse::<i64>() {
            Ok(ms) if ms > 0 => Ok(Some(toml::Value::Integer(ms))),
            _ => {
                tracing::warn!(
                    var = env_var,
                    value = raw,
                    "ignoring invalid poll interval; expected a positive number of milliseconds"
                );
                Ok(None)
            }
        },
        _ => Ok(Some(toml::Value::String(raw.to_string()))),
    }
}

/// Set a value at a dotted path, creating intermediate tables on the way.
fn set_nested_value(root: &mut toml::Value, path: &[&str], value: toml::Value) {
    if path.is_empty() {
        return;
    }
    if path.len() == 1 {
        if let toml::Value::Table(table) = root {
            table.insert(path[0].to_string(), value);
        }
        return;
    }
    if let toml::Value::Table(table) = root {
        let entry = table
            .entry(path[0].to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        set_nested_value(entry, &path[1..], value);
    }
}

/// Sanity-check the merged configuration.
fn validate_config(config: &PocketConfig) -> Result<(), PocketError> {
    if config.debug_port == 0 {
        return Err(PocketError::ConfigError(
            "debug_port must be non-zero".to_string(),
        ));
    }
    if config.poll_interval_ms == 0 {
        return Err(PocketError::ConfigError(
            "poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    if !(config.server_url.starts_with("http://") || config.server_url.starts_with("https://")) {
        return Err(PocketError::ConfigError(format!(
            "server_url must be an http(s) URL, got {:?}",
            config.server_url
        )));
    }
    Ok(())
}

/// Mask a sensitive value for display or logging.
///
/// Returns the first 4 characters followed by "***", or just "***"
/// if the value is shorter than 4 characters.
pub fn mask_sensitive(value: &str) -> String {
    if value.chars().count() < 4 {
        "***".to_string()
    } else {
        let prefix: String = value.chars().take(4).collect();
        format!("{prefix}***")
    }
}
