//! CLI-level configuration: where the durable store lives and which
//! output format to default to, layered over [`ksg_core::Config`]'s
//! environment-driven knobs (spec §6.4).
//!
//! Mirrors the teacher's `memory-cli::config` file-or-defaults loading
//! shape (`Config::load` trying a handful of default filenames before
//! falling back to [`CliConfig::default`]), trimmed to this crate's
//! single storage backend choice instead of the teacher's multi-backend
//! Turso/redb pool configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use ksg_core::Config as CoreConfig;

/// Platform-appropriate default redb path: `KSG_STORE_PATH` if set, else
/// the OS data directory, else the home directory, else the working
/// directory (mirrors the teacher's `detect_data_directory`/
/// `detect_redb_path` fallback chain).
fn default_store_path() -> String {
    if let Ok(path) = std::env::var("KSG_STORE_PATH") {
        return path;
    }
    let mut dir = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    dir.push("ksg-cli");
    dir.push("ksg.redb");
    dir.to_string_lossy().into_owned()
}

/// Which [`ksg_core::store::MemoryStore`] implementation backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Non-durable, process-lifetime only. The default so `ksg-cli`
    /// works with zero setup.
    Memory,
    /// Durable `redb`-backed store at `CliConfig::store_path`.
    Redb,
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Memory
    }
}

/// File-persisted CLI settings. Anything [`ksg_core::Config`] already
/// covers via environment variables is left to `from_env()` rather than
/// duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub backend: StoreBackend,
    /// Path to the redb database file, used when `backend == Redb`.
    pub store_path: Option<String>,
    /// Default output format name (`human`, `json`, or `yaml`).
    pub default_format: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            store_path: Some(default_store_path()),
            default_format: "human".to_string(),
        }
    }
}

impl CliConfig {
    /// Loads from `path` if given, else the first of a handful of
    /// default filenames in the working directory, else
    /// [`CliConfig::default`].
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => {
                for candidate in ["ksg-cli.toml", "ksg-cli.json", "ksg-cli.yaml", ".ksg-cli.toml"] {
                    let candidate = Path::new(candidate);
                    if candidate.exists() {
                        return Self::load_file(candidate);
                    }
                }
                Ok(Self::default())
            }
        }
    }

    fn load_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).with_context(|| format!("failed to parse YAML config: {}", path.display()))
            }
            Some("toml") => {
                toml::from_str(&content).with_context(|| format!("failed to parse TOML config: {}", path.display()))
            }
            _ => serde_json::from_str(&content)
                .with_context(|| format!("failed to parse JSON config: {}", path.display())),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == StoreBackend::Redb && self.store_path.is_none() {
            anyhow::bail!("backend = redb requires store_path to be set");
        }
        match self.default_format.as_str() {
            "human" | "json" | "yaml" => {}
            other => anyhow::bail!("default_format must be 'human', 'json', or 'yaml', got '{other}'"),
        }
        Ok(())
    }

    /// The matching [`ksg_core::Config`], layering environment overrides
    /// on top of spec §6.4 defaults (`store_path` is threaded through so
    /// `KSG_STORE_PATH` still wins if set).
    #[must_use]
    pub fn core_config(&self) -> CoreConfig {
        let mut core = CoreConfig::from_env();
        if core.store_path.is_none() {
            core.store_path = self.store_path.clone();
        }
        core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CliConfig::default().validate().is_ok());
    }

    #[test]
    fn redb_backend_without_path_is_rejected() {
        let cfg = CliConfig {
            backend: StoreBackend::Redb,
            store_path: None,
            ..CliConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_default_format_is_rejected() {
        let cfg = CliConfig {
            default_format: "xml".to_string(),
            ..CliConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
