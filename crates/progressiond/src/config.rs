//! Configuration management for progressiond.
//!
//! Loads settings from `--config`, /etc/progressiond/config.toml or
//! ./progressiond.toml, falling back to defaults.

use crate::mining::MiningRule;
use anyhow::{bail, Context, Result};
use progression_common::{LevelingPolicy, DEFAULT_BASE_POINTS, DEFAULT_DATA_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// System config file path
pub const CONFIG_PATH: &str = "/etc/progressiond/config.toml";

/// Config file in the working directory, tried second
pub const LOCAL_CONFIG_PATH: &str = "progressiond.toml";

/// Durable store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding every session's record
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

fn default_data_file() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FILE)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

/// Threshold curve: level L needs `base_points * L`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelingConfig {
    #[serde(default = "default_base_points")]
    pub base_points: u64,
}

fn default_base_points() -> u64 {
    DEFAULT_BASE_POINTS
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            base_points: default_base_points(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between background saves (0 disables)
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,

    /// Write the store after every disconnect
    #[serde(default = "default_save_on_detach")]
    pub save_on_detach: bool,

    /// Filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_autosave_interval() -> u64 {
    300 // 5 minutes
}

fn default_save_on_detach() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: default_autosave_interval(),
            save_on_detach: default_save_on_detach(),
            log_level: default_log_level(),
        }
    }
}

/// Which broken blocks earn points, and with which tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    #[serde(default = "default_points_per_block")]
    pub points_per_block: u64,

    /// Case-insensitive substrings of block ids that qualify
    #[serde(default = "default_block_patterns")]
    pub block_patterns: Vec<String>,

    /// Case-insensitive substrings of tool ids that qualify
    #[serde(default = "default_tool_patterns")]
    pub tool_patterns: Vec<String>,
}

fn default_points_per_block() -> u64 {
    1
}

fn default_block_patterns() -> Vec<String> {
    ["Stone", "Rock", "Dirt", "Cobblestone", "Granite", "Sandstone", "Ore"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_tool_patterns() -> Vec<String> {
    vec!["Pickaxe".to_string(), "Pick".to_string()]
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            points_per_block: default_points_per_block(),
            block_patterns: default_block_patterns(),
            tool_patterns: default_tool_patterns(),
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File(PathBuf),
    Defaults { reason: String },
}

impl ConfigOrigin {
    /// Report the origin. Call once logging is set up.
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded config from {}", path.display()),
            ConfigOrigin::Defaults { reason } => {
                warn!("Config not found, using defaults: {}", reason)
            }
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub leveling: LevelingConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub mining: MiningConfig,
}

impl Config {
    /// Load config from `explicit` (must exist), or the standard
    /// locations, or return defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (config, origin) = Self::resolve(explicit)?;
        origin.log();
        Ok(config)
    }

    /// Like `load`, but hands back the origin instead of logging it, for
    /// callers that install their subscriber from the loaded config.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, ConfigOrigin)> {
        if let Some(path) = explicit {
            let config = Self::load_from_path(path)?;
            return Ok((config, ConfigOrigin::File(path.to_path_buf())));
        }

        let mut failures = Vec::new();
        for candidate in [CONFIG_PATH, LOCAL_CONFIG_PATH] {
            let path = Path::new(candidate);
            match Self::load_from_path(path) {
                Ok(config) => return Ok((config, ConfigOrigin::File(path.to_path_buf()))),
                Err(e) => failures.push(format!("{:#}", e)),
            }
        }
        Ok((
            Config::default(),
            ConfigOrigin::Defaults {
                reason: failures.join("; "),
            },
        ))
    }

    /// Load and validate config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Reject values the daemon cannot act on
    pub fn validate(&self) -> Result<()> {
        self.policy()?;
        self.mining_rule()?;
        Ok(())
    }

    /// Leveling policy described by `[leveling]`
    pub fn policy(&self) -> Result<LevelingPolicy> {
        LevelingPolicy::new(self.leveling.base_points).context("Invalid [leveling] section")
    }

    /// Autosave period, or None when disabled
    pub fn autosave_interval(&self) -> Option<Duration> {
        match self.daemon.autosave_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Block-break rule described by `[mining]`
    pub fn mining_rule(&self) -> Result<MiningRule> {
        let points = self.mining.points_per_block;
        if i64::try_from(points).is_err() {
            bail!(
                "Invalid [mining] section: points_per_block {} exceeds {}",
                points,
                i64::MAX
            );
        }
        Ok(MiningRule::new(
            points,
            &self.mining.block_patterns,
            &self.mining.tool_patterns,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.data_file, PathBuf::from("data/progression.json"));
        assert_eq!(config.leveling.base_points, 100);
        assert_eq!(config.daemon.autosave_interval_secs, 300);
        assert!(config.daemon.save_on_detach);
        assert_eq!(config.mining.points_per_block, 1);
        assert_eq!(config.mining.block_patterns.len(), 7);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
[store]
data_file = "/srv/game/xp.json"

[leveling]
base_points = 250
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.data_file, PathBuf::from("/srv/game/xp.json"));
        assert_eq!(config.policy().unwrap().threshold_for_level(2), 500);
        // Untouched sections keep defaults
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.mining.tool_patterns, vec!["Pickaxe", "Pick"]);
    }

    #[test]
    fn test_zero_base_points_rejected() {
        let config: Config = toml::from_str("[leveling]\nbase_points = 0\n").unwrap();
        assert!(config.policy().is_err());
    }

    #[test]
    fn test_autosave_disabled_with_zero() {
        let config: Config = toml::from_str("[daemon]\nautosave_interval_secs = 0\n").unwrap();
        assert_eq!(config.autosave_interval(), None);
        assert_eq!(
            Config::default().autosave_interval(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());

        let path = dir.path().join("config.toml");
        fs::write(&path, "[mining]\npoints_per_block = 3\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.mining.points_per_block, 3);
    }

    #[test]
    fn test_explicit_origin_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[daemon]\nlog_level = \"debug\"\n").unwrap();

        let (config, origin) = Config::resolve(Some(&path)).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(origin, ConfigOrigin::File(path));
    }

    #[test]
    fn test_oversized_points_per_block_rejected() {
        let mut config = Config::default();
        config.mining.points_per_block = u64::MAX;
        assert!(config.mining_rule().is_err());
        assert!(config.validate().is_err());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, format!("[mining]\npoints_per_block = {}\n", i64::MAX as u64 + 1)).unwrap();
        assert!(Config::load(Some(&path)).is_err());

        fs::write(&path, format!("[mining]\npoints_per_block = {}\n", i64::MAX)).unwrap();
        assert!(Config::load(Some(&path)).is_ok());
    }

    #[test]
    fn test_zero_base_points_fails_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[leveling]\nbase_points = 0\n").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_invalid_toml_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[leveling\nbase_points = ").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }
}
