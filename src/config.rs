//! Core Configuration
//!
//! Loads and saves the coordinator's tuning knobs from `~/.miora/core.json`.
//! Every timer period, probability and bound the drivers use lives here so
//! a deployment can retune the simulation without rebuilding.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Config file name within the miora directory.
const CONFIG_FILENAME: &str = "core.json";

/// Returns the directory all miora state lives under: `~/.miora`.
pub fn get_miora_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(".miora")
}

/// Returns the full path to the core config file: `~/.miora/core.json`.
pub fn get_config_path() -> PathBuf {
    get_miora_dir().join(CONFIG_FILENAME)
}

/// Tuning knobs for the three drivers and the coordinator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// Growth driver tick period in seconds.
    pub growth_tick_secs: u64,
    /// Evolution generator tick period in seconds.
    pub evolution_tick_secs: u64,
    /// Upgrade loop tick period in seconds.
    pub upgrade_tick_secs: u64,
    /// Per-tick probability that the generator emits an event.
    pub evolution_chance: f64,
    /// Impact range for autonomous evolution events.
    pub evolution_impact_min: f64,
    pub evolution_impact_max: f64,
    /// Impact range for manually triggered evolution events.
    pub manual_impact_min: f64,
    pub manual_impact_max: f64,
    /// Upper bound of the per-tick module progress increment.
    pub progress_step_max: f64,
    /// Probability that a completed upgrade is rated HIGH impact.
    pub high_impact_chance: f64,
    /// Snapshot database path. A leading `~` resolves to the home dir.
    pub db_path: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            growth_tick_secs: 3,
            evolution_tick_secs: 6,
            upgrade_tick_secs: 3,
            evolution_chance: 0.35,
            evolution_impact_min: 5.0,
            evolution_impact_max: 25.0,
            manual_impact_min: 10.0,
            manual_impact_max: 25.0,
            progress_step_max: 15.0,
            high_impact_chance: 0.5,
            db_path: "~/.miora/state.db".to_string(),
        }
    }
}

/// Load the core config from disk.
///
/// Returns `None` if the config file does not exist or cannot be parsed;
/// callers fall back to [`CoreConfig::default`].
pub fn load_config() -> Option<CoreConfig> {
    let config_path = get_config_path();
    if !config_path.exists() {
        return None;
    }

    let contents = fs::read_to_string(&config_path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Save the core config to disk at `~/.miora/core.json`, creating the
/// directory if needed.
pub fn save_config(config: &CoreConfig) -> Result<()> {
    let dir = get_miora_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create miora directory")?;
    }

    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(get_config_path(), json).context("Failed to write config file")?;

    Ok(())
}

/// Resolve a path that may start with `~` to an absolute path.
pub fn resolve_path(p: &str) -> String {
    if let Some(rest) = p.strip_prefix('~') {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        home.join(rest).to_string_lossy().to_string()
    } else {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_periods() {
        let config = CoreConfig::default();
        assert_eq!(config.growth_tick_secs, 3);
        assert_eq!(config.evolution_tick_secs, 6);
        assert_eq!(config.upgrade_tick_secs, 3);
        assert_eq!(config.evolution_chance, 0.35);
        assert_eq!(config.high_impact_chance, 0.5);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = CoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("growthTickSecs"));
        let parsed: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.db_path, config.db_path);
        assert_eq!(parsed.evolution_impact_max, 25.0);
    }

    #[test]
    fn test_resolve_path_with_tilde() {
        let resolved = resolve_path("~/some/path");
        assert!(!resolved.starts_with('~'));
        assert!(resolved.ends_with("some/path"));
    }

    #[test]
    fn test_resolve_path_without_tilde() {
        let path = "/absolute/path/to/file";
        assert_eq!(resolve_path(path), path);
    }
}
