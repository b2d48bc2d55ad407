//! Rewind configuration file handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use rewind_replay::ReplayConfig;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "rewind.toml";

/// Top-level Rewind configuration (rewind.toml)
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RewindConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Playback settings
#[derive(Debug, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// Playback rate; 1.0 is real time
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Scheduler tick in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_speed() -> f64 {
    1.0
}

fn default_tick_ms() -> u64 {
    2
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            tick_ms: default_tick_ms(),
        }
    }
}

/// Recording ingestion settings
#[derive(Debug, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Events pushed per refill
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Refill once fewer events than this are pending
    #[serde(default = "default_low_water")]
    pub low_water: usize,
    /// Record kinds to drop
    #[serde(default)]
    pub disabled_kinds: Vec<String>,
}

fn default_chunk_size() -> usize {
    256
}

fn default_low_water() -> usize {
    64
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            low_water: default_low_water(),
            disabled_kinds: Vec::new(),
        }
    }
}

impl RewindConfig {
    /// Load configuration from `path`.
    ///
    /// With no explicit path, `rewind.toml` in the working directory is used
    /// when present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default.to_path_buf()
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: RewindConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    /// Player configuration for these settings
    pub fn replay_config(&self) -> ReplayConfig {
        ReplayConfig::default()
            .with_speed(self.playback.speed)
            .with_tick_interval(Duration::from_millis(self.playback.tick_ms.max(1)))
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[playback]\nspeed = 4.0\n\n[history]\ndisabled_kinds = [\"getStatus\"]").unwrap();

        let config = RewindConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.playback.speed, 4.0);
        assert_eq!(config.playback.tick_ms, 2);
        assert_eq!(config.history.chunk_size, 256);
        assert_eq!(config.history.disabled_kinds, vec!["getStatus".to_string()]);

        let replay = config.replay_config();
        assert_eq!(replay.initial_speed, 4.0);
        assert_eq!(replay.tick_interval, Duration::from_millis(2));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RewindConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let text = RewindConfig::default().to_toml().unwrap();
        let parsed: RewindConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.history.low_water, 64);
    }
}
