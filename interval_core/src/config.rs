//! Configuration file support for fourby.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/fourby/config.toml`.

use crate::{Error, HrZoneConfig, Result, TimerSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub timer: TimerSettings,

    #[serde(default)]
    pub zones: HrZoneConfig,

    #[serde(default)]
    pub cues: CueConfig,

    #[serde(default)]
    pub polling: PollConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Audio and vibration gates for phase cues
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CueConfig {
    #[serde(default = "default_true")]
    pub audio_enabled: bool,

    #[serde(default = "default_true")]
    pub vibration_enabled: bool,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            vibration_enabled: true,
        }
    }
}

/// Remote heart-rate polling parameters
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: i64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            lookback_minutes: default_lookback_minutes(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("fourby")
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_lookback_minutes() -> i64 {
    15
}

const MAX_PHASE_SEC: u32 = 3600;
const MAX_INTERVAL_COUNT: u32 = 10;
const MIN_MAX_HR: u32 = 100;
const MAX_MAX_HR: u32 = 250;

impl TimerSettings {
    /// Clamp settings to the ranges the settings form allows.
    ///
    /// The phase builder trusts its input, so this is applied wherever
    /// settings enter the system from outside.
    pub fn clamped(self) -> Self {
        Self {
            warmup_sec: self.warmup_sec.min(MAX_PHASE_SEC),
            interval_sec: self.interval_sec.min(MAX_PHASE_SEC),
            recovery_sec: self.recovery_sec.min(MAX_PHASE_SEC),
            cooldown_sec: self.cooldown_sec.min(MAX_PHASE_SEC),
            interval_count: self.interval_count.clamp(1, MAX_INTERVAL_COUNT),
        }
    }
}

impl HrZoneConfig {
    /// Clamp the zone configuration into a usable range.
    ///
    /// Fractions outside (0, 1) or an inverted range fall back to the
    /// defaults for the offending bounds.
    pub fn clamped(self) -> Self {
        let defaults = HrZoneConfig::default();
        let in_unit = |f: f64| f.is_finite() && f > 0.0 && f < 1.0;

        let (target_low, target_high) =
            if in_unit(self.target_low) && in_unit(self.target_high) && self.target_low < self.target_high {
                (self.target_low, self.target_high)
            } else {
                tracing::warn!(
                    "Invalid target zone {}..{}, using defaults",
                    self.target_low,
                    self.target_high
                );
                (defaults.target_low, defaults.target_high)
            };

        Self {
            max_hr: self.max_hr.clamp(MIN_MAX_HR, MAX_MAX_HR),
            target_low,
            target_high,
        }
    }
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("fourby").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Timer settings clamped to their allowed ranges
    pub fn timer_settings(&self) -> TimerSettings {
        self.timer.clamped()
    }

    /// Zone configuration clamped to its allowed ranges
    pub fn zone_config(&self) -> HrZoneConfig {
        self.zones.clamped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timer, TimerSettings::default());
        assert_eq!(config.zones.max_hr, 190);
        assert!(config.cues.audio_enabled);
        assert!(config.cues.vibration_enabled);
        assert_eq!(config.polling.interval_secs, 10);
        assert_eq!(config.polling.lookback_minutes, 15);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.timer, parsed.timer);
        assert_eq!(config.zones, parsed.zones);
        assert_eq!(config.cues, parsed.cues);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[timer]
warmup_sec = 300
interval_sec = 240
recovery_sec = 180
cooldown_sec = 300
interval_count = 6

[cues]
audio_enabled = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timer.interval_count, 6);
        assert_eq!(config.timer.warmup_sec, 300);
        assert!(!config.cues.audio_enabled);
        assert!(config.cues.vibration_enabled); // default
        assert_eq!(config.zones.target_high, 0.95); // default
    }

    #[test]
    fn test_save_and_load_from() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.zones.max_hr = 176;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.zones.max_hr, 176);
    }

    #[test]
    fn test_timer_settings_clamped() {
        let settings = TimerSettings {
            warmup_sec: 10_000,
            interval_sec: 240,
            recovery_sec: 0,
            cooldown_sec: 300,
            interval_count: 0,
        }
        .clamped();

        assert_eq!(settings.warmup_sec, 3600);
        assert_eq!(settings.recovery_sec, 0);
        assert_eq!(settings.interval_count, 1);
    }

    #[test]
    fn test_zone_config_clamped() {
        let zones = HrZoneConfig {
            max_hr: 300,
            target_low: 0.95,
            target_high: 0.85,
        }
        .clamped();

        assert_eq!(zones.max_hr, 250);
        assert_eq!(zones.target_low, 0.85);
        assert_eq!(zones.target_high, 0.95);
    }
}
