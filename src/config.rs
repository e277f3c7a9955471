//! Application configuration.
//!
//! Read from `<config dir>/padmapper/config.toml`. Every field has a default,
//! so a missing or partial file still yields a usable configuration; when
//! the file does not exist at all a default one is written.

use crate::engine::classifier::ClassifierSettings;
use crate::timing::Hysteresis;
use crate::wheel::SelectorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "padmapper";
const MAIN_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Profile loaded at start-up when none is given on the command line.
    pub profile: Option<PathBuf>,
    pub engine: EngineSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub poll_rate_hz: u32,
    pub timing: TimingSettings,
    pub wheel: WheelSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_rate_hz: 120,
            timing: TimingSettings::default(),
            wheel: WheelSettings::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    pub chord_window_ms: u64,
    pub chord_release_delay_ms: u64,
    /// Analog samples further apart than this restart smoothing.
    pub max_sample_gap_ms: u64,
    pub trigger_press: f64,
    pub trigger_release: f64,
    pub event_buffer: usize,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            chord_window_ms: 150,
            chord_release_delay_ms: 40,
            max_sample_gap_ms: 100,
            trigger_press: 0.5,
            trigger_release: 0.35,
            event_buffer: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WheelSettings {
    pub selection_enter: f64,
    pub selection_exit: f64,
    pub full_deflection_enter: f64,
    pub full_deflection_exit: f64,
    pub full_hold_ms: u64,
    pub release_tolerance_ms: u64,
    pub alternate_swap_back_ms: u64,
}

impl Default for WheelSettings {
    fn default() -> Self {
        Self {
            selection_enter: 0.42,
            selection_exit: 0.34,
            full_deflection_enter: 0.94,
            full_deflection_exit: 0.88,
            full_hold_ms: 1000,
            release_tolerance_ms: 300,
            alternate_swap_back_ms: 300,
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.poll_rate_hz.max(1)))
    }

    pub fn max_sample_gap(&self) -> Duration {
        Duration::from_millis(self.timing.max_sample_gap_ms)
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            chord_window: Duration::from_millis(self.timing.chord_window_ms),
            chord_release_delay: Duration::from_millis(self.timing.chord_release_delay_ms),
        }
    }

    pub fn trigger_hysteresis(&self) -> Hysteresis {
        Hysteresis::new(self.timing.trigger_press, self.timing.trigger_release)
    }

    pub fn selector_settings(&self) -> SelectorSettings {
        let wheel = &self.wheel;
        SelectorSettings {
            selection: Hysteresis::new(wheel.selection_enter, wheel.selection_exit),
            full_deflection: Hysteresis::new(
                wheel.full_deflection_enter,
                wheel.full_deflection_exit,
            ),
            full_hold: Duration::from_millis(wheel.full_hold_ms),
            release_tolerance: Duration::from_millis(wheel.release_tolerance_ms),
            alternate_swap_back: Duration::from_millis(wheel.alternate_swap_back_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_rate_hz == 0 {
            return Err(ConfigError::Invalid("poll_rate_hz must be positive".into()));
        }
        if self.timing.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be positive".into()));
        }
        let bands = [
            ("trigger", self.timing.trigger_press, self.timing.trigger_release),
            ("selection", self.wheel.selection_enter, self.wheel.selection_exit),
            (
                "full_deflection",
                self.wheel.full_deflection_enter,
                self.wheel.full_deflection_exit,
            ),
        ];
        for (name, enter, exit) in bands {
            if !(0.0..=1.0).contains(&enter) || !(0.0..=1.0).contains(&exit) || enter < exit {
                return Err(ConfigError::Invalid(format!(
                    "{} band needs 0 <= exit <= enter <= 1, got enter {} exit {}",
                    name, enter, exit
                )));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(MAIN_CONFIG_FILE);
        path
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Loads `path`, writing a default config first when it does not exist.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            info!("Creating default configuration at {}", path.display());
            let config = AppConfig::default();
            config.save(path).await?;
            return Ok(config);
        }
        Self::load(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(
            config.engine.classifier_settings(),
            ClassifierSettings::default()
        );
        assert_eq!(
            config.engine.selector_settings(),
            SelectorSettings::default()
        );
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [engine]
            poll_rate_hz = 250

            [engine.timing]
            chord_window_ms = 90
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.poll_rate_hz, 250);
        assert_eq!(config.engine.timing.chord_window_ms, 90);
        assert_eq!(config.engine.timing.chord_release_delay_ms, 40);
        assert_eq!(config.engine.wheel, WheelSettings::default());
    }

    #[test]
    fn inverted_band_is_rejected() {
        let result = AppConfig::from_toml_str(
            r#"
            [engine.wheel]
            selection_enter = 0.3
            selection_exit = 0.5
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_poll_rate_is_rejected() {
        let result = AppConfig::from_toml_str("[engine]\npoll_rate_hz = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(MAIN_CONFIG_FILE);

        let created = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(created, AppConfig::default());
        assert!(path.exists());

        let mut changed = created.clone();
        changed.engine.timing.chord_window_ms = 120;
        changed.profile = Some(PathBuf::from("/tmp/desktop.toml"));
        changed.save(&path).await.unwrap();

        let reloaded = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded, changed);
    }
}
