use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::typing::{constrain_type_timeout, constrain_wait_timeout, DEFAULT_TYPE_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS};

/// Requested boost is kept within this many dB either way
pub const MAX_BOOST_DB: i32 = 30;

/// How buffers are sourced for a newly opened file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PumpPreference {
    /// Tap the decoder when the platform allows it, else read PCM natively
    #[default]
    Auto,
    Native,
    Intercepted,
}

impl PumpPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            PumpPreference::Auto => "auto",
            PumpPreference::Native => "native",
            PumpPreference::Intercepted => "intercepted",
        }
    }
}

/// Settings persisted between sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscribeConfig {
    pub wait_timeout_ms: u64,
    pub type_timeout_ms: u64,
    pub boost_db: i32,
    pub boost_step_db: i32,
    /// Linear amount the amplifier backs off per step while too many samples clip
    pub clip_reduction_step: f64,
    pub seek_step_secs: u64,
    pub period_ms: u64,
    pub buffer_ms: u64,
    pub pump_mode: PumpPreference,
    pub output_device: Option<String>,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            type_timeout_ms: DEFAULT_TYPE_TIMEOUT_MS,
            boost_db: 0,
            boost_step_db: 1,
            clip_reduction_step: 0.1,
            seek_step_secs: 5,
            period_ms: 40,
            buffer_ms: 400,
            pump_mode: PumpPreference::Auto,
            output_device: None,
        }
    }
}

/// Loads, updates and saves the configuration file
pub struct ConfigManager {
    config: TranscribeConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::with_path(config_path)
    }

    /// Manage the configuration stored at `config_path`
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring unreadable config {}: {}", config_path.display(), e);
                TranscribeConfig::default()
            }
        };
        Ok(Self { config, config_path })
    }

    pub fn get_config(&self) -> &TranscribeConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut TranscribeConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    /// Store the wait timeout after applying the range and ordering rules;
    /// returns the value kept.
    pub fn set_wait_timeout(&mut self, ms: u64) -> Result<u64, ConfigError> {
        self.config.wait_timeout_ms = constrain_wait_timeout(ms, self.config.type_timeout_ms);
        self.save_config()?;
        Ok(self.config.wait_timeout_ms)
    }

    pub fn set_type_timeout(&mut self, ms: u64) -> Result<u64, ConfigError> {
        self.config.type_timeout_ms = constrain_type_timeout(ms, self.config.wait_timeout_ms);
        self.save_config()?;
        Ok(self.config.type_timeout_ms)
    }

    /// Persist both timeouts as the monitor currently holds them
    pub fn set_timeouts(&mut self, wait_ms: u64, type_ms: u64) -> Result<(), ConfigError> {
        if self.config.wait_timeout_ms == wait_ms && self.config.type_timeout_ms == type_ms {
            return Ok(());
        }
        self.config.wait_timeout_ms = wait_ms;
        self.config.type_timeout_ms = type_ms;
        self.save_config()
    }

    pub fn set_boost_db(&mut self, db: i32) -> Result<i32, ConfigError> {
        self.config.boost_db = db.clamp(-MAX_BOOST_DB, MAX_BOOST_DB);
        self.save_config()?;
        Ok(self.config.boost_db)
    }

    pub fn set_pump_mode(&mut self, mode: PumpPreference) -> Result<(), ConfigError> {
        self.update_config(|config| config.pump_mode = mode)
    }

    /// `None` goes back to the system default device
    pub fn set_output_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        let device = device.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        self.update_config(|config| config.output_device = device)
    }

    /// Skip distance for forward/back, at least one second; returns the value kept
    pub fn set_seek_step(&mut self, secs: u64) -> Result<u64, ConfigError> {
        let secs = secs.max(1);
        self.update_config(|config| config.seek_step_secs = secs)?;
        Ok(secs)
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = TranscribeConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("transcribe");

        std::fs::create_dir_all(&config_dir).map_err(ConfigError::IoError)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<TranscribeConfig, ConfigError> {
        if !path.exists() {
            return Ok(TranscribeConfig::default());
        }

        let config_content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let mut config: TranscribeConfig =
            toml::from_str(&config_content).map_err(ConfigError::DeserializationError)?;

        // Hand-edited files may break the timeout rules
        config.type_timeout_ms = constrain_type_timeout(config.type_timeout_ms, crate::typing::WAIT_TIMEOUT_MAX_MS);
        config.wait_timeout_ms = constrain_wait_timeout(config.wait_timeout_ms, config.type_timeout_ms);
        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let config_content = toml::to_string_pretty(&self.config).map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content).map_err(ConfigError::IoError)?;

        Ok(())
    }
}
