use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::effects::stages::analyser::DEFAULT_FFT_SIZE;

const APP_DIR: &str = "webdyn";

impl std::fmt::Display for AnalyserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "FFT Size: {}", self.fft_size)?;
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    /// Rate of simulated processing contexts.
    pub sample_rate: u32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            sample_rate: 48000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON file backing the settings store.
    pub storage_path: PathBuf,
    pub analyser: AnalyserConfig,
    /// Delay before re-selecting after the bound element went away.
    pub reselect_delay_ms: u64,
    pub meter_interval_ms: u64,
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------------------------------")?;

        writeln!(f, "Analyser:")?;
        writeln!(f, "{}", self.analyser)?;

        writeln!(f, "Storage Path: {}", self.storage_path.display())?;
        writeln!(f, "Reselect Delay: {} ms", self.reselect_delay_ms)?;
        writeln!(f, "Meter Interval: {} ms", self.meter_interval_ms)?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_path: config_dir().join("storage.json"),
            analyser: AnalyserConfig::default(),
            reselect_delay_ms: 100,
            meter_interval_ms: 100,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path).context("Failed to read config file")?;
            let config: AppConfig =
                serde_json::from_str(&contents).context("Failed to parse config")?;
            debug!("Loaded config from {:?}", path);
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            let config = AppConfig::default();
            // Try to save defaults, but don't fail if we can't
            let _ = config.save_to(path);
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, json).context("Failed to write config file")?;

        debug!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn get_config_path() -> PathBuf {
        config_dir().join("config.json")
    }
}

fn config_dir() -> PathBuf {
    // Try to use XDG config directory on Linux
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join(APP_DIR)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join(APP_DIR)
    } else {
        PathBuf::from(".")
    }
}
