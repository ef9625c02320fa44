use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Engine-wide knobs, persisted as RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bpm: f64,
    pub sample_rate: f64,
    /// Choke-cut fade length in seconds.
    pub cut_fade: f64,
    /// Minimum attack/release ramp length in seconds.
    pub ramp_floor: f64,
    pub streaming: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            sample_rate: 48_000.0,
            cut_fade: 0.001,
            ramp_floor: 0.005,
            streaming: true,
        }
    }
}

impl EngineConfig {
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(ron::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }
}
