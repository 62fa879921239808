//! JSON file configuration adapter.
//!
//! Implements [`ConfigPort`] over a single JSON document holding the
//! [`StationConfig`].  Fields missing from the file take their defaults, so
//! an older file keeps loading after new settings are added.
//!
//! - Validation: the test config and calibration points are checked before
//!   anything is written; invalid values are rejected, never clamped.
//! - Atomic writes: the document goes to a sibling temp file which is then
//!   renamed over the existing file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::StationConfig;
use crate::error::RunFault;
use crate::sensors::calibration::{Calibrator, TransducerRange};

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate(config: &StationConfig) -> Result<(), ConfigError> {
        config.test.validate().map_err(|fault| match fault {
            RunFault::ConfigurationInvalid(msg) => ConfigError::ValidationFailed(msg),
            _ => ConfigError::ValidationFailed("test config rejected"),
        })?;

        let cal = &config.calibration;
        if cal.max_current_ma <= cal.min_current_ma {
            return Err(ConfigError::ValidationFailed(
                "max_current_ma must exceed min_current_ma",
            ));
        }
        if cal.adc_counts_20ma == cal.adc_counts_4ma {
            return Err(ConfigError::ValidationFailed(
                "adc_counts_4ma and adc_counts_20ma must differ",
            ));
        }
        if !cal.points.is_empty() {
            let range = TransducerRange {
                min_current_ma: cal.min_current_ma,
                max_current_ma: cal.max_current_ma,
                min_pressure_psi: cal.min_pressure_psi,
                max_pressure_psi: cal.max_pressure_psi,
            };
            Calibrator::new(range)
                .replace_points(&cal.points)
                .map_err(|_| ConfigError::ValidationFailed("calibration points rejected"))?;
        }
        Ok(())
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<StationConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no config at {}, using defaults", self.path.display());
                return Ok(StationConfig::default());
            }
            Err(e) => {
                warn!("config read failed: {e}");
                return Err(ConfigError::IoError);
            }
        };
        let config: StationConfig = serde_json::from_str(&text).map_err(|e| {
            warn!("config {} is corrupted: {e}", self.path.display());
            ConfigError::Corrupted
        })?;
        info!("config loaded from {}", self.path.display());
        Ok(config)
    }

    fn save(&self, config: &StationConfig) -> Result<(), ConfigError> {
        Self::validate(config)?;
        let text = serde_json::to_string_pretty(config).map_err(|_| ConfigError::IoError)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                warn!("config write failed: {e}");
                ConfigError::IoError
            })?;
        info!("config saved to {}", self.path.display());
        Ok(())
    }
}
