//! Engine configuration.
//!
//! Loaded from TOML; every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! [scan]
//! rearm_delay_ms = 750
//!
//! [screen]
//! width = 2560
//! height = 1440
//!
//! [calibration]
//! min_samples = 40
//! ```

use crate::error::{InputError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub polling: PollingConfig,
    pub queue: QueueConfig,
    pub screen: ScreenConfig,
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Pause after a scan `Select` before scanning restarts from the first target.
    pub rearm_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rearm_delay_ms: 750,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Cadence of continuous-device poll tasks (~60 Hz).
    pub frame_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Inset of the outer grid points from the screen edges.
    pub margin_px: f32,
    /// Samples needed before a point is complete.
    pub min_samples: u32,
    /// A point that has not collected `min_samples` by then aborts the run.
    pub point_timeout_ms: u64,
    /// Samples arriving this soon after a point is shown are discarded.
    pub settle_ms: u64,
    /// Mean error at which a point scores 0.
    pub max_tolerable_px: f32,
    /// Aggregate accuracy below this is committed with a warning.
    pub low_accuracy_threshold: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            margin_px: 100.0,
            min_samples: 50,
            point_timeout_ms: 5000,
            settle_ms: 300,
            max_tolerable_px: 150.0,
            low_accuracy_threshold: 0.6,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            InputError::persistence(format!("reading config {}", path.display()), e)
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.polling.frame_interval_ms == 0 {
            return Err(InputError::invalid_config("polling.frame_interval_ms must be positive"));
        }
        if self.queue.capacity == 0 {
            return Err(InputError::invalid_config("queue.capacity must be positive"));
        }
        let s = &self.screen;
        if !(s.width > 0.0 && s.height > 0.0) {
            return Err(InputError::invalid_config("screen size must be positive"));
        }
        let c = &self.calibration;
        if c.min_samples == 0 {
            return Err(InputError::invalid_config("calibration.min_samples must be positive"));
        }
        if c.point_timeout_ms == 0 || c.point_timeout_ms <= c.settle_ms {
            return Err(InputError::invalid_config(
                "calibration.point_timeout_ms must exceed settle_ms",
            ));
        }
        if !(c.max_tolerable_px > 0.0) {
            return Err(InputError::invalid_config("calibration.max_tolerable_px must be positive"));
        }
        if c.margin_px < 0.0 || c.margin_px * 2.0 >= s.width.min(s.height) {
            return Err(InputError::invalid_config(
                "calibration.margin_px must leave a usable screen area",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = EngineConfig::from_toml_str(
            "[calibration]\nmin_samples = 20\n[screen]\nwidth = 1280.0\nheight = 800.0\n",
        )
        .unwrap();
        assert_eq!(cfg.calibration.min_samples, 20);
        assert_eq!(cfg.calibration.point_timeout_ms, 5000);
        assert_eq!(cfg.screen.width, 1280.0);
        assert_eq!(cfg.scan.rearm_delay_ms, 750);
    }

    #[test]
    fn oversized_margin_is_invalid() {
        let err = EngineConfig::from_toml_str("[calibration]\nmargin_px = 600.0\n").unwrap_err();
        assert!(matches!(err, InputError::InvalidConfiguration { .. }));
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("[scan\n").unwrap_err();
        assert!(matches!(err, InputError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.toml");
        std::fs::write(&path, "[scan]\nrearm_delay_ms = 100\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().scan.rearm_delay_ms, 100);
    }
}
