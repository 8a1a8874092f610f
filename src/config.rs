// SPDX-License-Identifier: GPL-3.0-only

//! Persistent settings
//!
//! Stored as JSON at `<config dir>/vkfilters/config.json`. A missing file
//! yields defaults; `VKFILTERS_DEVICE` overrides the device index.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compute::CompileOptions;
use crate::constants::{config as paths, defaults};
use crate::errors::{FilterError, FilterResult};
use crate::filters::HarrisParams;
use crate::gpu::DeviceSelector;

/// Bilateral filter defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralSettings {
    /// Window size; 0 derives it from the spatial sigma
    pub ksize: i32,
    pub sigma_spatial: f32,
    pub sigma_color: f32,
}

impl Default for BilateralSettings {
    fn default() -> Self {
        Self {
            ksize: defaults::BILATERAL_KSIZE,
            sigma_spatial: defaults::BILATERAL_SIGMA_SPATIAL,
            sigma_color: defaults::BILATERAL_SIGMA_COLOR,
        }
    }
}

/// Gaussian blur defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianSettings {
    pub radius: u32,
    /// Non-positive derives the spread from the kernel size
    pub sigma: f32,
}

impl Default for GaussianSettings {
    fn default() -> Self {
        Self {
            radius: defaults::GAUSSIAN_RADIUS,
            sigma: defaults::GAUSSIAN_SIGMA,
        }
    }
}

/// Star effect defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarSettings {
    pub intensity: f32,
    pub ray_count: f32,
    pub colour: [f32; 4],
}

impl Default for StarSettings {
    fn default() -> Self {
        Self {
            intensity: defaults::STAR_INTENSITY,
            ray_count: defaults::STAR_RAY_COUNT,
            colour: defaults::STAR_COLOUR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Adapter index, negative for the default device
    pub device: i32,
    pub compile: CompileOptions,
    pub harris: HarrisParams,
    pub bilateral: BilateralSettings,
    pub gaussian: GaussianSettings,
    pub star: StarSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: -1,
            compile: CompileOptions::default(),
            harris: HarrisParams::default(),
            bilateral: BilateralSettings::default(),
            gaussian: GaussianSettings::default(),
            star: StarSettings::default(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::APP_DIR).join(paths::FILE_NAME))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> FilterResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save_to(&self, path: &Path) -> FilterResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Save to the default location
    pub fn save(&self) -> FilterResult<()> {
        let path = Self::default_path()
            .ok_or_else(|| FilterError::Config("no config directory".to_string()))?;
        self.save_to(&path)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(paths::DEVICE_ENV) {
            self.apply_device_override(&value);
        }
    }

    /// Parse a device index override, keeping the current value on garbage
    pub fn apply_device_override(&mut self, value: &str) {
        match value.trim().parse::<i32>() {
            Ok(device) => self.device = device,
            Err(_) => warn!(value, var = paths::DEVICE_ENV, "Ignoring invalid device override"),
        }
    }

    pub fn device_selector(&self) -> DeviceSelector {
        DeviceSelector::from(self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selects_default_device() {
        assert_eq!(Config::default().device_selector(), DeviceSelector::Default);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{ "device": 1, "harris": { "threshold": 0.5 } }"#).unwrap();
        assert_eq!(config.device_selector(), DeviceSelector::Index(1));
        assert_eq!(config.harris.threshold, 0.5);
        assert_eq!(config.harris.blur_radius, defaults::HARRIS_BLUR_RADIUS);
        assert_eq!(config.star, StarSettings::default());
    }

    #[test]
    fn test_device_override() {
        let mut config = Config::default();
        config.apply_device_override(" 2 ");
        assert_eq!(config.device, 2);
        config.apply_device_override("gpu");
        assert_eq!(config.device, 2);
    }

    #[test]
    fn test_default_path_layout() {
        if let Some(path) = Config::default_path() {
            assert!(path.ends_with("vkfilters/config.json"));
        }
    }
}
