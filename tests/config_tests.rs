// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use vkfilters::config::{BilateralSettings, GaussianSettings};
use vkfilters::{Config, DeviceSelector};

fn scratch_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("vkfilters-test-{}-{}", std::process::id(), name))
        .join("config.json")
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.device_selector(), DeviceSelector::Default);
    assert!(config.compile.use_fp16_storage);
    assert!(!config.compile.use_fp16_arithmetic);
}

#[test]
fn test_missing_file_yields_defaults() {
    let path = scratch_path("missing");
    let config = Config::load_from(&path).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let path = scratch_path("save");
    let mut config = Config::default();
    config.device = 1;
    config.bilateral = BilateralSettings {
        ksize: 9,
        sigma_spatial: 3.0,
        sigma_color: 25.0,
    };
    config.gaussian = GaussianSettings {
        radius: 5,
        sigma: 2.0,
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.device_selector(), DeviceSelector::Index(1));

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_malformed_file_is_an_error() {
    let path = scratch_path("malformed");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ device: ").unwrap();

    assert!(Config::load_from(&path).is_err());

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}
