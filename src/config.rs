/*
 * This file is part of Addin Monitor.
 *
 * Copyright (C) 2025 Addin Monitor contributors
 *
 * Addin Monitor is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Addin Monitor is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Addin Monitor. If not, see <https://www.gnu.org/licenses/>.
 */

use std::collections::HashSet;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::bus::MAX_BUS;
use crate::constants::paths::{CONFIG_ENV, CONFIG_FILE};
use crate::constants::vpd::{CAPACITY, DEFAULT_DEVICE_ID, FIELD_HEADER_LEN};
use crate::error::ConfigError;

/// Sensor limits in whole degrees Celsius. Missing limits read as 0.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub critical_high: i64,
    pub critical_low: i64,
    pub max_value: i64,
    pub min_value: i64,
    pub warning_high: i64,
    pub warning_low: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModuleEntry {
    #[serde(alias = "bittwareIndex")]
    pub index: usize,
    #[serde(alias = "bittwareBusID")]
    pub bus_id: usize,
}

/// The config file as written on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub config: Vec<ModuleEntry>,
    /// Shared by every module; the last record wins
    #[serde(default)]
    pub threshold: Vec<ThresholdConfig>,
    /// Identifier string the EEPROM must carry
    #[serde(default, rename = "deviceId")]
    pub device_id: Option<String>,
}

/// Static configuration of one module slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub index: usize,
    pub bus: usize,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub modules: Vec<DeviceConfig>,
    pub device_id: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { modules: Vec::new(), device_id: DEFAULT_DEVICE_ID.to_string() }
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from(CONFIG_FILE)
}

pub fn validate_config_file(file: &ConfigFile) -> Result<(), ConfigError> {
    if let Some(id) = &file.device_id {
        // identifier plus its field header must fit the EEPROM image
        if id.is_empty() || id.len() > CAPACITY - FIELD_HEADER_LEN {
            return Err(ConfigError::Invalid {
                field: "deviceId".to_string(),
                reason: format!("length must be 1..={}", CAPACITY - FIELD_HEADER_LEN),
            });
        }
    }
    Ok(())
}

/// Turn the on-disk records into module configs, dropping unusable entries.
pub fn resolve(file: ConfigFile) -> MonitorConfig {
    let thresholds = match file.threshold.last() {
        Some(t) => *t,
        None => {
            warn!("Config has no threshold record, using zero thresholds");
            ThresholdConfig::default()
        }
    };

    let mut seen = HashSet::new();
    let mut modules = Vec::with_capacity(file.config.len());
    for entry in file.config {
        if entry.bus_id >= MAX_BUS {
            warn!(
                "Module {}: bus {} is out of range (max {}), skipping",
                entry.index,
                entry.bus_id,
                MAX_BUS - 1
            );
            continue;
        }
        if !seen.insert(entry.bus_id) {
            warn!("Module {}: bus {} already configured, skipping", entry.index, entry.bus_id);
            continue;
        }
        modules.push(DeviceConfig { index: entry.index, bus: entry.bus_id, thresholds });
    }

    MonitorConfig {
        modules,
        device_id: file.device_id.unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
    }
}

pub fn try_load_config(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let data = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::Read { path: path.to_path_buf(), source: e },
    })?;
    let file: ConfigFile = serde_json::from_str(&data)?;
    validate_config_file(&file)?;
    Ok(resolve(file))
}

/// Load the config at `path`; any failure leaves the monitor with no modules.
pub fn load_config(path: &Path) -> MonitorConfig {
    match try_load_config(path) {
        Ok(cfg) => {
            info!("Loaded {} module(s) from {}", cfg.modules.len(), path.display());
            cfg
        }
        Err(e) => {
            warn!("{}; monitoring no modules", e);
            MonitorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::create_temp_config_file;
    use serial_test::serial;

    const SAMPLE: &str = r#"{
        "config": [{ "index": 0, "busId": 12 }, { "index": 1, "busId": 13 }],
        "threshold": [{ "criticalHigh": 95, "criticalLow": 0, "maxValue": 127,
                        "minValue": 0, "warningHigh": 85, "warningLow": 5 }]
    }"#;

    #[test]
    fn test_load_sample() {
        let file = create_temp_config_file(SAMPLE);
        let cfg = try_load_config(file.path()).unwrap();

        assert_eq!(cfg.modules.len(), 2);
        assert_eq!(cfg.modules[0].index, 0);
        assert_eq!(cfg.modules[0].bus, 12);
        assert_eq!(cfg.modules[1].bus, 13);
        assert_eq!(cfg.modules[1].thresholds.critical_high, 95);
        assert_eq!(cfg.device_id, DEFAULT_DEVICE_ID);
    }

    #[test]
    fn test_last_threshold_wins() {
        let file = create_temp_config_file(
            r#"{
            "config": [{ "index": 0, "busId": 1 }],
            "threshold": [
                { "criticalHigh": 1, "criticalLow": 1, "maxValue": 1,
                  "minValue": 1, "warningHigh": 1, "warningLow": 1 },
                { "criticalHigh": 2, "criticalLow": 2, "maxValue": 2,
                  "minValue": 2, "warningHigh": 2, "warningLow": 2 }
            ]}"#,
        );
        let cfg = try_load_config(file.path()).unwrap();
        assert_eq!(cfg.modules[0].thresholds.warning_low, 2);
    }

    #[test]
    fn test_missing_thresholds_use_zero() {
        let file = create_temp_config_file(r#"{ "config": [{ "index": 3, "busId": 4 }] }"#);
        let cfg = try_load_config(file.path()).unwrap();
        assert_eq!(cfg.modules[0].thresholds, ThresholdConfig::default());
    }

    #[test]
    fn test_out_of_range_and_duplicate_buses_are_skipped() {
        let file = create_temp_config_file(
            r#"{ "config": [
                { "index": 0, "busId": 30 },
                { "index": 1, "busId": 2 },
                { "index": 2, "busId": 2 }
            ] }"#,
        );
        let cfg = try_load_config(file.path()).unwrap();
        assert_eq!(cfg.modules.len(), 1);
        assert_eq!(cfg.modules[0].index, 1);
    }

    #[test]
    fn test_legacy_module_keys() {
        let file = create_temp_config_file(
            r#"{
            "config": [{ "bittwareIndex": 0, "bittwareBusID": 12 },
                       { "bittwareIndex": 1, "busId": 13 }],
            "threshold": [{ "criticalHigh": 95 }]
        }"#,
        );
        let cfg = try_load_config(file.path()).unwrap();
        assert_eq!(cfg.modules.len(), 2);
        assert_eq!((cfg.modules[0].index, cfg.modules[0].bus), (0, 12));
        assert_eq!((cfg.modules[1].index, cfg.modules[1].bus), (1, 13));
    }

    #[test]
    fn test_missing_threshold_keys_default_to_zero() {
        let file = create_temp_config_file(
            r#"{ "config": [{ "index": 0, "busId": 1 }],
                 "threshold": [{ "criticalHigh": 95, "warningHigh": 85 }] }"#,
        );
        let thresholds = try_load_config(file.path()).unwrap().modules[0].thresholds;
        assert_eq!(
            thresholds,
            ThresholdConfig { critical_high: 95, warning_high: 85, ..ThresholdConfig::default() }
        );
    }

    #[test]
    fn test_device_id_override() {
        let file = create_temp_config_file(r#"{ "config": [], "deviceId": "XYZ" }"#);
        assert_eq!(try_load_config(file.path()).unwrap().device_id, "XYZ");

        let file = create_temp_config_file(r#"{ "deviceId": "" }"#);
        assert!(matches!(
            try_load_config(file.path()),
            Err(ConfigError::Invalid { ref field, .. }) if field == "deviceId"
        ));
    }

    #[test]
    fn test_malformed_and_unknown_fields() {
        let file = create_temp_config_file("{ \"config\": [");
        assert!(matches!(try_load_config(file.path()), Err(ConfigError::Malformed(_))));

        let file = create_temp_config_file(r#"{ "config": [{ "index": 0, "bus": 1 }] }"#);
        assert!(matches!(try_load_config(file.path()), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("/nonexistent/addin-monitor/config.json");
        assert!(matches!(try_load_config(path), Err(ConfigError::NotFound(_))));
        assert!(load_config(path).modules.is_empty());
    }

    #[test]
    fn test_load_config_swallows_errors() {
        let file = create_temp_config_file("not json");
        let cfg = load_config(file.path());
        assert_eq!(cfg, MonitorConfig::default());
    }

    #[test]
    #[serial]
    fn test_config_path_env_override() {
        env::set_var(CONFIG_ENV, "/tmp/custom.json");
        assert_eq!(config_path(), PathBuf::from("/tmp/custom.json"));
        env::set_var(CONFIG_ENV, "");
        assert_eq!(config_path(), PathBuf::from(CONFIG_FILE));
        env::remove_var(CONFIG_ENV);
        assert_eq!(config_path(), PathBuf::from(CONFIG_FILE));
    }
}
