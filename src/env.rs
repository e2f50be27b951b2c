/*
 * This file is part of hwmond.
 *
 * Copyright (C) 2025 hwmond contributors
 *
 * hwmond is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * hwmond is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with hwmond. If not, see <https://www.gnu.org/licenses/>.
 */

//! Sensor and device configuration from the process environment.
//!
//! Sensor-scoped keys are `<PREFIX>_<type><id>` (`LABEL_temp1`,
//! `WARNHI_fan3`); device-scoped keys carry no suffix (`INTERVAL`).
//! When a direct sensor-scoped variable is absent and the sensor has a
//! `<type><id>_label` file, the file's content re-keys the lookup, so
//! boards can configure by label rather than by instance number.
//! Malformed values are fatal at startup.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::hwmon::{entry, SensorKey};
use crate::sysfs;
use crate::thresholds::Bounds;

pub const DEFAULT_INTERVAL_US: u64 = 1_000_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
    #[error("inverted bounds for {key}: {low} > {high}")]
    InvertedBounds { key: String, low: i64, high: i64 },
}

fn non_empty(value: Result<String, env::VarError>) -> Option<String> {
    value.ok().filter(|v| !v.is_empty())
}

/// Direct sensor-scoped lookup: `<prefix>_<type><id>`.
fn sensor_env(prefix: &str, key: &SensorKey) -> Option<String> {
    non_empty(env::var(format!("{}_{}{}", prefix, key.0, key.1)))
}

/// Re-keyed lookup through the sensor's label file: the trimmed file
/// content replaces the instance id in the variable name.
fn indirect_sensor_env(prefix: &str, instance: &Path, key: &SensorKey) -> Option<String> {
    let label_path = sysfs::attribute_path(instance, &key.0, &key.1, entry::LABEL);
    let token = fs::read_to_string(label_path).ok()?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    non_empty(env::var(format!("{}_{}{}", prefix, key.0, token)))
}

/// Sensor-scoped lookup, direct first, then via the label file.
pub fn lookup(prefix: &str, instance: &Path, key: &SensorKey) -> Option<String> {
    sensor_env(prefix, key).or_else(|| indirect_sensor_env(prefix, instance, key))
}

/// Device-scoped lookup (no sensor suffix).
pub fn device_env(name: &str) -> Option<String> {
    non_empty(env::var(name))
}

fn parse<T: FromStr>(key: String, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_lookup<T: FromStr>(
    prefix: &str,
    instance: &Path,
    key: &SensorKey,
) -> Result<Option<T>, ConfigError> {
    lookup(prefix, instance, key)
        .map(|v| parse(format!("{}_{}{}", prefix, key.0, key.1), v))
        .transpose()
}

/// Both bounds are required; a single one configures nothing.
fn parse_bounds(
    lo_prefix: &str,
    hi_prefix: &str,
    instance: &Path,
    key: &SensorKey,
) -> Result<Option<Bounds>, ConfigError> {
    let low = parse_lookup::<i64>(lo_prefix, instance, key)?;
    let high = parse_lookup::<i64>(hi_prefix, instance, key)?;
    match (low, high) {
        (Some(low), Some(high)) => {
            if low > high {
                return Err(ConfigError::InvertedBounds {
                    key: format!("{}_{}{}", lo_prefix, key.0, key.1),
                    low,
                    high,
                });
            }
            Ok(Some(Bounds { low, high }))
        }
        _ => Ok(None),
    }
}

fn parse_rcs(key: String, value: Option<String>) -> Result<HashSet<i32>, ConfigError> {
    let Some(value) = value else {
        return Ok(HashSet::new());
    };
    value
        .split(',')
        .map(|tok| {
            tok.trim().parse::<i32>().map_err(|_| ConfigError::Invalid {
                key: key.clone(),
                value: value.clone(),
            })
        })
        .collect()
}

/// GPIO gating for sensors whose signal sits behind a chip-select line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioConfig {
    pub chip: String,
    pub line: u32,
}

/// Everything the environment says about one sensor.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub label: Option<String>,
    pub warn: Option<Bounds>,
    pub crit: Option<Bounds>,
    pub gain: f64,
    pub offset: i64,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub average: bool,
    pub enable: Option<u64>,
    pub remove_rcs: HashSet<i32>,
    pub gpio: Option<GpioConfig>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            label: None,
            warn: None,
            crit: None,
            gain: 1.0,
            offset: 0,
            min_value: None,
            max_value: None,
            average: false,
            enable: None,
            remove_rcs: HashSet::new(),
            gpio: None,
        }
    }
}

impl SensorConfig {
    pub fn from_env(instance: &Path, key: &SensorKey) -> Result<Self, ConfigError> {
        let gpio = match (
            lookup("GPIOCHIP", instance, key),
            lookup("GPIO", instance, key),
        ) {
            (Some(chip), Some(line)) => Some(GpioConfig {
                chip,
                line: parse(format!("GPIO_{}{}", key.0, key.1), line)?,
            }),
            _ => None,
        };

        Ok(SensorConfig {
            label: lookup("LABEL", instance, key),
            warn: parse_bounds("WARNLO", "WARNHI", instance, key)?,
            crit: parse_bounds("CRITLO", "CRITHI", instance, key)?,
            gain: parse_lookup("GAIN", instance, key)?.unwrap_or(1.0),
            offset: parse_lookup("OFFSET", instance, key)?.unwrap_or(0),
            min_value: parse_lookup("MINVALUE", instance, key)?,
            max_value: parse_lookup("MAXVALUE", instance, key)?,
            average: lookup("AVERAGE", instance, key).as_deref() == Some("true"),
            enable: parse_lookup("ENABLE", instance, key)?,
            remove_rcs: parse_rcs(
                format!("REMOVERCS_{}{}", key.0, key.1),
                lookup("REMOVERCS", instance, key),
            )?,
            gpio,
        })
    }
}

/// Device-wide settings.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Polling period in microseconds.
    pub interval_us: u64,
    pub remove_rcs: HashSet<i32>,
}

impl DeviceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let interval_us = device_env("INTERVAL")
            .map(|v| parse("INTERVAL".to_string(), v))
            .transpose()?
            .unwrap_or(DEFAULT_INTERVAL_US);

        Ok(DeviceConfig {
            interval_us,
            remove_rcs: parse_rcs("REMOVERCS".to_string(), device_env("REMOVERCS"))?,
        })
    }
}
