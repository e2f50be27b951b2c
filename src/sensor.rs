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

//! The sensor factory: turn one discovered `(key, attributes)` pair
//! into a published object.
//!
//! A sensor without a configured label is skipped silently; published
//! objects must carry stable human-readable names, and machine
//! identifiers are not exposed in their place. A transient read failure
//! skips the sensor for this startup; failures of mandatory writes are
//! fatal.

use serde_json::json;
use thiserror::Error;

use crate::average::Average;
use crate::env::{ConfigError, SensorConfig};
use crate::gpio::GpioManager;
use crate::hwmon::{self, entry, types, SensorKey};
use crate::logger;
use crate::objects::{self, PublishedObject, Publisher, TargetState, ThresholdState};
use crate::sensorset::AttributeSet;
use crate::sysfs::{self, SysfsError, SysfsIo};
use crate::targets;
use crate::thresholds;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("fan enable write failed: {0}")]
    Enable(#[source] SysfsError),
}

/// Per-sensor poll mechanics kept by the main loop; the published state
/// itself lives in the publisher.
#[derive(Debug)]
pub struct Sensor {
    pub key: SensorKey,
    pub cfg: SensorConfig,
    /// Has an `input` attribute and participates in polling.
    pub readable: bool,
    /// Polls the running average instead of the instantaneous input.
    pub use_average: bool,
    pub has_fault: bool,
}

/// Gain, then offset, then clamp.
pub fn adjust_value(cfg: &SensorConfig, raw: i64) -> i64 {
    let mut value = (raw as f64 * cfg.gain) as i64 + cfg.offset;
    if let Some(min) = cfg.min_value {
        value = value.max(min);
    }
    if let Some(max) = cfg.max_value {
        value = value.min(max);
    }
    value
}

/// Read the configured source once, seeding the average state when the
/// sensor publishes interval averages.
pub fn read_source(
    io: &dyn SysfsIo,
    average: &mut Average,
    key: &SensorKey,
    use_average: bool,
) -> Result<i64, SysfsError> {
    if use_average {
        let avg = io.read(&key.0, &key.1, entry::AVERAGE, sysfs::RETRIES, sysfs::DELAY)?;
        let interval = io.read(
            &key.0,
            &key.1,
            entry::AVERAGE_INTERVAL,
            sysfs::RETRIES,
            sysfs::DELAY,
        )?;
        average.set(key.clone(), (avg, interval));
        Ok(avg)
    } else {
        io.read(&key.0, &key.1, entry::INPUT, sysfs::RETRIES, sysfs::DELAY)
    }
}

/// Build and publish one sensor. `Ok(None)` means the sensor was
/// skipped (no label, unsupported type, or a transient startup
/// failure); `Err` means startup must abort.
pub fn build(
    key: &SensorKey,
    attrs: &AttributeSet,
    io: &dyn SysfsIo,
    gpio: &mut GpioManager,
    average: &mut Average,
    publisher: &mut Publisher,
) -> Result<Option<Sensor>, SensorError> {
    let instance = io.instance();
    let cfg = SensorConfig::from_env(&instance, key)?;

    let Some(label) = cfg.label.clone() else {
        return Ok(None);
    };

    let Some(class) = hwmon::class_for(&key.0) else {
        logger::log_event(
            "unsupported_sensor_type",
            json!({ "type": key.0, "id": key.1 }),
        );
        return Ok(None);
    };

    if let Some(gpio_cfg) = &cfg.gpio {
        if let Err(e) = gpio.setup(key, gpio_cfg) {
            logger::log_event(
                "gpio_setup_failure",
                json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
            );
            return Ok(None);
        }
    }

    let readable = attrs.contains(entry::INPUT);
    let use_average = cfg.average
        && attrs.contains(entry::AVERAGE)
        && sysfs::attribute_path(&instance, &key.0, &key.1, entry::AVERAGE_INTERVAL).exists();

    let mut value = 0;
    if readable {
        let gated = gpio.is_gated(key);
        if gated {
            if let Err(e) = gpio.unlock(key) {
                logger::log_event(
                    "gpio_unlock_failure",
                    json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
                );
                return Ok(None);
            }
        }
        let raw = read_source(io, average, key, use_average);
        if gated {
            let _ = gpio.lock(key);
        }
        match raw {
            Ok(raw) => value = adjust_value(&cfg, raw),
            Err(e) => {
                logger::log_event(
                    "startup_read_failure",
                    json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
                );
                return Ok(None);
            }
        }
    }

    let warning = cfg.warn.map(|bounds| ThresholdState {
        bounds,
        alarms: thresholds::check(bounds, value),
    });
    let critical = cfg.crit.map(|bounds| ThresholdState {
        bounds,
        alarms: thresholds::check(bounds, value),
    });

    let has_fault = attrs.contains(entry::FAULT);
    let functional = if has_fault {
        // A failing fault read is reported but does not block
        // publication; the sensor starts out presumed functional.
        match io.read(&key.0, &key.1, entry::FAULT, sysfs::RETRIES, sysfs::DELAY) {
            Ok(fault) => Some(fault == 0),
            Err(e) => {
                logger::log_event(
                    "fault_read_failure",
                    json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
                );
                Some(true)
            }
        }
    } else {
        None
    };

    let mut target = None;
    if key.0 == types::FAN {
        if let Some(mode) = targets::select_mode(attrs, &instance, &key.1) {
            let initial = match targets::read_target(io, mode, &key.1, sysfs::RETRIES, sysfs::DELAY)
            {
                Ok(v) => v,
                Err(e) => {
                    logger::log_event(
                        "startup_read_failure",
                        json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
                    );
                    return Ok(None);
                }
            };
            if let Some(enable) = cfg.enable {
                targets::write_enable(io, &key.1, enable).map_err(SensorError::Enable)?;
            }
            target = Some(TargetState { mode, value: initial });
        }
    }

    let path = objects::object_path(class.namespace, &label);
    publisher.add_object(
        key.clone(),
        PublishedObject {
            path,
            value,
            unit: class.unit,
            scale: class.scale,
            warning,
            critical,
            functional,
            target,
        },
    );
    publisher.emit_object_added(key);

    Ok(Some(Sensor {
        key: key.clone(),
        cfg,
        readable,
        use_average,
        has_fault,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hwmon::Unit;
    use crate::objects::test_support::recording_publisher;
    use crate::objects::TargetMode;
    use crate::sysfs::HwmonIO;
    use crate::thresholds::{Alarms, Bounds};
    use serial_test::serial;
    use std::collections::BTreeSet;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn key(t: &str, id: &str) -> SensorKey {
        (t.to_string(), id.to_string())
    }

    fn attrs(names: &[&str]) -> AttributeSet {
        names.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
    }

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture { dir: TempDir::new().unwrap() }
        }

        fn io(&self) -> HwmonIO {
            HwmonIO::new(self.dir.path())
        }

        fn write(&self, name: &str, content: &str) {
            fs::write(self.dir.path().join(name), content).unwrap();
        }
    }

    #[test]
    fn test_adjust_value_defaults_are_identity() {
        let cfg = SensorConfig::default();
        assert_eq!(adjust_value(&cfg, 42000), 42000);
        assert_eq!(adjust_value(&cfg, -5), -5);
    }

    #[test]
    fn test_adjust_value_gain_then_offset() {
        let cfg = SensorConfig { gain: 2.0, offset: -100, ..Default::default() };
        assert_eq!(adjust_value(&cfg, 500), 900);
    }

    #[test]
    fn test_adjust_value_clamps() {
        let cfg = SensorConfig {
            gain: 1.0,
            min_value: Some(0),
            max_value: Some(1000),
            ..Default::default()
        };
        assert_eq!(adjust_value(&cfg, -50), 0);
        assert_eq!(adjust_value(&cfg, 5000), 1000);
        assert_eq!(adjust_value(&cfg, 400), 400);
    }

    #[test]
    #[serial]
    fn test_labeled_temp_sensor_published() {
        let f = Fixture::new();
        f.write("temp1_input", "42000\n");
        env::set_var("LABEL_temp1", "cpu");

        let (mut publisher, record) = recording_publisher();
        let sensor = build(
            &key("temp", "1"),
            &attrs(&["input"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        );
        env::remove_var("LABEL_temp1");

        let sensor = sensor.unwrap().unwrap();
        assert!(sensor.readable);
        assert!(!sensor.use_average);

        let obj = publisher.object(&key("temp", "1")).unwrap();
        assert_eq!(obj.path, "/org/hwmond/sensors/temperature/cpu");
        assert_eq!(obj.value, 42000);
        assert_eq!(obj.unit, Unit::DegreesC);
        assert_eq!(obj.scale, -3);
        assert!(obj.warning.is_none());
        assert!(obj.critical.is_none());
        assert!(obj.functional.is_none());
        assert!(obj.target.is_none());

        assert_eq!(record.added.borrow().len(), 1);
        assert!(record.changed.borrow().is_empty());
    }

    #[test]
    #[serial]
    fn test_unlabeled_sensor_skipped() {
        let f = Fixture::new();
        f.write("in0_input", "1200");
        env::remove_var("LABEL_in0");

        let (mut publisher, record) = recording_publisher();
        let sensor = build(
            &key("in", "0"),
            &attrs(&["input"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap();

        assert!(sensor.is_none());
        assert!(publisher.is_empty());
        assert!(record.added.borrow().is_empty());
    }

    #[test]
    #[serial]
    fn test_unsupported_type_skipped() {
        let f = Fixture::new();
        f.write("humidity1_input", "55");
        env::set_var("LABEL_humidity1", "ambient");

        let (mut publisher, _) = recording_publisher();
        let sensor = build(
            &key("humidity", "1"),
            &attrs(&["input"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap();
        env::remove_var("LABEL_humidity1");

        assert!(sensor.is_none());
        assert!(publisher.is_empty());
    }

    #[test]
    #[serial]
    fn test_thresholds_attached_with_initial_alarms() {
        let f = Fixture::new();
        f.write("temp2_input", "51000");
        env::set_var("LABEL_temp2", "vrm");
        env::set_var("WARNLO_temp2", "40000");
        env::set_var("WARNHI_temp2", "50000");

        let (mut publisher, record) = recording_publisher();
        build(
            &key("temp", "2"),
            &attrs(&["input"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap()
        .unwrap();
        for v in ["LABEL_temp2", "WARNLO_temp2", "WARNHI_temp2"] {
            env::remove_var(v);
        }

        let obj = publisher.object(&key("temp", "2")).unwrap();
        let warning = obj.warning.unwrap();
        assert_eq!(warning.bounds, Bounds { low: 40000, high: 50000 });
        assert_eq!(warning.alarms, Alarms { low: false, high: true });
        // Initial alarm state is set before publication and therefore
        // emits nothing.
        assert!(record.changed.borrow().is_empty());
        assert_eq!(record.added.borrow().len(), 1);
    }

    #[test]
    #[serial]
    fn test_config_parse_failure_is_fatal() {
        let f = Fixture::new();
        f.write("temp3_input", "1000");
        env::set_var("LABEL_temp3", "dimm");
        env::set_var("WARNLO_temp3", "x");
        env::set_var("WARNHI_temp3", "9");

        let (mut publisher, _) = recording_publisher();
        let res = build(
            &key("temp", "3"),
            &attrs(&["input"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        );
        for v in ["LABEL_temp3", "WARNLO_temp3", "WARNHI_temp3"] {
            env::remove_var(v);
        }
        assert!(matches!(res, Err(SensorError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_fault_attribute_attaches_status() {
        let f = Fixture::new();
        f.write("fan1_input", "1200");
        f.write("fan1_fault", "1");
        env::set_var("LABEL_fan1", "rotor0");

        let (mut publisher, _) = recording_publisher();
        build(
            &key("fan", "1"),
            &attrs(&["input", "fault"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap()
        .unwrap();
        env::remove_var("LABEL_fan1");

        let obj = publisher.object(&key("fan", "1")).unwrap();
        assert_eq!(obj.functional, Some(false));
        assert_eq!(obj.path, "/org/hwmond/sensors/fan_tach/rotor0");
    }

    #[test]
    #[serial]
    fn test_fan_speed_target_attached_and_seeded() {
        let f = Fixture::new();
        f.write("fan2_input", "900");
        f.write("fan2_target", "1500");
        env::set_var("LABEL_fan2", "rotor1");

        let (mut publisher, _) = recording_publisher();
        build(
            &key("fan", "2"),
            &attrs(&["input", "target"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap()
        .unwrap();
        env::remove_var("LABEL_fan2");

        let target = publisher.target(&key("fan", "2")).unwrap();
        assert_eq!(target.mode, TargetMode::Speed);
        assert_eq!(target.value, 1500);
    }

    #[test]
    #[serial]
    fn test_fan_pwm_fallback_with_enable_write() {
        let f = Fixture::new();
        f.write("fan3_input", "900");
        f.write("pwm3", "1");
        f.write("pwm3_enable", "0");
        env::set_var("LABEL_fan3", "rotor2");
        env::set_var("ENABLE_fan3", "2");

        let (mut publisher, _) = recording_publisher();
        build(
            &key("fan", "3"),
            &attrs(&["input"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap()
        .unwrap();
        env::remove_var("LABEL_fan3");
        env::remove_var("ENABLE_fan3");

        let target = publisher.target(&key("fan", "3")).unwrap();
        assert_eq!(target.mode, TargetMode::Pwm);
        assert_eq!(target.value, 1);
        assert_eq!(
            fs::read_to_string(f.dir.path().join("pwm3_enable")).unwrap(),
            "2"
        );
    }

    #[test]
    #[serial]
    fn test_average_source_seeds_state() {
        let f = Fixture::new();
        f.write("power1_input", "100");
        f.write("power1_average", "27624108");
        f.write("power1_average_interval", "132864155500");
        env::set_var("LABEL_power1", "psu0");
        env::set_var("AVERAGE_power1", "true");

        let (mut publisher, _) = recording_publisher();
        let mut average = Average::new();
        let sensor = build(
            &key("power", "1"),
            &attrs(&["input", "average"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut average,
            &mut publisher,
        )
        .unwrap()
        .unwrap();
        env::remove_var("LABEL_power1");
        env::remove_var("AVERAGE_power1");

        assert!(sensor.use_average);
        assert_eq!(
            average.get(&key("power", "1")),
            Some((27_624_108, 132_864_155_500))
        );
        assert_eq!(publisher.value(&key("power", "1")), Some(27_624_108));
    }

    #[test]
    #[serial]
    fn test_average_requested_but_interval_missing() {
        let f = Fixture::new();
        f.write("power2_input", "100");
        f.write("power2_average", "500");
        env::set_var("LABEL_power2", "psu1");
        env::set_var("AVERAGE_power2", "true");

        let (mut publisher, _) = recording_publisher();
        let sensor = build(
            &key("power", "2"),
            &attrs(&["input", "average"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap()
        .unwrap();
        env::remove_var("LABEL_power2");
        env::remove_var("AVERAGE_power2");

        // Falls back to the instantaneous input.
        assert!(!sensor.use_average);
        assert_eq!(publisher.value(&key("power", "2")), Some(100));
    }

    #[test]
    #[serial]
    fn test_gain_offset_applied_to_initial_value() {
        let f = Fixture::new();
        f.write("in1_input", "1000");
        env::set_var("LABEL_in1", "p12v");
        env::set_var("GAIN_in1", "12.0");
        env::set_var("OFFSET_in1", "5");

        let (mut publisher, _) = recording_publisher();
        build(
            &key("in", "1"),
            &attrs(&["input"]),
            &f.io(),
            &mut GpioManager::with_root(f.dir.path().join("gpio")),
            &mut Average::new(),
            &mut publisher,
        )
        .unwrap()
        .unwrap();
        for v in ["LABEL_in1", "GAIN_in1", "OFFSET_in1"] {
            env::remove_var(v);
        }

        assert_eq!(publisher.value(&key("in", "1")), Some(12005));
    }
}
