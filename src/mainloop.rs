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

//! The poll loop: discover once at startup, then periodically refresh
//! every published sensor and forward inbound fan-target writes.
//!
//! Everything runs on one thread. The shutdown flag may be set from a
//! signal handler and is sampled at the top of each tick. A failed read
//! never takes the daemon down by itself; the affected object simply
//! keeps its previous state until a later tick succeeds.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::average::{self, Average};
use crate::env::{ConfigError, DeviceConfig};
use crate::gpio::GpioManager;
use crate::hwmon::{entry, SensorKey};
use crate::logger;
use crate::objects::{Publisher, SignalEmitter};
use crate::sensor::{self, Sensor, SensorError};
use crate::sensorset::SensorSet;
use crate::sysfs::{HwmonIO, SysfsError, SysfsIo, DELAY, RETRIES};
use crate::targets;
use crate::thresholds::{self, Severity};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("sensor enumeration failed: {0}")]
    Discovery(#[from] io::Error),
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct MainLoop {
    instance: PathBuf,
    io: HwmonIO,
    device: DeviceConfig,
    sensors: Vec<Sensor>,
    publisher: Publisher,
    average: Average,
    gpio: GpioManager,
    shutdown: Arc<AtomicBool>,
}

impl MainLoop {
    pub fn new(
        instance: PathBuf,
        emitter: Box<dyn SignalEmitter>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, ConfigError> {
        let io = HwmonIO::new(instance.clone());
        Ok(MainLoop {
            instance,
            io,
            device: DeviceConfig::from_env()?,
            sensors: Vec::new(),
            publisher: Publisher::new(emitter),
            average: Average::new(),
            gpio: GpioManager::new(),
            shutdown,
        })
    }

    /// Rooted GPIO access for tests.
    #[cfg(test)]
    fn with_gpio(mut self, gpio: GpioManager) -> Self {
        self.gpio = gpio;
        self
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Enumerate the instance and publish every configured sensor.
    pub fn init(&mut self) -> Result<(), StartupError> {
        let set = SensorSet::new(&self.instance)?;
        for (key, attrs) in set.iter() {
            if let Some(sensor) = sensor::build(
                key,
                attrs,
                &self.io,
                &mut self.gpio,
                &mut self.average,
                &mut self.publisher,
            )? {
                self.sensors.push(sensor);
            }
        }
        logger::log_event(
            "startup",
            json!({
                "instance": self.instance.display().to_string(),
                "discovered": set.len(),
                "published": self.sensors.len(),
                "interval_us": self.device.interval_us,
            }),
        );
        Ok(())
    }

    /// Poll until shutdown is requested.
    pub fn run(&mut self) {
        let interval = Duration::from_micros(self.device.interval_us);
        while !self.shutdown.load(Ordering::Relaxed) {
            self.tick();
            thread::sleep(interval);
        }
        logger::log_event("shutdown", json!({}));
    }

    /// One pass over every readable sensor.
    pub fn tick(&mut self) {
        for idx in 0..self.sensors.len() {
            if self.sensors[idx].readable {
                self.poll_one(idx);
            }
        }
    }

    fn poll_one(&mut self, idx: usize) {
        let key = self.sensors[idx].key.clone();

        let gated = self.gpio.is_gated(&key);
        if gated {
            if let Err(e) = self.gpio.unlock(&key) {
                logger::log_event(
                    "gpio_unlock_failure",
                    json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
                );
                return;
            }
        }
        let outcome = self.refresh(idx);
        if gated {
            if let Err(e) = self.gpio.lock(&key) {
                logger::log_event(
                    "gpio_lock_failure",
                    json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
                );
            }
        }

        if let Err(e) = outcome {
            let errno = e.errno();
            let listed = self.sensors[idx].cfg.remove_rcs.contains(&errno)
                || self.device.remove_rcs.contains(&errno);
            if !listed {
                logger::log_event(
                    "read_failure",
                    json!({ "type": key.0, "id": key.1, "error": e.to_string() }),
                );
            }
        }
    }

    /// The per-sensor pipeline: read the source, post-process, publish
    /// on change, re-evaluate thresholds, refresh the fault state.
    fn refresh(&mut self, idx: usize) -> Result<(), SysfsError> {
        let sensor = &self.sensors[idx];
        let key = sensor.key.clone();

        let mut raw = None;
        if sensor.use_average {
            let cur_average = self.io.read(&key.0, &key.1, entry::AVERAGE, RETRIES, DELAY)?;
            let cur_interval =
                self.io
                    .read(&key.0, &key.1, entry::AVERAGE_INTERVAL, RETRIES, DELAY)?;
            match self.average.get(&key) {
                Some((pre_average, pre_interval)) => {
                    let delta = cur_interval - pre_interval;
                    // A stalled interval counter means no new samples;
                    // the published value stands.
                    if delta > 0 {
                        raw = Some(average::cal_average(
                            pre_average,
                            pre_interval,
                            cur_average,
                            delta,
                        ));
                        self.average.set(key.clone(), (cur_average, cur_interval));
                    }
                }
                None => {
                    self.average.set(key.clone(), (cur_average, cur_interval));
                    raw = Some(cur_average);
                }
            }
        } else {
            raw = Some(self.io.read(&key.0, &key.1, entry::INPUT, RETRIES, DELAY)?);
        }

        if let Some(raw) = raw {
            let value = sensor::adjust_value(&sensor.cfg, raw);
            self.publisher.update_value(&key, value);
            for severity in [Severity::Warning, Severity::Critical] {
                if let Some(bounds) = self.publisher.bounds(&key, severity) {
                    self.publisher
                        .update_alarms(&key, severity, thresholds::check(bounds, value));
                }
            }
        }

        if self.sensors[idx].has_fault {
            let fault = self.io.read(&key.0, &key.1, entry::FAULT, RETRIES, DELAY)?;
            self.publisher.update_functional(&key, fault == 0);
        }

        Ok(())
    }

    /// Bus-initiated target write. The value is compared against the
    /// published target first; only a real change reaches sysfs, and
    /// only a successful write updates the property. Persistent write
    /// failure exits non-zero so the supervisor restarts the daemon in
    /// a clean state.
    pub fn write_target(&mut self, key: &SensorKey, value: u64) {
        let Some(target) = self.publisher.target(key) else {
            return;
        };
        if target.value == value {
            return;
        }
        if let Err(e) = targets::write_target(&self.io, target.mode, &key.1, value) {
            logger::log_event(
                "target_write_failure",
                json!({ "type": key.0, "id": key.1, "value": value, "error": e.to_string() }),
            );
            std::process::exit(libc::EXIT_FAILURE);
        }
        self.publisher.update_target(key, value);
    }
}
