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

//! Sysfs GPIO gating for fan tachometers behind a chip-select line.
//!
//! The configured line is driven high before a gated read and low again
//! afterwards. Driving high waits a fixed stabilization delay so the
//! tach signal settles before the counter is sampled.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::env::GpioConfig;
use crate::hwmon::SensorKey;

const STABILIZATION: Duration = Duration::from_millis(500);

/// Owns the exported GPIO lines of gated sensors.
#[derive(Debug, Default)]
pub struct GpioManager {
    root: PathBuf,
    access: HashMap<SensorKey, PathBuf>,
}

impl GpioManager {
    pub fn new() -> Self {
        Self::with_root("/sys/class/gpio")
    }

    /// Rooted elsewhere in tests.
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        GpioManager {
            root: root.into(),
            access: HashMap::new(),
        }
    }

    /// The chip's `base` file holds the global number of its first line.
    fn chip_base(&self, chip: &str) -> io::Result<i64> {
        let base = fs::read_to_string(self.root.join(format!("gpiochip{}", chip)).join("base"))?;
        base.trim()
            .parse::<i64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad gpio chip base"))
    }

    /// Export the sensor's line if needed and remember its directory.
    pub fn setup(&mut self, key: &SensorKey, cfg: &GpioConfig) -> io::Result<()> {
        let base = self.chip_base(&cfg.chip)?;
        let absolute = base + i64::from(cfg.line);
        let line_dir = self.root.join(format!("gpio{}", absolute));
        if !line_dir.exists() {
            fs::write(self.root.join("export"), absolute.to_string())?;
        }
        self.access.insert(key.clone(), line_dir);
        Ok(())
    }

    pub fn is_gated(&self, key: &SensorKey) -> bool {
        self.access.contains_key(key)
    }

    /// Drive the line high and wait for the signal to stabilize.
    pub fn unlock(&self, key: &SensorKey) -> io::Result<()> {
        self.set(key, "high", true)
    }

    /// Drive the line low again. No settling needed on the way down.
    pub fn lock(&self, key: &SensorKey) -> io::Result<()> {
        self.set(key, "low", false)
    }

    fn set(&self, key: &SensorKey, value: &str, pause: bool) -> io::Result<()> {
        let Some(line_dir) = self.access.get(key) else {
            return Ok(());
        };
        write_direction(line_dir, value)?;
        if pause {
            thread::sleep(STABILIZATION);
        }
        Ok(())
    }
}

fn write_direction(line_dir: &Path, value: &str) -> io::Result<()> {
    fs::write(line_dir.join("direction"), value)
}
