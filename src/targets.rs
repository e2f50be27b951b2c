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

//! Fan target plumbing: which sysfs attribute a controllable fan is
//! driven through, and the reads/writes against it.

use std::path::Path;
use std::time::Duration;

use crate::hwmon::{entry, types};
use crate::objects::TargetMode;
use crate::sensorset::AttributeSet;
use crate::sysfs::{self, SysfsError, SysfsIo};

/// Pick the controllable attribute for a fan: `fan<id>_target` wins
/// when present, `pwm<id>` is the fallback, otherwise the fan is not
/// controllable.
pub fn select_mode(attrs: &AttributeSet, instance: &Path, id: &str) -> Option<TargetMode> {
    if attrs.contains(entry::TARGET) {
        return Some(TargetMode::Speed);
    }
    if sysfs::instance_path(instance, types::PWM, id).exists() {
        return Some(TargetMode::Pwm);
    }
    None
}

fn attribute(mode: TargetMode) -> (&'static str, &'static str) {
    match mode {
        TargetMode::Speed => (types::FAN, entry::TARGET),
        TargetMode::Pwm => (types::PWM, ""),
    }
}

/// Seed the published target from the current sysfs state.
pub fn read_target(
    io: &dyn SysfsIo,
    mode: TargetMode,
    id: &str,
    retries: usize,
    delay: Duration,
) -> Result<u64, SysfsError> {
    let (hwmon_type, entry) = attribute(mode);
    let raw = io.read(hwmon_type, id, entry, retries, delay)?;
    Ok(raw.max(0) as u64)
}

/// Write a new target through to the fan.
pub fn write_target(
    io: &dyn SysfsIo,
    mode: TargetMode,
    id: &str,
    value: u64,
) -> Result<(), SysfsError> {
    let (hwmon_type, entry) = attribute(mode);
    io.write(value, hwmon_type, id, entry, sysfs::RETRIES, sysfs::DELAY)
}

/// One-time `pwm<id>_enable` write during fan initialization.
pub fn write_enable(io: &dyn SysfsIo, id: &str, value: u64) -> Result<(), SysfsError> {
    io.write(
        value,
        types::PWM,
        id,
        entry::ENABLE,
        sysfs::RETRIES,
        sysfs::DELAY,
    )
}
