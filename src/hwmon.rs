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

//! hwmon vocabulary: attribute entry names, sensor keys, and the fixed
//! class table mapping a hwmon type to the unit, scale, and object
//! namespace it is published under.

use serde::Serialize;

/// Attribute file suffixes, i.e. the `<entry>` in `<type><id>_<entry>`.
pub mod entry {
    pub const INPUT: &str = "input";
    pub const LABEL: &str = "label";
    pub const FAULT: &str = "fault";
    pub const TARGET: &str = "target";
    pub const ENABLE: &str = "enable";
    pub const AVERAGE: &str = "average";
    pub const AVERAGE_INTERVAL: &str = "average_interval";
}

/// hwmon type prefixes.
pub mod types {
    pub const FAN: &str = "fan";
    pub const TEMP: &str = "temp";
    pub const VOLT: &str = "in";
    pub const CURR: &str = "curr";
    pub const POWER: &str = "power";
    pub const ENERGY: &str = "energy";
    /// Not a sensor type; pwm files carry fan control duty cycles.
    pub const PWM: &str = "pwm";
}

/// Identity of one logical sensor: the hwmon type prefix and the decimal
/// instance id, both kept as the text found in the file name.
pub type SensorKey = (String, String);

/// SI unit of a published value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    DegreesC,
    RPMS,
    Volts,
    Amperes,
    Watts,
    Joules,
    Meters,
}

/// One row of the class table. A published value V with scale S denotes
/// V * 10^S of the unit; the scale is metadata only, no division happens
/// on the read path.
#[derive(Debug)]
pub struct SensorClass {
    pub hwmon_type: &'static str,
    pub unit: Unit,
    pub scale: i64,
    pub namespace: &'static str,
}

pub static CLASS_TABLE: [SensorClass; 6] = [
    SensorClass {
        hwmon_type: types::TEMP,
        unit: Unit::DegreesC,
        scale: -3,
        namespace: "temperature",
    },
    SensorClass {
        hwmon_type: types::FAN,
        unit: Unit::RPMS,
        scale: 0,
        namespace: "fan_tach",
    },
    SensorClass {
        hwmon_type: types::VOLT,
        unit: Unit::Volts,
        scale: -3,
        namespace: "voltage",
    },
    SensorClass {
        hwmon_type: types::CURR,
        unit: Unit::Amperes,
        scale: -3,
        namespace: "current",
    },
    SensorClass {
        hwmon_type: types::POWER,
        unit: Unit::Watts,
        scale: -6,
        namespace: "power",
    },
    SensorClass {
        hwmon_type: types::ENERGY,
        unit: Unit::Joules,
        scale: -6,
        namespace: "energy",
    },
];

/// Look up the class row for a hwmon type. Types recognized at discovery
/// but absent here (humidity) have no published representation.
pub fn class_for(hwmon_type: &str) -> Option<&'static SensorClass> {
    CLASS_TABLE.iter().find(|c| c.hwmon_type == hwmon_type)
}
