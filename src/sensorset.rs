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

//! Sensor discovery: group the attribute files of one hwmon instance
//! directory by `(type, id)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::hwmon::{self, SensorKey};

lazy_static! {
    static ref SENSOR_PATTERN: Regex =
        Regex::new("^(fan|in|temp|power|energy|curr|humidity)([0-9]+)_([a-z]+)$").unwrap();
}

/// Attribute suffixes discovered for one sensor. `label` is metadata,
/// not a readable value, and is never stored here.
pub type AttributeSet = BTreeSet<String>;

/// The discovered sensors of one hwmon instance. BTreeMap keeps tick
/// iteration deterministic.
pub struct SensorSet {
    container: BTreeMap<SensorKey, AttributeSet>,
}

impl SensorSet {
    pub fn new(path: &Path) -> io::Result<Self> {
        let mut container: BTreeMap<SensorKey, AttributeSet> = BTreeMap::new();

        for dirent in fs::read_dir(path)? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let name = name.to_string_lossy();

            let Some(caps) = SENSOR_PATTERN.captures(&name) else {
                continue;
            };
            if &caps[3] == hwmon::entry::LABEL {
                continue;
            }

            container
                .entry((caps[1].to_string(), caps[2].to_string()))
                .or_default()
                .insert(caps[3].to_string());
        }

        Ok(SensorSet { container })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SensorKey, &AttributeSet)> {
        self.container.iter()
    }

    pub fn get(&self, key: &SensorKey) -> Option<&AttributeSet> {
        self.container.get(key)
    }

    pub fn len(&self) -> usize {
        self.container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }
}
