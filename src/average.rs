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

//! Interval-average bookkeeping for sensors that expose a running
//! average. The device reports a cumulative average since some epoch;
//! what gets published is the average over the last poll interval,
//! derived from two consecutive samples.

use std::collections::HashMap;

use crate::hwmon::SensorKey;

/// `(average, average_interval)` as last read from the device.
pub type AverageValue = (i64, i64);

/// Per-sensor previous-sample store.
#[derive(Debug, Default)]
pub struct Average {
    map: HashMap<SensorKey, AverageValue>,
}

impl Average {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SensorKey) -> Option<AverageValue> {
        self.map.get(key).copied()
    }

    pub fn set(&mut self, key: SensorKey, value: AverageValue) {
        self.map.insert(key, value);
    }
}

/// Average over the interval `delta = cur_interval - pre_interval`.
///
/// The direct form `(a2*i2 - a1*i1) / (i2 - i1)` overflows for large
/// interval counters, so it is rewritten as `(a2 - a1)*(i1/delta) + a2`:
/// the difference between consecutive running averages is small, which
/// keeps the intermediate product bounded. The ratio is computed in
/// floating point and the result truncated back to an integer.
///
/// `delta` must be positive; the caller checks that the interval counter
/// advanced before calling.
pub fn cal_average(pre_average: i64, pre_interval: i64, cur_average: i64, delta: i64) -> i64 {
    assert!(delta > 0);

    ((cur_average - pre_average) as f64 * (pre_interval as f64 / delta as f64)
        + cur_average as f64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(t: &str, id: &str) -> SensorKey {
        (t.to_string(), id.to_string())
    }

    #[test]
    fn test_unknown_key_has_no_state() {
        let mut av = Average::new();
        av.set(key("power", "0"), (0, 0));
        av.set(key("power", "1"), (0, 0));
        assert!(av.get(&key("power", "4")).is_none());
    }

    #[test]
    fn test_set_then_get() {
        let mut av = Average::new();
        av.set(key("power", "0"), (0, 0));
        av.set(key("power", "1"), (2, 2));
        assert_eq!(av.get(&key("power", "1")), Some((2, 2)));
    }

    #[test]
    fn test_set_overwrites() {
        let mut av = Average::new();
        av.set(key("power", "1"), (2, 2));
        av.set(key("power", "1"), (5, 9));
        assert_eq!(av.get(&key("power", "1")), Some((5, 9)));
    }

    #[test]
    #[should_panic]
    fn test_zero_delta_panics() {
        cal_average(1, 1, 2, 0);
    }

    #[test]
    #[should_panic]
    fn test_negative_delta_panics() {
        cal_average(1, 1, 2, -1);
    }

    #[test]
    fn test_interval_average() {
        // Samples captured from a power meter on a running system.
        assert_eq!(
            cal_average(27_624_108, 132_864_155_500, 27_626_120, 23_844_000),
            38_837_438
        );
    }

    #[test]
    fn test_constant_running_average_is_idempotent() {
        // If the running average did not move, the interval average is
        // that same value, whatever the intervals were.
        assert_eq!(cal_average(500, 1_000, 500, 250), 500);
        assert_eq!(cal_average(-7, 99, -7, 1), -7);
        assert_eq!(cal_average(0, 123_456_789, 0, 42), 0);
    }

    #[test]
    fn test_first_interval_from_epoch() {
        // With no accumulated history the interval average equals the
        // running average.
        assert_eq!(cal_average(0, 0, 1_234, 1_000), 1_234);
    }
}
