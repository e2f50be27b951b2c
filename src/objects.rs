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

//! Published sensor objects and their capability state.
//!
//! Each object is a set of optional capabilities around a mandatory
//! Value: threshold pairs, operational status, and a writable fan
//! target. The publisher owns all objects, compares every update with
//! the stored state, and emits a change notification only on an actual
//! transition. Notifications leave through the `SignalEmitter` seam so
//! the bus binding stays out of the core.

use std::collections::HashMap;

use serde_json::{json, Value as Json};

use crate::hwmon::{SensorKey, Unit};
use crate::logger;
use crate::thresholds::{Alarms, Bounds, Severity};

pub const BUS_ROOT: &str = "/org/hwmond/sensors";

/// Capability interface names as they appear on the bus.
pub mod iface {
    pub const VALUE: &str = "org.hwmond.Sensor.Value";
    pub const WARNING: &str = "org.hwmond.Sensor.Threshold.Warning";
    pub const CRITICAL: &str = "org.hwmond.Sensor.Threshold.Critical";
    pub const STATUS: &str = "org.hwmond.State.Decorator.OperationalStatus";
    pub const FAN_SPEED: &str = "org.hwmond.Control.FanSpeed";
    pub const FAN_PWM: &str = "org.hwmond.Control.FanPwm";
}

/// Outbound notification sink. The production emitter mirrors signals
/// into the event log; tests substitute a recording one.
pub trait SignalEmitter {
    fn property_changed(&self, path: &str, interface: &str, property: &str, value: Json);
    fn object_added(&self, path: &str, interfaces: &[&str]);
}

/// Emits signals as JSON event-log lines.
#[derive(Debug, Default)]
pub struct LogEmitter;

impl SignalEmitter for LogEmitter {
    fn property_changed(&self, path: &str, interface: &str, property: &str, value: Json) {
        logger::log_event(
            "properties_changed",
            json!({
                "path": path,
                "interface": interface,
                "property": property,
                "value": value,
            }),
        );
    }

    fn object_added(&self, path: &str, interfaces: &[&str]) {
        logger::log_event(
            "object_added",
            json!({ "path": path, "interfaces": interfaces }),
        );
    }
}

/// One threshold capability: the configured bounds plus current alarms.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdState {
    pub bounds: Bounds,
    pub alarms: Alarms,
}

/// Which controllable attribute a fan write lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// `fan<id>_target`, closed-loop RPM.
    Speed,
    /// `pwm<id>`, raw duty cycle.
    Pwm,
}

impl TargetMode {
    pub fn interface(self) -> &'static str {
        match self {
            TargetMode::Speed => iface::FAN_SPEED,
            TargetMode::Pwm => iface::FAN_PWM,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TargetState {
    pub mode: TargetMode,
    pub value: u64,
}

/// Bus-visible state of one sensor. `unit` and `scale` never change
/// after publication.
#[derive(Debug)]
pub struct PublishedObject {
    pub path: String,
    pub value: i64,
    pub unit: Unit,
    pub scale: i64,
    pub warning: Option<ThresholdState>,
    pub critical: Option<ThresholdState>,
    pub functional: Option<bool>,
    pub target: Option<TargetState>,
}

impl PublishedObject {
    fn interfaces(&self) -> Vec<&'static str> {
        let mut ifaces = vec![iface::VALUE];
        if self.warning.is_some() {
            ifaces.push(iface::WARNING);
        }
        if self.critical.is_some() {
            ifaces.push(iface::CRITICAL);
        }
        if self.functional.is_some() {
            ifaces.push(iface::STATUS);
        }
        if let Some(t) = &self.target {
            ifaces.push(t.mode.interface());
        }
        ifaces
    }
}

/// Compose the object path for a sensor.
pub fn object_path(namespace: &str, label: &str) -> String {
    format!("{}/{}/{}", BUS_ROOT, namespace, label)
}

/// Owns every published object; sole gatekeeper for signal emission.
pub struct Publisher {
    objects: HashMap<SensorKey, PublishedObject>,
    emitter: Box<dyn SignalEmitter>,
}

impl Publisher {
    pub fn new(emitter: Box<dyn SignalEmitter>) -> Self {
        Publisher {
            objects: HashMap::new(),
            emitter,
        }
    }

    /// Register a fully assembled object. Emission is deferred to
    /// `emit_object_added` so half-built objects never signal.
    pub fn add_object(&mut self, key: SensorKey, object: PublishedObject) {
        self.objects.insert(key, object);
    }

    pub fn emit_object_added(&self, key: &SensorKey) {
        if let Some(obj) = self.objects.get(key) {
            self.emitter.object_added(&obj.path, &obj.interfaces());
        }
    }

    pub fn object(&self, key: &SensorKey) -> Option<&PublishedObject> {
        self.objects.get(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Current value, if the key is published.
    pub fn value(&self, key: &SensorKey) -> Option<i64> {
        self.objects.get(key).map(|o| o.value)
    }

    /// Current fan target, if the object is controllable.
    pub fn target(&self, key: &SensorKey) -> Option<TargetState> {
        self.objects.get(key).and_then(|o| o.target)
    }

    pub fn update_value(&mut self, key: &SensorKey, value: i64) {
        let Some(obj) = self.objects.get_mut(key) else {
            return;
        };
        if obj.value == value {
            return;
        }
        obj.value = value;
        self.emitter
            .property_changed(&obj.path, iface::VALUE, "value", json!(value));
    }

    pub fn update_functional(&mut self, key: &SensorKey, functional: bool) {
        let Some(obj) = self.objects.get_mut(key) else {
            return;
        };
        if obj.functional == Some(functional) {
            return;
        }
        if obj.functional.is_none() {
            // No Status capability was attached; nothing to update.
            return;
        }
        obj.functional = Some(functional);
        self.emitter
            .property_changed(&obj.path, iface::STATUS, "functional", json!(functional));
    }

    /// Store new alarm states for one severity, emitting once per
    /// property that actually flipped.
    pub fn update_alarms(&mut self, key: &SensorKey, severity: Severity, alarms: Alarms) {
        let Some(obj) = self.objects.get_mut(key) else {
            return;
        };
        let (state, interface, lo_prop, hi_prop) = match severity {
            Severity::Warning => (
                obj.warning.as_mut(),
                iface::WARNING,
                "warningAlarmLow",
                "warningAlarmHigh",
            ),
            Severity::Critical => (
                obj.critical.as_mut(),
                iface::CRITICAL,
                "criticalAlarmLow",
                "criticalAlarmHigh",
            ),
        };
        let Some(state) = state else {
            return;
        };
        let previous = state.alarms;
        state.alarms = alarms;
        if previous.low != alarms.low {
            self.emitter
                .property_changed(&obj.path, interface, lo_prop, json!(alarms.low));
        }
        if previous.high != alarms.high {
            self.emitter
                .property_changed(&obj.path, interface, hi_prop, json!(alarms.high));
        }
    }

    /// Bounds of one severity, for re-evaluation during a poll.
    pub fn bounds(&self, key: &SensorKey, severity: Severity) -> Option<Bounds> {
        let obj = self.objects.get(key)?;
        let state = match severity {
            Severity::Warning => obj.warning,
            Severity::Critical => obj.critical,
        };
        state.map(|s| s.bounds)
    }

    /// Record a target that was successfully written to sysfs.
    pub fn update_target(&mut self, key: &SensorKey, value: u64) {
        let Some(obj) = self.objects.get_mut(key) else {
            return;
        };
        let Some(target) = obj.target.as_mut() else {
            return;
        };
        if target.value == value {
            return;
        }
        target.value = value;
        let interface = target.mode.interface();
        self.emitter
            .property_changed(&obj.path, interface, "target", json!(value));
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A recorded signal: (path, interface, property, value).
    pub type Emission = (String, String, String, Json);

    #[derive(Default)]
    pub struct Record {
        pub changed: RefCell<Vec<Emission>>,
        pub added: RefCell<Vec<String>>,
    }

    /// Emitter that appends every signal to a shared record.
    #[derive(Clone, Default)]
    pub struct RecordingEmitter {
        pub record: Rc<Record>,
    }

    impl SignalEmitter for RecordingEmitter {
        fn property_changed(&self, path: &str, interface: &str, property: &str, value: Json) {
            self.record.changed.borrow_mut().push((
                path.to_string(),
                interface.to_string(),
                property.to_string(),
                value,
            ));
        }

        fn object_added(&self, path: &str, _interfaces: &[&str]) {
            self.record.added.borrow_mut().push(path.to_string());
        }
    }

    pub fn recording_publisher() -> (Publisher, Rc<Record>) {
        let emitter = RecordingEmitter::default();
        let record = emitter.record.clone();
        (Publisher::new(Box::new(emitter)), record)
    }
}
