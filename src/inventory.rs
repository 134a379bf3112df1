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

//! Publication of module inventory and sensor properties.
//!
//! Everything leaves the process through [`PublishSink`]. Publication is
//! fire-and-forget: a rejected property is logged and the rest still go out.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::constants::inventory::*;
use crate::constants::tmp431::SCALE;
use crate::error::PublishError;
use crate::sensor::{ScaledThresholds, TemperatureSample};
use crate::vpd::IdentityMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => write!(f, "{:?}", s),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Str(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Str(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

/// Destination of every published property.
#[cfg_attr(test, mockall::automock)]
pub trait PublishSink: Send + Sync {
    fn publish(
        &self,
        path: &str,
        interface: &str,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), PublishError>;
}

/// Publish and log a rejection.
fn emit(sink: &dyn PublishSink, path: &str, interface: &str, property: &str, value: PropertyValue) {
    if let Err(e) = sink.publish(path, interface, property, value) {
        warn!("{}", e);
    }
}

/// VPD keyword → inventory property mapping.
#[derive(Debug, Clone, Copy)]
pub struct KeywordProperty {
    pub keyword: &'static str,
    pub property: &'static str,
    pub interface: &'static str,
    pub max_len: usize,
}

pub const KEYWORD_TABLE: [KeywordProperty; 5] = [
    KeywordProperty { keyword: "ID", property: "Model", interface: ASSET_IFACE, max_len: 27 },
    KeywordProperty { keyword: "PN", property: "PartNumber", interface: ASSET_IFACE, max_len: 7 },
    KeywordProperty {
        keyword: "EC",
        property: "EngineeringChangeLevel",
        interface: MODULE_STATUS_IFACE,
        max_len: 6,
    },
    KeywordProperty {
        keyword: "SN",
        property: "SerialNumber",
        interface: ASSET_IFACE,
        max_len: 12,
    },
    KeywordProperty {
        keyword: "FN",
        property: "FieldReplaceUnit",
        interface: MODULE_STATUS_IFACE,
        max_len: 7,
    },
];

impl KeywordProperty {
    /// Value to publish: truncated to `max_len` bytes, empty if absent.
    pub fn value_from(&self, map: &IdentityMap) -> String {
        map.get(self.keyword)
            .map(|v| String::from_utf8_lossy(&v[..v.len().min(self.max_len)]).into_owned())
            .unwrap_or_default()
    }
}

pub fn inventory_path(index: usize) -> String {
    format!("{}{}", INVENTORY_ROOT, index)
}

pub fn sensor_path(index: usize) -> String {
    format!("{}{}", SENSOR_ROOT, index)
}

/// Announce the module's inventory object with an absent, empty baseline.
pub fn create_inventory(sink: &dyn PublishSink, index: usize) {
    let path = inventory_path(index);
    emit(sink, &path, ITEM_IFACE, "Present", false.into());
    for kw in &KEYWORD_TABLE {
        emit(sink, &path, kw.interface, kw.property, String::new().into());
    }
}

pub fn publish_inventory(sink: &dyn PublishSink, index: usize, present: bool, map: &IdentityMap) {
    let path = inventory_path(index);
    emit(sink, &path, ITEM_IFACE, "Present", present.into());
    for kw in &KEYWORD_TABLE {
        emit(sink, &path, kw.interface, kw.property, kw.value_from(map).into());
    }
}

pub fn publish_thresholds(sink: &dyn PublishSink, index: usize, t: &ScaledThresholds) {
    let path = sensor_path(index);
    emit(sink, &path, VALUE_IFACE, "Scale", i64::from(SCALE).into());
    emit(sink, &path, VALUE_IFACE, "MaxValue", t.max_value.into());
    emit(sink, &path, VALUE_IFACE, "MinValue", t.min_value.into());
    emit(sink, &path, CRITICAL_IFACE, "CriticalHigh", t.critical_high.into());
    emit(sink, &path, CRITICAL_IFACE, "CriticalLow", t.critical_low.into());
    emit(sink, &path, WARNING_IFACE, "WarningHigh", t.warning_high.into());
    emit(sink, &path, WARNING_IFACE, "WarningLow", t.warning_low.into());
}

pub fn publish_temperature(sink: &dyn PublishSink, index: usize, sample: &TemperatureSample) {
    emit(sink, &sensor_path(index), VALUE_IFACE, "Value", sample.value.into());
}

type PropertyKey = (String, String, String);

/// Keeps the latest value of every property.
#[derive(Default)]
pub struct MemorySink {
    properties: Mutex<BTreeMap<PropertyKey, PropertyValue>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str, interface: &str, property: &str) -> Option<PropertyValue> {
        let key = (path.to_string(), interface.to_string(), property.to_string());
        self.properties.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.properties.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.lock().is_empty()
    }

    /// `{ path: { interface: { property: value } } }`
    pub fn snapshot(&self) -> serde_json::Value {
        let properties = self.properties.lock();
        let mut tree: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, &PropertyValue>>> =
            BTreeMap::new();
        for ((path, iface, prop), value) in properties.iter() {
            tree.entry(path.as_str())
                .or_default()
                .entry(iface.as_str())
                .or_default()
                .insert(prop.as_str(), value);
        }
        serde_json::to_value(&tree).unwrap_or(serde_json::Value::Null)
    }
}

impl PublishSink for MemorySink {
    fn publish(
        &self,
        path: &str,
        interface: &str,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), PublishError> {
        let key = (path.to_string(), interface.to_string(), property.to_string());
        self.properties.lock().insert(key, value);
        Ok(())
    }
}

/// Sink that only logs, for hosts without a management bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PublishSink for LogSink {
    fn publish(
        &self,
        path: &str,
        interface: &str,
        property: &str,
        value: PropertyValue,
    ) -> Result<(), PublishError> {
        info!(path, interface, property, %value, "publish");
        Ok(())
    }
}
