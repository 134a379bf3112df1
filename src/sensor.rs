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

//! TMP431 local temperature readout.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::bus::BusChannel;
use crate::config::ThresholdConfig;
use crate::constants::addr::TEMP_SENSOR;
use crate::constants::tmp431::*;
use crate::error::BusError;

/// Fixed-point temperature: `value * 10^scale` degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemperatureSample {
    pub value: i64,
    pub scale: i8,
}

impl TemperatureSample {
    /// High byte is whole degrees; the low byte's upper nibble counts 1/16 degree.
    pub fn from_registers(high: u8, low: u8) -> Self {
        let value = i64::from(high) * HIGH_STEP + i64::from(low >> 4) * LOW_STEP;
        Self { value, scale: SCALE }
    }

    pub fn as_celsius(&self) -> f64 {
        self.value as f64 * 10f64.powi(i32::from(self.scale))
    }
}

impl fmt::Display for TemperatureSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}°C", self.as_celsius())
    }
}

/// Threshold set in the same fixed-point scale as [`TemperatureSample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScaledThresholds {
    pub critical_high: i64,
    pub critical_low: i64,
    pub max_value: i64,
    pub min_value: i64,
    pub warning_high: i64,
    pub warning_low: i64,
}

impl From<&ThresholdConfig> for ScaledThresholds {
    fn from(t: &ThresholdConfig) -> Self {
        let scale = |v: i64| v.saturating_mul(THRESHOLD_MULTIPLIER);
        Self {
            critical_high: scale(t.critical_high),
            critical_low: scale(t.critical_low),
            max_value: scale(t.max_value),
            min_value: scale(t.min_value),
            warning_high: scale(t.warning_high),
            warning_low: scale(t.warning_low),
        }
    }
}

/// One sensor sample from the module on `bus`. Opens and closes the bus.
pub fn read_temperature(channel: &BusChannel, bus: usize) -> Result<TemperatureSample, BusError> {
    channel.session(bus, |ch| {
        if !ch.probe_address(bus, TEMP_SENSOR) {
            return Err(BusError::NoAck { bus, addr: TEMP_SENSOR });
        }
        let high = ch.read_register(bus, TEMP_SENSOR, LOCAL_HIGH_REG)?;
        let low = ch.read_register(bus, TEMP_SENSOR, LOCAL_LOW_REG)?;
        let sample = TemperatureSample::from_registers(high, low);
        debug!("SMBus {}: temperature 0x{:02x}/0x{:02x} -> {}", bus, high, low, sample);
        Ok(sample)
    })?
}
