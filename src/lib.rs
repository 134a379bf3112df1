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

//! Addin Monitor - add-in module monitor for Linux BMCs
//!
//! This library provides serialized SMBus access over i2c-dev, PCI VPD
//! decoding of the module EEPROM, module presence detection, TMP431
//! temperature readout and publication of the results through a property sink.

pub mod bus;
pub mod config;
pub mod constants;
pub mod error;
pub mod inventory;
pub mod probe;
pub mod sensor;
pub mod service;
pub mod smbus;
pub mod vpd;

#[cfg(test)]
pub mod test_utils;

pub use bus::BusChannel;
pub use error::{BusError, ConfigError, ParseError, PublishError};
pub use inventory::{MemorySink, PropertyValue, PublishSink};
pub use vpd::{IdentityMap, IdentityRecord, IdentityRecordParser, RawIdentityBuffer};
