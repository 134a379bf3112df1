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

//! Module presence detection.
//!
//! The module's downstream segment (EEPROM + sensor) sits behind bit 4 of an
//! I/O expander. Presence means: the expander answers, the bit can be driven
//! high as an output, and both downstream devices then acknowledge.

use tracing::{debug, info, warn};

use crate::bus::BusChannel;
use crate::constants::addr::{EEPROM, IO_EXPANDER, TEMP_SENSOR};
use crate::constants::expander::{DIRECTION_REG, ENABLE_BIT, OUTPUT_REG};
use crate::error::BusError;

/// Read `reg`, apply `f`, write it back.
fn modify_register(
    channel: &BusChannel,
    bus: usize,
    addr: u8,
    reg: u8,
    f: impl FnOnce(u8) -> u8,
) -> Result<(), BusError> {
    let current = channel.read_register(bus, addr, reg)?;
    let next = f(current);
    debug!("SMBus {}: 0x{:02x} reg 0x{:02x}: 0x{:02x} -> 0x{:02x}", bus, addr, reg, current, next);
    channel.write_register(bus, addr, reg, next)
}

fn enable_downstream(channel: &BusChannel, bus: usize) -> Result<bool, BusError> {
    if !channel.probe_address(bus, IO_EXPANDER) {
        info!("No add-in module on SMBus {}: expander 0x{:02x} silent", bus, IO_EXPANDER);
        return Ok(false);
    }

    modify_register(channel, bus, IO_EXPANDER, DIRECTION_REG, |v| v & !ENABLE_BIT)?;
    modify_register(channel, bus, IO_EXPANDER, OUTPUT_REG, |v| v | ENABLE_BIT)?;

    let eeprom = channel.probe_address(bus, EEPROM);
    let sensor = channel.probe_address(bus, TEMP_SENSOR);
    if !(eeprom && sensor) {
        info!(
            "Add-in module on SMBus {} incomplete: eeprom={} sensor={}",
            bus, eeprom, sensor
        );
    }
    Ok(eeprom && sensor)
}

/// Power up the module's downstream segment and check both devices answer.
///
/// Opens and closes the bus. Every failure is reported as "not present".
pub fn enable_and_probe(channel: &BusChannel, bus: usize) -> bool {
    match channel.session(bus, |ch| enable_downstream(ch, bus)) {
        Ok(Ok(present)) => present,
        Ok(Err(e)) => {
            warn!("Enabling add-in module on SMBus {} failed: {}", bus, e);
            false
        }
        Err(e) => {
            debug!("SMBus {} unavailable for probing: {}", bus, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::{SimOpener, SimulatedModule};

    #[test]
    fn test_present_module_is_enabled() {
        let module = SimulatedModule::default();
        let registers = module.expander_registers();
        let channel = BusChannel::new(Box::new(SimOpener::new().with_module(3, module)));

        assert!(enable_and_probe(&channel, 3));
        let (direction, output) = *registers.lock();
        assert_eq!(direction & ENABLE_BIT, 0);
        assert_eq!(output & ENABLE_BIT, ENABLE_BIT);
        assert!(!channel.is_open(3));
    }

    #[test]
    fn test_other_expander_bits_are_preserved() {
        let module = SimulatedModule::default().with_expander(0xff, 0x05);
        let registers = module.expander_registers();
        let channel = BusChannel::new(Box::new(SimOpener::new().with_module(1, module)));

        assert!(enable_and_probe(&channel, 1));
        assert_eq!(*registers.lock(), (0xef, 0x15));
    }

    #[test]
    fn test_bus_without_module() {
        let channel = BusChannel::new(Box::new(SimOpener::new().with_empty_bus(2)));
        assert!(!enable_and_probe(&channel, 2));
    }

    #[test]
    fn test_missing_bus_node() {
        let channel = BusChannel::new(Box::new(SimOpener::new()));
        assert!(!enable_and_probe(&channel, 8));
        // session cleared the failure mark
        assert!(matches!(channel.open(8), Err(BusError::NotPresent(8))));
    }

    #[test]
    fn test_module_without_sensor() {
        let module = SimulatedModule::default().without_sensor();
        let channel = BusChannel::new(Box::new(SimOpener::new().with_module(0, module)));
        assert!(!enable_and_probe(&channel, 0));
    }

    #[test]
    fn test_expander_write_failure() {
        let module = SimulatedModule::default().with_failing_writes();
        let channel = BusChannel::new(Box::new(SimOpener::new().with_module(5, module)));
        assert!(!enable_and_probe(&channel, 5));
        assert!(!channel.is_open(5));
    }
}
