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

//! Serialized access to the platform's SMBus segments.
//!
//! A single [`BusChannel`] owns the handle table for every bus index and
//! guards it with one lock. Transactions on *different* buses block each
//! other as well; callers composing probe/read/write sequences rely on that
//! total order.
//!
//! Handles are opened and closed explicitly by the caller. A failed open
//! leaves the index marked until [`BusChannel::close`] clears it.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::constants::bus::{MAX_BLOCK_LEN, MAX_BUS};
use crate::error::BusError;
use crate::smbus::{DevI2cOpener, DeviceOpener, SmbusDevice};

enum Slot {
    Closed,
    Open(Box<dyn SmbusDevice>),
    Failed,
}

/// Fixed-size table of per-bus handles.
pub struct BusRegistry {
    slots: [Slot; MAX_BUS],
}

impl BusRegistry {
    fn new() -> Self {
        Self { slots: std::array::from_fn(|_| Slot::Closed) }
    }

    fn slot_mut(&mut self, bus: usize) -> Result<&mut Slot, BusError> {
        self.slots.get_mut(bus).ok_or(BusError::InvalidBus(bus))
    }

    fn device_mut(&mut self, bus: usize) -> Result<&mut Box<dyn SmbusDevice>, BusError> {
        match self.slot_mut(bus)? {
            Slot::Open(dev) => Ok(dev),
            _ => Err(BusError::NotOpen(bus)),
        }
    }

    fn release(&mut self, bus: usize) {
        if let Some(slot) = self.slots.get_mut(bus) {
            *slot = Slot::Closed;
        }
    }
}

pub struct BusChannel {
    opener: Box<dyn DeviceOpener>,
    registry: Mutex<BusRegistry>,
}

impl BusChannel {
    pub fn new(opener: Box<dyn DeviceOpener>) -> Self {
        Self { opener, registry: Mutex::new(BusRegistry::new()) }
    }

    /// Channel over the host's `/dev/i2c*` nodes.
    pub fn linux() -> Self {
        Self::new(Box::new(DevI2cOpener))
    }

    pub fn open(&self, bus: usize) -> Result<(), BusError> {
        let mut registry = self.registry.lock();
        let slot = registry.slot_mut(bus)?;
        match slot {
            Slot::Open(_) => return Ok(()),
            Slot::Failed => return Err(BusError::AlreadyFailed(bus)),
            Slot::Closed => {}
        }

        match self.opener.open(bus) {
            Ok(dev) => {
                *slot = Slot::Open(dev);
                Ok(())
            }
            Err(e) => {
                warn!("Could not open SMBus {}: {}", bus, e);
                *slot = Slot::Failed;
                Err(e)
            }
        }
    }

    /// Release the handle for `bus`. Closed or unknown indices are ignored.
    pub fn close(&self, bus: usize) {
        let mut registry = self.registry.lock();
        registry.release(bus);
    }

    pub fn is_open(&self, bus: usize) -> bool {
        let mut registry = self.registry.lock();
        registry.device_mut(bus).is_ok()
    }

    /// Open `bus`, run `f`, then close it whether or not `f` or the open failed.
    pub fn session<T>(&self, bus: usize, f: impl FnOnce(&Self) -> T) -> Result<T, BusError> {
        let opened = self.open(bus);
        let out = opened.map(|()| f(self));
        self.close(bus);
        out
    }

    /// Address the slave (forced) and run `op` against the bus, all under the lock.
    ///
    /// A rejected address means the handle is no longer usable, so it is released.
    fn transfer<T>(
        &self,
        bus: usize,
        addr: u8,
        op: impl FnOnce(&mut dyn SmbusDevice) -> Result<T, BusError>,
    ) -> Result<T, BusError> {
        let mut registry = self.registry.lock();
        let dev = registry.device_mut(bus)?;
        if let Err(source) = dev.set_slave_addr(addr, true) {
            warn!("SMBus {}: set slave address 0x{:02x} failed ({}), closing", bus, addr, source);
            registry.release(bus);
            return Err(BusError::AddressRejected { bus, addr, source });
        }
        op(dev.as_mut())
    }

    /// True iff a device at `addr` acknowledges a quick write. Never fails.
    pub fn probe_address(&self, bus: usize, addr: u8) -> bool {
        let res = self.transfer(bus, addr, |dev| {
            dev.write_quick().map_err(|source| BusError::TransferFailed { bus, addr, source })
        });
        match res {
            Ok(()) => true,
            Err(e) => {
                debug!("Probe of 0x{:02x} on SMBus {}: {}", addr, bus, e);
                false
            }
        }
    }

    pub fn read_register(&self, bus: usize, addr: u8, reg: u8) -> Result<u8, BusError> {
        self.transfer(bus, addr, |dev| {
            dev.read_byte_data(reg).map_err(|source| BusError::TransferFailed { bus, addr, source })
        })
    }

    pub fn write_register(&self, bus: usize, addr: u8, reg: u8, value: u8) -> Result<(), BusError> {
        self.transfer(bus, addr, |dev| {
            dev.write_byte_data(reg, value)
                .map_err(|source| BusError::TransferFailed { bus, addr, source })
        })
    }

    /// EEPROM-style sequential read of `length` bytes into `out[..length]`.
    ///
    /// The first byte is a register read at offset 0, the rest are plain reads
    /// relying on the device's address auto-increment. Bytes past a failing
    /// read are left untouched.
    pub fn sequential_read(
        &self,
        bus: usize,
        addr: u8,
        length: usize,
        out: &mut [u8],
    ) -> Result<usize, BusError> {
        let limit = MAX_BLOCK_LEN.min(out.len());
        if length > limit {
            return Err(BusError::LengthExceeded { requested: length, limit });
        }
        if length == 0 {
            return Ok(0);
        }

        self.transfer(bus, addr, |dev| {
            let fail = |source: std::io::Error| BusError::TransferFailed { bus, addr, source };
            out[0] = dev.read_byte_data(0).map_err(fail)?;
            for byte in out[1..length].iter_mut() {
                *byte = dev.read_byte().map_err(fail)?;
            }
            Ok(length)
        })
    }
}
