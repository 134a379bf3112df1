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

//! SMBus transport over Linux i2c-dev character devices.
//!
//! [`SmbusDevice`] is one open bus node; [`DeviceOpener`] resolves a bus index
//! to a node. Both are traits so the bus layer can run against simulated
//! hardware in tests.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::ptr;

use tracing::debug;

use crate::constants::bus::{DEV_DASH_PREFIX, DEV_DIR_PREFIX};
use crate::error::BusError;

// <linux/i2c-dev.h>
const I2C_SLAVE: u32 = 0x0703;
const I2C_SLAVE_FORCE: u32 = 0x0706;
const I2C_SMBUS: u32 = 0x0720;

// <linux/i2c.h>
const I2C_SMBUS_READ: u8 = 1;
const I2C_SMBUS_WRITE: u8 = 0;
const I2C_SMBUS_QUICK: u32 = 0;
const I2C_SMBUS_BYTE: u32 = 1;
const I2C_SMBUS_BYTE_DATA: u32 = 2;
const I2C_SMBUS_BLOCK_MAX: usize = 32;

/// Mirror of `union i2c_smbus_data`; only the leading byte is used here.
#[repr(C, align(2))]
struct SmbusData {
    block: [u8; I2C_SMBUS_BLOCK_MAX + 2],
}

impl SmbusData {
    fn new() -> Self {
        Self { block: [0; I2C_SMBUS_BLOCK_MAX + 2] }
    }
}

/// Mirror of `struct i2c_smbus_ioctl_data`
#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

/// One open SMBus segment.
#[cfg_attr(test, mockall::automock)]
pub trait SmbusDevice: Send {
    /// Select the slave for subsequent transfers. `force` overrides a kernel
    /// driver that has already claimed the address.
    fn set_slave_addr(&mut self, addr: u8, force: bool) -> io::Result<()>;

    /// Zero-length write; succeeds only if the selected slave acknowledges.
    fn write_quick(&mut self) -> io::Result<()>;

    fn read_byte_data(&mut self, reg: u8) -> io::Result<u8>;

    fn write_byte_data(&mut self, reg: u8, value: u8) -> io::Result<()>;

    /// Plain byte read with no register phase (device auto-increment).
    fn read_byte(&mut self) -> io::Result<u8>;
}

/// Resolves a bus index to an open [`SmbusDevice`].
#[cfg_attr(test, mockall::automock)]
pub trait DeviceOpener: Send + Sync {
    fn open(&self, bus: usize) -> Result<Box<dyn SmbusDevice>, BusError>;
}

/// Opens `/dev/i2c/<n>`, falling back to `/dev/i2c-<n>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevI2cOpener;

impl DevI2cOpener {
    pub fn candidate_paths(bus: usize) -> [PathBuf; 2] {
        [
            PathBuf::from(format!("{}{}", DEV_DIR_PREFIX, bus)),
            PathBuf::from(format!("{}{}", DEV_DASH_PREFIX, bus)),
        ]
    }
}

fn is_missing(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

fn open_rw(path: &PathBuf) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

impl DeviceOpener for DevI2cOpener {
    fn open(&self, bus: usize) -> Result<Box<dyn SmbusDevice>, BusError> {
        let [primary, fallback] = Self::candidate_paths(bus);

        let file = match open_rw(&primary) {
            Ok(f) => Ok(f),
            Err(e) if is_missing(&e) => open_rw(&fallback),
            Err(e) => Err(e),
        };

        match file {
            Ok(file) => {
                debug!("Opened SMBus {} ({} or {})", bus, primary.display(), fallback.display());
                Ok(Box::new(LinuxSmbusDevice { file }))
            }
            Err(e) if is_missing(&e) => Err(BusError::NotPresent(bus)),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(BusError::PermissionDenied(bus))
            }
            Err(source) => Err(BusError::Open { bus, source }),
        }
    }
}

/// i2c-dev node driven through the `I2C_SMBUS` ioctl.
pub struct LinuxSmbusDevice {
    file: File,
}

impl LinuxSmbusDevice {
    fn smbus_access(
        &self,
        read_write: u8,
        command: u8,
        size: u32,
        data: Option<&mut SmbusData>,
    ) -> io::Result<()> {
        let mut args = SmbusIoctlData {
            read_write,
            command,
            size,
            data: data.map_or(ptr::null_mut(), |d| d as *mut SmbusData),
        };
        // SAFETY: the fd is owned by `self.file` and stays open for the call;
        // `args` and the optional data block live on this stack frame and match
        // the kernel's i2c_smbus_ioctl_data / i2c_smbus_data layouts.
        let res = unsafe {
            libc::ioctl(self.file.as_raw_fd(), I2C_SMBUS as _, &mut args as *mut SmbusIoctlData)
        };
        if res < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl SmbusDevice for LinuxSmbusDevice {
    fn set_slave_addr(&mut self, addr: u8, force: bool) -> io::Result<()> {
        let request = if force { I2C_SLAVE_FORCE } else { I2C_SLAVE };
        // SAFETY: I2C_SLAVE(_FORCE) takes the address by value; the fd is valid.
        let res = unsafe {
            libc::ioctl(self.file.as_raw_fd(), request as _, libc::c_ulong::from(addr))
        };
        if res < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn write_quick(&mut self) -> io::Result<()> {
        self.smbus_access(I2C_SMBUS_WRITE, 0, I2C_SMBUS_QUICK, None)
    }

    fn read_byte_data(&mut self, reg: u8) -> io::Result<u8> {
        let mut data = SmbusData::new();
        self.smbus_access(I2C_SMBUS_READ, reg, I2C_SMBUS_BYTE_DATA, Some(&mut data))?;
        Ok(data.block[0])
    }

    fn write_byte_data(&mut self, reg: u8, value: u8) -> io::Result<()> {
        let mut data = SmbusData::new();
        data.block[0] = value;
        self.smbus_access(I2C_SMBUS_WRITE, reg, I2C_SMBUS_BYTE_DATA, Some(&mut data))
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut data = SmbusData::new();
        self.smbus_access(I2C_SMBUS_READ, 0, I2C_SMBUS_BYTE, Some(&mut data))?;
        Ok(data.block[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_paths() {
        let [primary, fallback] = DevI2cOpener::candidate_paths(12);
        assert_eq!(primary, PathBuf::from("/dev/i2c/12"));
        assert_eq!(fallback, PathBuf::from("/dev/i2c-12"));
    }

    #[test]
    fn test_smbus_data_layout() {
        assert_eq!(std::mem::size_of::<SmbusData>(), 34);
        assert_eq!(std::mem::align_of::<SmbusData>(), 2);
    }

    #[test]
    fn test_is_missing() {
        assert!(is_missing(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(is_missing(&io::Error::from_raw_os_error(libc::ENOTDIR)));
        assert!(!is_missing(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_open_nonexistent_bus_is_not_present() {
        // No test host exposes an i2c bus this high
        match DevI2cOpener.open(9999) {
            Err(BusError::NotPresent(9999)) => {}
            Err(BusError::PermissionDenied(_)) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
