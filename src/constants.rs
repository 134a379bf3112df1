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

//! Constants for Addin Monitor
//!
//! Bus limits, fixed device addresses, register numbers and the inventory
//! naming used when publishing. Addresses are board wiring, not configuration.

use std::time::Duration;

/// SMBus / I2C limits
pub mod bus {
    /// Number of bus indices the handle table can track
    pub const MAX_BUS: usize = 30;

    /// Largest block a sequential read may return (I2C_DATA_MAX)
    pub const MAX_BLOCK_LEN: usize = 256;

    /// Primary device node naming (`/dev/i2c/<n>`)
    pub const DEV_DIR_PREFIX: &str = "/dev/i2c/";

    /// Fallback device node naming (`/dev/i2c-<n>`)
    pub const DEV_DASH_PREFIX: &str = "/dev/i2c-";
}

/// 7-bit slave addresses fixed by the module's board design
pub mod addr {
    /// PCA-style I/O expander gating the module's SMBus segment
    pub const IO_EXPANDER: u8 = 0x39;
    /// VPD EEPROM
    pub const EEPROM: u8 = 0x50;
    /// TMP431 temperature sensor
    pub const TEMP_SENSOR: u8 = 0x4c;
}

/// I/O expander registers and the bit routing the downstream segment
pub mod expander {
    pub const OUTPUT_REG: u8 = 0x01;
    pub const DIRECTION_REG: u8 = 0x03;
    /// Direction bit cleared (output) and value bit set (drive high)
    pub const ENABLE_BIT: u8 = 1 << 4;
}

/// TMP431 local channel
pub mod tmp431 {
    pub const LOCAL_HIGH_REG: u8 = 0x00;
    pub const LOCAL_LOW_REG: u8 = 0x15;
    /// Mantissa units per whole degree in the high byte
    pub const HIGH_STEP: i64 = 10_000;
    /// Mantissa units per 1/16 degree in the low byte's upper nibble
    pub const LOW_STEP: i64 = 625;
    /// Decimal exponent of every published temperature value
    pub const SCALE: i8 = -4;
    /// Multiplier applied to whole-degree thresholds from the config file
    pub const THRESHOLD_MULTIPLIER: i64 = 10_000;
}

/// PCI VPD layout
pub mod vpd {
    /// Bytes dumped from the EEPROM in one sequential read
    pub const CAPACITY: usize = super::bus::MAX_BLOCK_LEN;

    pub const ID_STRING_TAG: u8 = 0x02;
    pub const RO_TAG: u8 = 0x10;
    pub const RW_TAG: u8 = 0x11;
    pub const END_TAG: u8 = 0x0f;

    pub const SRDT_NAME_MASK: u8 = 0x78;
    pub const LRDT_NAME_MASK: u8 = 0x7f;
    /// Bit 7 marks a large resource data type tag
    pub const LRDT_FLAG: u8 = 0x80;

    pub const LEN_LSB_OFFSET: usize = 1;
    pub const LEN_MSB_OFFSET: usize = 2;

    /// Large resource header: tag + 2 length bytes
    pub const FIELD_HEADER_LEN: usize = 3;
    /// Keyword sub-record header: 2 keyword bytes + 1 length byte
    pub const KEYWORD_HEADER_LEN: usize = 3;
    pub const KEYWORD_LEN: usize = 2;
    pub const DATA_LEN_OFFSET: usize = 2;

    pub const CHECKSUM_KEYWORD: &str = "RV";
    pub const ID_KEYWORD: &str = "ID";

    /// Identifier string the module's EEPROM carries
    pub const DEFAULT_DEVICE_ID: &str = "250-SoC Add-in Module";
}

/// Inventory and sensor object naming
pub mod inventory {
    pub const INVENTORY_ROOT: &str =
        "/xyz/openbmc_project/inventory/system/chassis/motherboard/addin_module";
    pub const SENSOR_ROOT: &str = "/xyz/openbmc_project/sensors/temperature/addin_module";

    pub const ITEM_IFACE: &str = "xyz.openbmc_project.Inventory.Item";
    pub const ASSET_IFACE: &str = "xyz.openbmc_project.Inventory.Decorator.Asset";
    pub const MODULE_STATUS_IFACE: &str = "xyz.openbmc_project.Inventory.Item.AddinModule";

    pub const VALUE_IFACE: &str = "xyz.openbmc_project.Sensor.Value";
    pub const CRITICAL_IFACE: &str = "xyz.openbmc_project.Sensor.Threshold.Critical";
    pub const WARNING_IFACE: &str = "xyz.openbmc_project.Sensor.Threshold.Warning";
}

/// Configuration file locations
pub mod paths {
    pub const CONFIG_FILE: &str = "/etc/addin-monitor/config.json";
    pub const CONFIG_ENV: &str = "ADDIN_MONITOR_CONFIG";
    pub const LOG_ENV: &str = "ADDIN_MONITOR_LOG";
    pub const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Polling cadence of the monitor tasks
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
