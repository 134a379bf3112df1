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

//! Error types for every layer of the monitor.
//!
//! None of these are fatal to the process: bus errors become a presence flag
//! or a skipped sample, parse errors empty the identity map, config errors
//! leave the monitor with nothing to watch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("bus index {0} is outside the handle table")]
    InvalidBus(usize),
    #[error("no device node for bus {0} (/dev/i2c/{0} or /dev/i2c-{0})")]
    NotPresent(usize),
    #[error("permission denied opening bus {0} - need root")]
    PermissionDenied(usize),
    #[error("bus {0} failed to open earlier and was not closed since")]
    AlreadyFailed(usize),
    #[error("bus {0} is not open")]
    NotOpen(usize),
    #[error("bus {bus}: could not set slave address 0x{addr:02x}: {source}")]
    AddressRejected {
        bus: usize,
        addr: u8,
        source: io::Error,
    },
    #[error("bus {bus}: no acknowledge from 0x{addr:02x}")]
    NoAck { bus: usize, addr: u8 },
    #[error("bus {bus}: transfer with 0x{addr:02x} failed: {source}")]
    TransferFailed {
        bus: usize,
        addr: u8,
        source: io::Error,
    },
    #[error("requested {requested} bytes, limit is {limit}")]
    LengthExceeded { requested: usize, limit: usize },
    #[error("bus {bus}: open failed: {source}")]
    Open { bus: usize, source: io::Error },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("wrong device identifier {found:?}, this monitor supports {expected:?}")]
    WrongIdentifier { expected: String, found: String },
    #[error("region tag at offset {0} precedes the identifier string")]
    RegionBeforeIdentifier(usize),
    #[error("field at offset {offset} with length {len} exceeds the buffer")]
    FieldOverrun { offset: usize, len: usize },
    #[error("keyword record at offset {offset} overruns its region")]
    RegionOverrun { offset: usize },
    #[error("unrecognized tag 0x{tag:02x} at offset {offset}")]
    UnrecognizedTag { offset: usize, tag: u8 },
    #[error("checksum incorrect")]
    ChecksumFailed,
    #[error("no end tag before the end of the buffer")]
    MissingEndTag,
    #[error("keyword {0:?} must be two ASCII characters other than RV")]
    InvalidKeyword(String),
    #[error("value for {keyword} is {len} bytes, limit is 255")]
    ValueTooLong { keyword: String, len: usize },
    #[error("encoded record needs {needed} bytes, capacity is {capacity}")]
    RecordTooLarge { needed: usize, capacity: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("sink rejected {interface}.{property} on {path}: {reason}")]
    Rejected {
        path: String,
        interface: String,
        property: String,
        reason: String,
    },
}
