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

//! PCI Vital Product Data decoding.
//!
//! The module EEPROM holds a PCI VPD image: an identifier-string resource,
//! one or more keyword regions (read-only / read-write) and an end tag. The
//! read-only region carries an `RV` keyword whose first payload byte makes
//! the sum of every byte from offset 0 through itself zero modulo 256.
//!
//! Decoding is all-or-nothing: any structural fault, a foreign identifier or
//! a checksum that never validated yields an empty [`IdentityMap`].

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::bus::BusChannel;
use crate::constants::vpd::*;
use crate::error::{BusError, ParseError};

/// One sequential dump of the EEPROM.
#[derive(Clone)]
pub struct RawIdentityBuffer {
    bytes: [u8; CAPACITY],
    filled: bool,
}

impl RawIdentityBuffer {
    /// Buffer standing in for a read that never happened or failed.
    pub fn empty() -> Self {
        Self { bytes: [0; CAPACITY], filled: false }
    }

    /// Copy `data` into a fresh buffer; anything past the capacity is dropped
    /// and a short image is zero-padded.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0u8; CAPACITY];
        let n = data.len().min(CAPACITY);
        bytes[..n].copy_from_slice(&data[..n]);
        Self { bytes, filled: true }
    }

    pub fn as_bytes(&self) -> &[u8; CAPACITY] {
        &self.bytes
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    /// Dump the EEPROM at `addr` on `bus` in one sequential read.
    pub fn read_from(channel: &BusChannel, bus: usize, addr: u8) -> Result<Self, BusError> {
        let mut bytes = [0u8; CAPACITY];
        channel.session(bus, |ch| ch.sequential_read(bus, addr, CAPACITY, &mut bytes))??;
        Ok(Self { bytes, filled: true })
    }
}

impl std::fmt::Debug for RawIdentityBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawIdentityBuffer")
            .field("filled", &self.filled)
            .field("head", &&self.bytes[..16])
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    IdString,
    ReadOnly,
    ReadWrite,
    End,
}

impl TagKind {
    /// Short-form name 0x0F is the end marker; everything else is named by
    /// its large-form bits. No name is valid in both forms.
    pub fn classify(tag: u8) -> Option<Self> {
        if (tag & SRDT_NAME_MASK) >> 3 == END_TAG {
            return Some(Self::End);
        }
        match tag & LRDT_NAME_MASK {
            ID_STRING_TAG => Some(Self::IdString),
            RO_TAG => Some(Self::ReadOnly),
            RW_TAG => Some(Self::ReadWrite),
            _ => None,
        }
    }

    /// Tag byte as written to an image
    pub fn tag_byte(self) -> u8 {
        match self {
            Self::IdString => LRDT_FLAG | ID_STRING_TAG,
            Self::ReadOnly => LRDT_FLAG | RO_TAG,
            Self::ReadWrite => LRDT_FLAG | RW_TAG,
            Self::End => END_TAG << 3,
        }
    }
}

/// Header of one resource: where it starts, what it is and how long its payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityField {
    pub kind: TagKind,
    pub offset: usize,
    pub len: usize,
}

impl IdentityField {
    pub fn payload_start(&self) -> usize {
        self.offset + FIELD_HEADER_LEN
    }

    pub fn next_offset(&self) -> usize {
        self.payload_start() + self.len
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumState {
    #[default]
    Unchecked,
    Passed,
    Failed,
}

/// Decoded keyword → value pairs, plus the identifier under `ID`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    entries: BTreeMap<String, Vec<u8>>,
}

impl IdentityMap {
    pub fn get(&self, keyword: &str) -> Option<&[u8]> {
        self.entries.get(keyword).map(Vec::as_slice)
    }

    /// Value as text; non UTF-8 bytes are replaced.
    pub fn text(&self, keyword: &str) -> Option<String> {
        self.get(keyword).map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    // first occurrence wins
    fn insert(&mut self, keyword: String, value: &[u8]) {
        self.entries.entry(keyword).or_insert_with(|| value.to_vec());
    }
}

enum Step {
    Next(usize),
    End,
}

/// Walks a [`RawIdentityBuffer`] field by field.
pub struct IdentityRecordParser<'a> {
    raw: &'a [u8; CAPACITY],
    expected_id: &'a str,
    map: IdentityMap,
    id_checked: bool,
    checksum: ChecksumState,
}

impl<'a> IdentityRecordParser<'a> {
    pub fn new(raw: &'a RawIdentityBuffer, expected_id: &'a str) -> Self {
        Self {
            raw: raw.as_bytes(),
            expected_id,
            map: IdentityMap::default(),
            id_checked: false,
            checksum: ChecksumState::Unchecked,
        }
    }

    /// Decode the whole buffer. On error the partial map is dropped.
    pub fn parse(mut self) -> Result<IdentityMap, ParseError> {
        let mut offset = 0;
        while offset < CAPACITY {
            match self.parse_field(offset)? {
                Step::Next(next) => offset = next,
                Step::End => {
                    debug!("Reached end of VPD at offset {}", offset);
                    return match self.checksum {
                        ChecksumState::Passed => Ok(self.map),
                        _ => Err(ParseError::ChecksumFailed),
                    };
                }
            }
        }
        Err(ParseError::MissingEndTag)
    }

    fn byte(&self, offset: usize) -> Result<u8, ParseError> {
        self.raw.get(offset).copied().ok_or(ParseError::FieldOverrun { offset, len: 0 })
    }

    fn slice(&self, start: usize, len: usize) -> Result<&'a [u8], ParseError> {
        let raw: &'a [u8; CAPACITY] = self.raw;
        raw.get(start..start + len).ok_or(ParseError::FieldOverrun { offset: start, len })
    }

    pub fn read_field_header(&self, offset: usize) -> Result<IdentityField, ParseError> {
        let tag = self.byte(offset)?;
        let kind = TagKind::classify(tag).ok_or(ParseError::UnrecognizedTag { offset, tag })?;
        if kind == TagKind::End {
            return Ok(IdentityField { kind, offset, len: 0 });
        }

        let lsb = self.byte(offset + LEN_LSB_OFFSET)?;
        let msb = self.byte(offset + LEN_MSB_OFFSET)?;
        let len = usize::from(u16::from_le_bytes([lsb, msb]));
        if offset + len + FIELD_HEADER_LEN > CAPACITY {
            return Err(ParseError::FieldOverrun { offset, len });
        }
        Ok(IdentityField { kind, offset, len })
    }

    fn parse_field(&mut self, offset: usize) -> Result<Step, ParseError> {
        let field = self.read_field_header(offset)?;
        match field.kind {
            TagKind::End => return Ok(Step::End),
            TagKind::IdString => {
                let id = self.slice(field.payload_start(), field.len)?;
                if id != self.expected_id.as_bytes() {
                    return Err(ParseError::WrongIdentifier {
                        expected: self.expected_id.to_string(),
                        found: String::from_utf8_lossy(id).into_owned(),
                    });
                }
                self.map.insert(ID_KEYWORD.to_string(), id);
                self.id_checked = true;
            }
            TagKind::ReadOnly | TagKind::ReadWrite => {
                if !self.id_checked {
                    return Err(ParseError::RegionBeforeIdentifier(offset));
                }
                self.parse_region(&field)?;
            }
        }
        Ok(Step::Next(field.next_offset()))
    }

    fn parse_region(&mut self, field: &IdentityField) -> Result<(), ParseError> {
        let start = field.payload_start();
        let mut consumed = 0;
        while consumed < field.len {
            let record = start + consumed;
            if consumed + KEYWORD_HEADER_LEN > field.len {
                return Err(ParseError::RegionOverrun { offset: record });
            }
            let data_len = usize::from(self.byte(record + DATA_LEN_OFFSET)?);
            if consumed + KEYWORD_HEADER_LEN + data_len > field.len {
                return Err(ParseError::RegionOverrun { offset: record });
            }

            let keyword = self.slice(record, KEYWORD_LEN)?;
            let value = self.slice(record + KEYWORD_HEADER_LEN, data_len)?;
            if keyword == CHECKSUM_KEYWORD.as_bytes() {
                self.verify_checksum(record + KEYWORD_HEADER_LEN);
            }
            self.map.insert(String::from_utf8_lossy(keyword).into_owned(), value);
            consumed += KEYWORD_HEADER_LEN + data_len;
        }
        Ok(())
    }

    /// Sum bytes `0..=through`; the record is consistent iff that is 0 mod 256.
    fn verify_checksum(&mut self, through: usize) {
        self.checksum = match self.raw.get(..=through) {
            Some(bytes) => {
                let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
                if sum == 0 { ChecksumState::Passed } else { ChecksumState::Failed }
            }
            None => ChecksumState::Failed,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Valid,
    Invalid(ParseError),
    /// EEPROM never read (module absent or bus failure)
    Unavailable,
}

/// Decoded EEPROM contents with their validity.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    map: IdentityMap,
    status: RecordStatus,
}

impl IdentityRecord {
    pub fn unavailable() -> Self {
        Self { map: IdentityMap::default(), status: RecordStatus::Unavailable }
    }

    pub fn decode(raw: &RawIdentityBuffer, expected_id: &str) -> Self {
        if !raw.is_filled() {
            return Self::unavailable();
        }
        match IdentityRecordParser::new(raw, expected_id).parse() {
            Ok(map) => Self { map, status: RecordStatus::Valid },
            Err(e) => {
                warn!("Invalid VPD data: {}", e);
                Self { map: IdentityMap::default(), status: RecordStatus::Invalid(e) }
            }
        }
    }

    pub fn map(&self) -> &IdentityMap {
        &self.map
    }

    pub fn status(&self) -> &RecordStatus {
        &self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status == RecordStatus::Valid
    }
}

/// Read and decode the EEPROM at `addr`. Bus failures give an unavailable record.
pub fn read_identity(
    channel: &BusChannel,
    bus: usize,
    addr: u8,
    expected_id: &str,
) -> IdentityRecord {
    match RawIdentityBuffer::read_from(channel, bus, addr) {
        Ok(raw) => IdentityRecord::decode(&raw, expected_id),
        Err(e) => {
            warn!("Read VPD data from bus {} failed: {}", bus, e);
            IdentityRecord::unavailable()
        }
    }
}

/// Build a VPD image: identifier string, one read-only region holding
/// `fields` followed by a one-byte `RV` checksum, and an end tag.
pub fn encode_identity(
    id: &str,
    fields: &[(&str, &[u8])],
) -> Result<RawIdentityBuffer, ParseError> {
    let mut region: Vec<u8> = Vec::new();
    for (keyword, value) in fields {
        // ID and RV are written by the encoder itself
        let reserved = *keyword == CHECKSUM_KEYWORD || *keyword == ID_KEYWORD;
        if keyword.len() != KEYWORD_LEN || !keyword.is_ascii() || reserved {
            return Err(ParseError::InvalidKeyword(keyword.to_string()));
        }
        let len = u8::try_from(value.len()).map_err(|_| ParseError::ValueTooLong {
            keyword: keyword.to_string(),
            len: value.len(),
        })?;
        region.extend_from_slice(keyword.as_bytes());
        region.push(len);
        region.extend_from_slice(value);
    }
    // RV header plus its checksum byte
    region.extend_from_slice(CHECKSUM_KEYWORD.as_bytes());
    region.push(1);

    let needed = FIELD_HEADER_LEN + id.len() + FIELD_HEADER_LEN + region.len() + 1 + 1;
    if needed > CAPACITY {
        return Err(ParseError::RecordTooLarge { needed, capacity: CAPACITY });
    }

    let mut image: Vec<u8> = Vec::with_capacity(needed);
    push_field_header(&mut image, TagKind::IdString, id.len());
    image.extend_from_slice(id.as_bytes());
    push_field_header(&mut image, TagKind::ReadOnly, region.len() + 1);
    image.extend_from_slice(&region);
    let sum = image.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    image.push(0u8.wrapping_sub(sum));
    image.push(TagKind::End.tag_byte());

    Ok(RawIdentityBuffer::from_bytes(&image))
}

fn push_field_header(image: &mut Vec<u8>, kind: TagKind, len: usize) {
    // callers keep len below CAPACITY
    let [lsb, msb] = (len as u16).to_le_bytes();
    image.extend_from_slice(&[kind.tag_byte(), lsb, msb]);
}
