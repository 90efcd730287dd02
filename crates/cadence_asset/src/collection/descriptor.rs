//! Collection descriptor: the static entry list and its binary format.
//!
//! Layout (little endian):
//!
//! ```text
//! [version: u8][magic: u8 = 0xC0][count: u16 (v1) | u32 (v2+)]
//! count x [asset_type: str][display_name: str][resource_id: str][byte_size: u64 (v3+)]
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8 bytes. Versions 1 to 3
//! are read; version 3 is written.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use thiserror::Error;

pub const DESCRIPTOR_MAGIC: u8 = 0xC0;
pub const DESCRIPTOR_VERSION: u8 = 3;

/// Upper bound on up-front allocation while decoding untrusted counts.
const MAX_PREALLOCATED: usize = 4096;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read or write collection descriptor: {0}")]
    Io(#[from] io::Error),

    #[error("not a collection descriptor (identifier {found:#04x})")]
    BadMagic { found: u8 },

    #[error("unsupported collection descriptor version {0}")]
    UnsupportedVersion(u8),

    #[error("collection descriptor string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("{count} entries cannot be stored in descriptor version {version}")]
    TooManyEntries { count: usize, version: u8 },

    #[error("invalid collection descriptor json: {0}")]
    Json(#[from] serde_json::Error),
}

/// One resource reference inside a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionEntry {
    pub asset_type: String,
    pub display_name: String,
    pub resource_id: String,
    /// 0 when unknown.
    pub byte_size: u64,
}

impl CollectionEntry {
    pub fn new(asset_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            asset_type: asset_type.into(),
            resource_id: resource_id.into(),
            ..Self::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_byte_size(mut self, byte_size: u64) -> Self {
        self.byte_size = byte_size;
        self
    }

    /// Progress weight; unknown sizes count as 1 so no entry is free.
    pub fn weight(&self) -> u64 {
        self.byte_size.max(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub entries: Vec<CollectionEntry>,
}

impl CollectionDescriptor {
    pub fn new(entries: Vec<CollectionEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), DescriptorError> {
        self.write_versioned(writer, DESCRIPTOR_VERSION)
    }

    /// Write an older layout. Only for producing fixtures and legacy files.
    pub fn write_versioned<W: Write>(
        &self,
        writer: &mut W,
        version: u8,
    ) -> Result<(), DescriptorError> {
        if !(1..=DESCRIPTOR_VERSION).contains(&version) {
            return Err(DescriptorError::UnsupportedVersion(version));
        }

        writer.write_all(&[version, DESCRIPTOR_MAGIC])?;
        let count = self.entries.len();
        if version == 1 {
            let count = u16::try_from(count)
                .map_err(|_| DescriptorError::TooManyEntries { count, version })?;
            writer.write_all(&count.to_le_bytes())?;
        } else {
            let count = u32::try_from(count)
                .map_err(|_| DescriptorError::TooManyEntries { count, version })?;
            writer.write_all(&count.to_le_bytes())?;
        }

        for entry in &self.entries {
            write_str(writer, &entry.asset_type)?;
            write_str(writer, &entry.display_name)?;
            write_str(writer, &entry.resource_id)?;
            if version >= 3 {
                writer.write_all(&entry.byte_size.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, DescriptorError> {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header)?;
        let [version, magic] = header;
        if magic != DESCRIPTOR_MAGIC {
            return Err(DescriptorError::BadMagic { found: magic });
        }
        if !(1..=DESCRIPTOR_VERSION).contains(&version) {
            return Err(DescriptorError::UnsupportedVersion(version));
        }

        let count = if version == 1 {
            let mut buf = [0u8; 2];
            reader.read_exact(&mut buf)?;
            u16::from_le_bytes(buf) as usize
        } else {
            read_u32(reader)? as usize
        };

        let mut entries = Vec::with_capacity(count.min(MAX_PREALLOCATED));
        for _ in 0..count {
            let asset_type = read_str(reader)?;
            let display_name = read_str(reader)?;
            let resource_id = read_str(reader)?;
            let byte_size = if version >= 3 {
                let mut buf = [0u8; 8];
                reader.read_exact(&mut buf)?;
                u64::from_le_bytes(buf)
            } else {
                0
            };
            entries.push(CollectionEntry {
                asset_type,
                display_name,
                resource_id,
                byte_size,
            });
        }
        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DescriptorError> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, DescriptorError> {
        Self::read_from(&mut bytes)
    }

    /// Human-editable form used by tooling.
    pub fn to_json(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn write_str<W: Write>(writer: &mut W, value: &str) -> Result<(), DescriptorError> {
    let len = u32::try_from(value.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "string longer than u32::MAX bytes")
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, DescriptorError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_str<R: Read>(reader: &mut R) -> Result<String, DescriptorError> {
    let len = read_u32(reader)? as u64;
    let mut bytes = Vec::new();
    let read = reader.take(len).read_to_end(&mut bytes)?;
    if (read as u64) < len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(String::from_utf8(bytes)?)
}
