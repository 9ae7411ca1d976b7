//! Chunk codec
//!
//! A chunk is one metadata value: a small header followed by a slice of the
//! chained payload. Two wire layouts exist and both are decoded by
//! [`unpack`], which picks the layout from the version byte.
//!
//! Version 1 (24-byte header, text-safe):
//! - `magic` 1 byte, `'C'` or `'E'`
//! - `version` 3 ASCII bytes, `"010"`
//! - `additive` 4 uppercase hex ASCII digits
//! - `next_key` 16 uppercase hex ASCII digits
//! - up to 1000 bytes of Base64 text
//!
//! Version 2 (12-byte header, binary):
//! - `flags` 1 byte, magic with bit 7 set for descriptor chunks
//! - `version` 1 byte, `0x31`
//! - `additive` u16 little-endian
//! - `next_key` u64 little-endian
//! - up to 1012 raw bytes

pub mod v1;
pub mod v2;

use crate::checksum::{V1_KEY_MASK, checksum, checksum_v1};
use crate::error::{MetalError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Upper bound on a single metadata value.
pub const CHUNK_MAX_SIZE: usize = 1024;

pub const MAGIC_CHUNK: u8 = b'C';
pub const MAGIC_END_CHUNK: u8 = b'E';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkVersion {
    V1,
    #[default]
    V2,
}

impl ChunkVersion {
    pub fn header_size(self) -> usize {
        match self {
            ChunkVersion::V1 => v1::HEADER_SIZE,
            ChunkVersion::V2 => v2::HEADER_SIZE,
        }
    }

    pub fn payload_max_size(self) -> usize {
        match self {
            ChunkVersion::V1 => v1::PAYLOAD_MAX_SIZE,
            ChunkVersion::V2 => v2::PAYLOAD_MAX_SIZE,
        }
    }

    /// Key function for this version: v1 keys have the top bit cleared.
    pub fn key_for(self, data: &[u8]) -> u64 {
        match self {
            ChunkVersion::V1 => checksum_v1(data),
            ChunkVersion::V2 => checksum(data),
        }
    }

    /// Inspect the version byte of a stored value.
    pub fn detect(value: &[u8]) -> Result<Self> {
        let Some(&byte) = value.get(1) else {
            return Err(MetalError::MalformedHeader(format!(
                "value of {} bytes has no version field",
                value.len()
            )));
        };

        match byte {
            v1::VERSION_LEAD => Ok(ChunkVersion::V1),
            v2::VERSION => Ok(ChunkVersion::V2),
            other => Err(MetalError::UnsupportedVersion(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Magic {
    Chunk,
    EndChunk,
}

impl Magic {
    pub fn as_byte(self) -> u8 {
        match self {
            Magic::Chunk => MAGIC_CHUNK,
            Magic::EndChunk => MAGIC_END_CHUNK,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            MAGIC_CHUNK => Ok(Magic::Chunk),
            MAGIC_END_CHUNK => Ok(Magic::EndChunk),
            other => Err(MetalError::MalformedMagic(other)),
        }
    }

    pub fn is_end(self) -> bool {
        self == Magic::EndChunk
    }
}

/// Logical header fields shared by every chunk version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub magic: Magic,
    pub version: ChunkVersion,
    pub additive: u16,
    /// Successor key, or the tail anchor when `magic` is [`Magic::EndChunk`].
    pub next_key: u64,
    /// Descriptor chunk flag (v2 only).
    pub text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub data: Bytes,
}

/// An encoded chunk ready to be stored under `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedChunk {
    pub key: u64,
    pub value: Bytes,
}

/// Encode a header and slice into a stored value and compute its key.
pub fn pack(header: &ChunkHeader, slice: &[u8]) -> Result<PackedChunk> {
    let value = match header.version {
        ChunkVersion::V1 => v1::encode(header, slice)?,
        ChunkVersion::V2 => v2::encode(header, slice)?,
    };
    if value.len() > CHUNK_MAX_SIZE {
        return Err(MetalError::ChunkTooLarge {
            size: value.len(),
            max: CHUNK_MAX_SIZE,
        });
    }

    let key = header.version.key_for(&value);
    Ok(PackedChunk {
        key,
        value: Bytes::from(value),
    })
}

/// Decode a stored value, requiring its checksum to equal `expected_key`.
pub fn unpack(value: &[u8], expected_key: u64) -> Result<Chunk> {
    let raw = checksum(value);
    if raw != expected_key && raw & V1_KEY_MASK != expected_key {
        // Report the key in the form the record's own version would use.
        let actual = ChunkVersion::detect(value).map_or(raw, |version| version.key_for(value));
        return Err(MetalError::ChecksumMismatch {
            expected: expected_key,
            actual,
        });
    }

    let version = ChunkVersion::detect(value)?;
    let actual = version.key_for(value);
    if actual != expected_key {
        return Err(MetalError::ChecksumMismatch {
            expected: expected_key,
            actual,
        });
    }

    match version {
        ChunkVersion::V1 => v1::decode(value),
        ChunkVersion::V2 => v2::decode(value),
    }
}
