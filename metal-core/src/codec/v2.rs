use super::{CHUNK_MAX_SIZE, Chunk, ChunkHeader, ChunkVersion, Magic};
use crate::error::{MetalError, Result};
use bytes::Bytes;

pub const HEADER_SIZE: usize = 12;
pub const PAYLOAD_MAX_SIZE: usize = 1012;
pub const VERSION: u8 = 0x31;

/// Set on the flags byte of descriptor chunks.
pub const TEXT_FLAG: u8 = 0x80;

pub(super) fn encode(header: &ChunkHeader, slice: &[u8]) -> Result<Vec<u8>> {
    if slice.len() > PAYLOAD_MAX_SIZE {
        return Err(MetalError::ChunkTooLarge {
            size: HEADER_SIZE + slice.len(),
            max: CHUNK_MAX_SIZE,
        });
    }

    let mut flags = header.magic.as_byte();
    if header.text {
        flags |= TEXT_FLAG;
    }

    let mut value = Vec::with_capacity(HEADER_SIZE + slice.len());
    value.push(flags);
    value.push(VERSION);
    value.extend_from_slice(&header.additive.to_le_bytes());
    value.extend_from_slice(&header.next_key.to_le_bytes());
    value.extend_from_slice(slice);
    Ok(value)
}

pub(super) fn decode(value: &[u8]) -> Result<Chunk> {
    if value.len() < HEADER_SIZE {
        return Err(MetalError::MalformedHeader(format!(
            "version 2 value of {} bytes is shorter than its header",
            value.len()
        )));
    }
    if value.len() > CHUNK_MAX_SIZE {
        return Err(MetalError::ChunkTooLarge {
            size: value.len(),
            max: CHUNK_MAX_SIZE,
        });
    }

    let flags = value[0];
    let magic =
        Magic::from_byte(flags & !TEXT_FLAG).map_err(|_| MetalError::MalformedMagic(flags))?;

    let mut next_key = [0u8; 8];
    next_key.copy_from_slice(&value[4..12]);

    Ok(Chunk {
        header: ChunkHeader {
            magic,
            version: ChunkVersion::V2,
            additive: u16::from_le_bytes([value[2], value[3]]),
            next_key: u64::from_le_bytes(next_key),
            text: flags & TEXT_FLAG != 0,
        },
        data: Bytes::copy_from_slice(&value[HEADER_SIZE..]),
    })
}
