use super::{CHUNK_MAX_SIZE, Chunk, ChunkHeader, ChunkVersion, Magic};
use crate::error::{MetalError, Result};
use bytes::Bytes;

pub const HEADER_SIZE: usize = 24;
pub const PAYLOAD_MAX_SIZE: usize = 1000;
pub const VERSION: &[u8; 3] = b"010";

/// First byte of the version field, used for version detection.
pub const VERSION_LEAD: u8 = VERSION[0];

pub(super) fn encode(header: &ChunkHeader, slice: &[u8]) -> Result<Vec<u8>> {
    if header.text {
        return Err(MetalError::MalformedHeader(
            "version 1 chunks cannot carry descriptor text".to_string(),
        ));
    }
    if slice.len() > PAYLOAD_MAX_SIZE {
        return Err(MetalError::ChunkTooLarge {
            size: HEADER_SIZE + slice.len(),
            max: CHUNK_MAX_SIZE,
        });
    }

    let mut value = Vec::with_capacity(HEADER_SIZE + slice.len());
    value.push(header.magic.as_byte());
    value.extend_from_slice(VERSION);
    value.extend_from_slice(hex::encode_upper(header.additive.to_be_bytes()).as_bytes());
    value.extend_from_slice(hex::encode_upper(header.next_key.to_be_bytes()).as_bytes());
    value.extend_from_slice(slice);
    Ok(value)
}

pub(super) fn decode(value: &[u8]) -> Result<Chunk> {
    if value.len() < HEADER_SIZE {
        return Err(MetalError::MalformedHeader(format!(
            "version 1 value of {} bytes is shorter than its header",
            value.len()
        )));
    }
    if value.len() > CHUNK_MAX_SIZE {
        return Err(MetalError::ChunkTooLarge {
            size: value.len(),
            max: CHUNK_MAX_SIZE,
        });
    }

    let magic = Magic::from_byte(value[0])?;
    if &value[1..4] != VERSION {
        return Err(MetalError::MalformedHeader(format!(
            "unexpected version field {:?}",
            String::from_utf8_lossy(&value[1..4])
        )));
    }

    let mut additive = [0u8; 2];
    hex::decode_to_slice(&value[4..8], &mut additive)
        .map_err(|e| MetalError::MalformedHeader(format!("additive: {}", e)))?;
    let mut next_key = [0u8; 8];
    hex::decode_to_slice(&value[8..24], &mut next_key)
        .map_err(|e| MetalError::MalformedHeader(format!("next key: {}", e)))?;

    Ok(Chunk {
        header: ChunkHeader {
            magic,
            version: ChunkVersion::V1,
            additive: u16::from_be_bytes(additive),
            next_key: u64::from_be_bytes(next_key),
            text: false,
        },
        data: Bytes::copy_from_slice(&value[HEADER_SIZE..]),
    })
}
