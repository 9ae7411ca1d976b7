//! Chain building and walking.
//!
//! A chain is built tail-to-head: each chunk embeds the key of its
//! successor, so the last slice is packed first (as the end chunk, carrying
//! the tail anchor) and every earlier slice picks up the key just produced.
//! Walking goes the other way, from the head key through `next_key` links
//! until the end chunk.

use crate::codec::{self, Chunk, ChunkHeader, ChunkVersion, Magic};
use crate::error::{MetalError, Result};
use crate::seal::Seal;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

/// Stored values of one metadata target, keyed by metadata key.
pub type ChunkTable = HashMap<u64, Bytes>;

/// Terminates a descriptor run that does not end on a chunk boundary.
const TEXT_TERMINATOR: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainChunk {
    pub key: u64,
    pub value: Bytes,
    pub header: ChunkHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltChain {
    pub version: ChunkVersion,
    pub head_key: u64,
    pub additive: u16,
    pub tail_anchor: u64,
    /// Leading chunks holding descriptor text only.
    pub text_chunks: usize,
    /// Chunks in forward order, head first.
    pub chunks: Vec<ChainChunk>,
}

impl BuiltChain {
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.chunks.iter().map(|chunk| chunk.key)
    }
}

/// Split a payload (and optional descriptor text) into a linked chain.
///
/// Fails with [`MetalError::KeyCollision`] when two chunks of the chain hash
/// to the same key; callers retry with another additive.
pub fn build_chain(
    version: ChunkVersion,
    payload: &[u8],
    text: Option<&str>,
    additive: u16,
) -> Result<BuiltChain> {
    if payload.is_empty() {
        return Err(MetalError::EmptyPayload);
    }

    let text = text.filter(|text| !text.is_empty());
    let (stream, text_len) = match version {
        ChunkVersion::V1 => {
            if text.is_some() {
                return Err(MetalError::MalformedDescriptor(
                    "version 1 chains cannot carry a descriptor".to_string(),
                ));
            }
            (BASE64_STANDARD.encode(payload).into_bytes(), 0)
        }
        ChunkVersion::V2 => {
            let mut stream = Vec::new();
            if let Some(text) = text {
                stream.extend_from_slice(text.as_bytes());
                if text.len() % version.payload_max_size() != 0 {
                    stream.push(TEXT_TERMINATOR);
                }
            }
            let text_len = stream.len();
            stream.extend_from_slice(payload);
            (stream, text_len)
        }
    };

    let slice_size = version.payload_max_size();
    let (text_run, data_run) = stream.split_at(text_len);
    let slices: Vec<(bool, &[u8])> = text_run
        .chunks(slice_size)
        .map(|slice| (true, slice))
        .chain(data_run.chunks(slice_size).map(|slice| (false, slice)))
        .collect();
    let text_chunks = text_run.len().div_ceil(slice_size);

    let tail_anchor = version.key_for(&stream);
    let last = slices.len() - 1;

    let (mut chunks, _, _) = slices.iter().enumerate().rev().try_fold(
        (Vec::with_capacity(slices.len()), HashSet::new(), tail_anchor),
        |(mut chunks, mut seen, next_key), (index, &(text, slice))| {
            let header = ChunkHeader {
                magic: if index == last {
                    Magic::EndChunk
                } else {
                    Magic::Chunk
                },
                version,
                additive,
                next_key,
                text,
            };
            let packed = codec::pack(&header, slice)?;
            if !seen.insert(packed.key) {
                return Err(MetalError::KeyCollision { key: packed.key });
            }

            let key = packed.key;
            chunks.push(ChainChunk {
                key,
                value: packed.value,
                header,
            });
            Ok::<_, MetalError>((chunks, seen, key))
        },
    )?;
    chunks.reverse();

    Ok(BuiltChain {
        version,
        head_key: chunks[0].key,
        additive,
        tail_anchor,
        text_chunks,
        chunks,
    })
}

/// One chunk reached while following a chain.
#[derive(Debug, Clone)]
pub struct VisitedChunk {
    pub key: u64,
    pub value: Bytes,
    pub chunk: Chunk,
}

/// Follows `next_key` links through a pre-fetched table.
///
/// Every visited key is removed from the table, so a link that points back
/// into the chain surfaces as [`MetalError::ChunkLost`] instead of looping.
/// A failed step does not advance: the failing key stays pending and its
/// entry stays in the table, so later calls report the same error.
pub struct ChainWalker {
    table: ChunkTable,
    next: Option<u64>,
}

impl ChainWalker {
    pub fn new(head_key: u64, table: ChunkTable) -> Self {
        Self {
            table,
            next: Some(head_key),
        }
    }

    /// Advance one link. Returns `Ok(None)` once the end chunk was visited.
    pub fn next_chunk(&mut self) -> Result<Option<VisitedChunk>> {
        let Some(key) = self.next else {
            return Ok(None);
        };

        let value = self
            .table
            .get(&key)
            .cloned()
            .ok_or(MetalError::ChunkLost(key))?;
        let chunk = codec::unpack(&value, key)?;
        self.table.remove(&key);
        self.next = (!chunk.header.magic.is_end()).then_some(chunk.header.next_key);

        Ok(Some(VisitedChunk { key, value, chunk }))
    }

    /// Key the next call will read; `None` after the end chunk.
    pub fn pending_key(&self) -> Option<u64> {
        self.next
    }

    /// Entries that were not part of the walked chain.
    pub fn into_remaining(self) -> ChunkTable {
        self.table
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChain {
    pub payload: Bytes,
    pub text: Option<String>,
    pub head: ChunkHeader,
    pub keys: Vec<u64>,
}

impl DecodedChain {
    /// Parse the inline descriptor, if the chain carries one.
    pub fn seal(&self) -> Result<Option<Seal>> {
        self.text.as_deref().map(Seal::parse).transpose()
    }
}

/// Reconstruct the payload reachable from `head_key`.
pub fn decode_chain(head_key: u64, table: ChunkTable) -> Result<DecodedChain> {
    let mut walker = ChainWalker::new(head_key, table);
    let mut head: Option<ChunkHeader> = None;
    let mut keys = Vec::new();
    let mut stream = Vec::new();
    let mut text_len = 0;
    let mut has_text = false;
    let mut anchor = None;

    while let Some(visited) = walker.next_chunk()? {
        let header = visited.chunk.header;
        let version = head.get_or_insert(header).version;
        if header.version != version {
            return Err(MetalError::MalformedHeader(format!(
                "chunk {:016X} is {:?} inside a {:?} chain",
                visited.key, header.version, version
            )));
        }

        if header.text {
            if text_len != stream.len() {
                return Err(MetalError::MalformedHeader(format!(
                    "descriptor chunk {:016X} follows payload data",
                    visited.key
                )));
            }
            has_text = true;
            text_len += visited.chunk.data.len();
        }
        stream.extend_from_slice(&visited.chunk.data);
        keys.push(visited.key);

        if header.magic.is_end() {
            anchor = Some(header.next_key);
        }
    }

    let (Some(head), Some(anchor)) = (head, anchor) else {
        return Err(MetalError::ChunkLost(head_key));
    };

    let actual = head.version.key_for(&stream);
    if actual != anchor {
        return Err(MetalError::AnchorMismatch {
            expected: anchor,
            actual,
        });
    }

    let (text_run, data_run) = stream.split_at(text_len);
    let text = if has_text {
        let end = text_run
            .iter()
            .position(|&byte| byte == TEXT_TERMINATOR)
            .unwrap_or(text_run.len());
        let text = String::from_utf8(text_run[..end].to_vec())
            .map_err(|e| MetalError::MalformedDescriptor(e.to_string()))?;
        Some(text)
    } else {
        None
    };

    let payload = match head.version {
        ChunkVersion::V1 => Bytes::from(BASE64_STANDARD.decode(data_run)?),
        ChunkVersion::V2 => Bytes::copy_from_slice(data_run),
    };

    Ok(DecodedChain {
        payload,
        text,
        head,
        keys,
    })
}
