//! Metal Core - storing arbitrary payloads as chains of ledger metadata entries
//!
//! A payload is cut into slices of at most 1 KiB, each packed into a chunk
//! whose metadata key is the checksum of the chunk value. Every chunk links
//! to the key of the next one, so the head key alone locates the chain:
//! - v1 chunks carry Base64 text behind a 24-byte ASCII header
//! - v2 chunks carry raw bytes behind a 12-byte binary header
//! - an optional Seal descriptor travels ahead of a v2 payload
//! - Metal IDs are Base58 forms of the head entry's composite hash

pub mod chain;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod forge;
pub mod identity;
pub mod operations;
pub mod registry;
pub mod seal;

pub use chain::{BuiltChain, ChainWalker, ChunkTable, DecodedChain, build_chain, decode_chain};
pub use checksum::{checksum, checksum_v1};
pub use codec::{Chunk, ChunkHeader, ChunkVersion, Magic, PackedChunk, pack, unpack};
pub use config::MetalConfig;
pub use error::{MetalError, Result};
pub use forge::{
    DestroyPlan, ForgeOptions, ForgePlan, ScrapOutcome, WriteInstruction, plan_destroy, plan_forge,
    plan_scrap,
};
pub use identity::{
    Address, CompositeHash, CompositeHasher, MetadataTarget, MetadataType, MetalCoordinate,
    Sha3CompositeHasher, metal_id, metal_id_from_hash, restore_metal_id,
};
pub use registry::{MemoryRegistry, MetadataEntry, MetadataRegistry, fetch_chunk_table};
pub use seal::Seal;
