//! Access to the ledger's metadata registry.
//!
//! Reads are batched per [`MetadataTarget`]: a chain's length is unknown
//! until it is walked, so the whole target is fetched once and the walk
//! runs over the resulting [`ChunkTable`].

pub mod memory;

pub use memory::MemoryRegistry;

use crate::chain::ChunkTable;
use crate::error::Result;
use crate::forge::WriteInstruction;
use crate::identity::{CompositeHash, MetadataTarget, MetalCoordinate};
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub coordinate: MetalCoordinate,
    pub composite_hash: CompositeHash,
    pub value: Bytes,
}

#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    /// All entries stored under `target`.
    async fn search_entries(&self, target: &MetadataTarget) -> Result<Vec<MetadataEntry>>;

    async fn get_entry_by_composite_hash(
        &self,
        hash: &CompositeHash,
    ) -> Result<Option<MetadataEntry>>;

    /// Submit writes for `target`. An empty value removes the entry.
    async fn propose_writes(
        &self,
        target: &MetadataTarget,
        instructions: &[WriteInstruction],
    ) -> Result<()>;
}

/// Fetch every entry of `target` as a key-value table.
pub async fn fetch_chunk_table(
    registry: &dyn MetadataRegistry,
    target: &MetadataTarget,
) -> Result<ChunkTable> {
    let entries = registry.search_entries(target).await?;
    Ok(entries
        .into_iter()
        .map(|entry| (entry.coordinate.key, entry.value))
        .collect())
}
