use super::{MetadataEntry, MetadataRegistry};
use crate::codec::CHUNK_MAX_SIZE;
use crate::error::{MetalError, Result};
use crate::forge::WriteInstruction;
use crate::identity::{
    CompositeHash, CompositeHasher, MetadataTarget, MetalCoordinate, Sha3CompositeHasher,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    entries: HashMap<MetalCoordinate, Bytes>,
    by_hash: HashMap<CompositeHash, MetalCoordinate>,
}

/// In-process registry with the ledger's write rules: size deltas must
/// match the stored value and zero-length values are pruned.
pub struct MemoryRegistry {
    hasher: Arc<dyn CompositeHasher>,
    state: RwLock<MemoryState>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_hasher(Arc::new(Sha3CompositeHasher))
    }

    pub fn with_hasher(hasher: Arc<dyn CompositeHasher>) -> Self {
        Self {
            hasher,
            state: RwLock::new(MemoryState::default()),
        }
    }

    pub fn hasher(&self) -> Arc<dyn CompositeHasher> {
        self.hasher.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, coordinate: &MetalCoordinate) -> Option<Bytes> {
        self.state.read().await.entries.get(coordinate).cloned()
    }

    /// Store a value directly, bypassing size-delta checks.
    pub async fn insert_raw(&self, coordinate: MetalCoordinate, value: Bytes) {
        let hash = self.hasher.composite_hash(&coordinate);
        let mut state = self.state.write().await;
        state.entries.insert(coordinate, value);
        state.by_hash.insert(hash, coordinate);
    }

    pub async fn remove_raw(&self, coordinate: &MetalCoordinate) -> Option<Bytes> {
        let hash = self.hasher.composite_hash(coordinate);
        let mut state = self.state.write().await;
        state.by_hash.remove(&hash);
        state.entries.remove(coordinate)
    }
}

#[async_trait]
impl MetadataRegistry for MemoryRegistry {
    async fn search_entries(&self, target: &MetadataTarget) -> Result<Vec<MetadataEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|(coordinate, _)| coordinate.target == *target)
            .map(|(coordinate, value)| MetadataEntry {
                coordinate: *coordinate,
                composite_hash: self.hasher.composite_hash(coordinate),
                value: value.clone(),
            })
            .collect())
    }

    async fn get_entry_by_composite_hash(
        &self,
        hash: &CompositeHash,
    ) -> Result<Option<MetadataEntry>> {
        let state = self.state.read().await;
        Ok(state.by_hash.get(hash).and_then(|coordinate| {
            state.entries.get(coordinate).map(|value| MetadataEntry {
                coordinate: *coordinate,
                composite_hash: *hash,
                value: value.clone(),
            })
        }))
    }

    async fn propose_writes(
        &self,
        target: &MetadataTarget,
        instructions: &[WriteInstruction],
    ) -> Result<()> {
        let mut state = self.state.write().await;

        // Validate the whole batch before applying any of it.
        let mut lengths: HashMap<u64, usize> = HashMap::new();
        for instruction in instructions {
            if instruction.value.len() > CHUNK_MAX_SIZE {
                return Err(MetalError::Registry(format!(
                    "value for key {:016X} is {} bytes, limit is {}",
                    instruction.key,
                    instruction.value.len(),
                    CHUNK_MAX_SIZE
                )));
            }

            let coordinate = target.at(instruction.key);
            let existing = match lengths.get(&instruction.key) {
                Some(len) => *len,
                None => state.entries.get(&coordinate).map_or(0, Bytes::len),
            };
            let expected = instruction.value.len() as i64 - existing as i64;
            if i64::from(instruction.size_delta) != expected {
                return Err(MetalError::Registry(format!(
                    "size delta mismatch for key {:016X}: proposed {}, actual {}",
                    instruction.key, instruction.size_delta, expected
                )));
            }
            lengths.insert(instruction.key, instruction.value.len());
        }

        for instruction in instructions {
            let coordinate = target.at(instruction.key);
            let hash = self.hasher.composite_hash(&coordinate);
            if instruction.value.is_empty() {
                state.entries.remove(&coordinate);
                state.by_hash.remove(&hash);
            } else {
                state.entries.insert(coordinate, instruction.value.clone());
                state.by_hash.insert(hash, coordinate);
            }
        }

        tracing::debug!(
            "applied {} metadata writes for target type={:?} id={:016X}",
            instructions.len(),
            target.metadata_type,
            target.target_id
        );
        Ok(())
    }
}
