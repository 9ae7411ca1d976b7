use super::{MetalLocator, resolve_coordinate};
use crate::chain::decode_chain;
use crate::codec::ChunkHeader;
use crate::identity::{CompositeHasher, MetalCoordinate, metal_id};
use crate::registry::{MetadataRegistry, fetch_chunk_table};
use crate::{Result, Seal};
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct FetchMetalOperation {
    registry: Arc<dyn MetadataRegistry>,
    hasher: Arc<dyn CompositeHasher>,
}

#[derive(Debug, Clone)]
pub struct FetchMetalOperationRequest {
    pub locator: MetalLocator,
}

#[derive(Debug, Clone)]
pub struct FetchMetalOperationResult {
    pub coordinate: MetalCoordinate,
    pub metal_id: String,
    pub payload: Bytes,
    pub text: Option<String>,
    pub seal: Option<Seal>,
    pub head: ChunkHeader,
    pub chunk_count: usize,
}

#[derive(Debug, Clone)]
pub enum FetchMetalOperationOutcome {
    Found(FetchMetalOperationResult),
    NotFound,
}

impl FetchMetalOperation {
    pub fn new(registry: Arc<dyn MetadataRegistry>, hasher: Arc<dyn CompositeHasher>) -> Self {
        Self { registry, hasher }
    }

    pub async fn run(&self, request: FetchMetalOperationRequest) -> Result<FetchMetalOperationOutcome> {
        let Some(coordinate) = resolve_coordinate(self.registry.as_ref(), &request.locator).await?
        else {
            return Ok(FetchMetalOperationOutcome::NotFound);
        };

        let table = fetch_chunk_table(self.registry.as_ref(), &coordinate.target).await?;
        if !table.contains_key(&coordinate.key) {
            return Ok(FetchMetalOperationOutcome::NotFound);
        }

        let decoded = decode_chain(coordinate.key, table)?;
        let seal = match decoded.seal() {
            Ok(seal) => seal,
            Err(error) => {
                tracing::warn!(
                    "chain {:016X} carries an unreadable descriptor: {}",
                    coordinate.key,
                    error
                );
                None
            }
        };

        let metal_id = metal_id(self.hasher.as_ref(), &coordinate);
        tracing::debug!(
            "fetched metal {} chunks={} bytes={}",
            metal_id,
            decoded.keys.len(),
            decoded.payload.len()
        );

        Ok(FetchMetalOperationOutcome::Found(FetchMetalOperationResult {
            coordinate,
            metal_id,
            payload: decoded.payload,
            text: decoded.text,
            seal,
            head: decoded.head,
            chunk_count: decoded.keys.len(),
        }))
    }
}
