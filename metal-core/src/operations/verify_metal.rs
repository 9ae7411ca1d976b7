use super::{FetchMetalOperation, FetchMetalOperationOutcome, FetchMetalOperationRequest, MetalLocator};
use crate::Result;
use crate::identity::{CompositeHasher, MetalCoordinate};
use crate::registry::MetadataRegistry;
use bytes::Bytes;
use std::sync::Arc;

/// Compares a stored chain against a local payload.
#[derive(Clone)]
pub struct VerifyMetalOperation {
    fetch: FetchMetalOperation,
}

#[derive(Debug, Clone)]
pub struct VerifyMetalOperationRequest {
    pub locator: MetalLocator,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyMetalOperationOutcome {
    Match {
        coordinate: MetalCoordinate,
    },
    Mismatch {
        coordinate: MetalCoordinate,
        expected_len: usize,
        actual_len: usize,
        /// Offset of the first differing byte, `None` when one side is a
        /// prefix of the other.
        first_difference: Option<usize>,
    },
    NotFound,
}

impl VerifyMetalOperation {
    pub fn new(registry: Arc<dyn MetadataRegistry>, hasher: Arc<dyn CompositeHasher>) -> Self {
        Self {
            fetch: FetchMetalOperation::new(registry, hasher),
        }
    }

    pub async fn run(&self, request: VerifyMetalOperationRequest) -> Result<VerifyMetalOperationOutcome> {
        let VerifyMetalOperationRequest { locator, payload } = request;

        let outcome = self
            .fetch
            .run(FetchMetalOperationRequest { locator })
            .await?;
        let FetchMetalOperationOutcome::Found(stored) = outcome else {
            return Ok(VerifyMetalOperationOutcome::NotFound);
        };

        let coordinate = stored.coordinate;
        if stored.payload == payload {
            tracing::debug!("metal {} matches local payload", stored.metal_id);
            return Ok(VerifyMetalOperationOutcome::Match { coordinate });
        }

        let first_difference = stored
            .payload
            .iter()
            .zip(payload.iter())
            .position(|(stored, local)| stored != local);
        tracing::info!(
            "metal {} differs from local payload stored={} local={} at={:?}",
            stored.metal_id,
            stored.payload.len(),
            payload.len(),
            first_difference
        );

        Ok(VerifyMetalOperationOutcome::Mismatch {
            coordinate,
            expected_len: payload.len(),
            actual_len: stored.payload.len(),
            first_difference,
        })
    }
}
