pub mod fetch_metal;
pub mod forge_metal;
pub mod scrap_metal;
pub mod verify_metal;

pub use fetch_metal::{
    FetchMetalOperation, FetchMetalOperationOutcome, FetchMetalOperationRequest,
    FetchMetalOperationResult,
};
pub use forge_metal::{ForgeMetalOperation, ForgeMetalOperationRequest, ForgeMetalOperationResult};
pub use scrap_metal::{
    ScrapMetalOperation, ScrapMetalOperationOutcome, ScrapMetalOperationRequest, ScrapSource,
};
pub use verify_metal::{
    VerifyMetalOperation, VerifyMetalOperationOutcome, VerifyMetalOperationRequest,
};

use crate::Result;
use crate::identity::{MetalCoordinate, restore_metal_id};
use crate::registry::MetadataRegistry;

/// How a caller names an existing chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetalLocator {
    MetalId(String),
    Coordinate(MetalCoordinate),
}

async fn resolve_coordinate(
    registry: &dyn MetadataRegistry,
    locator: &MetalLocator,
) -> Result<Option<MetalCoordinate>> {
    match locator {
        MetalLocator::Coordinate(coordinate) => Ok(Some(*coordinate)),
        MetalLocator::MetalId(metal_id) => {
            let hash = restore_metal_id(metal_id)?;
            let entry = registry.get_entry_by_composite_hash(&hash).await?;
            Ok(entry.map(|entry| entry.coordinate))
        }
    }
}
