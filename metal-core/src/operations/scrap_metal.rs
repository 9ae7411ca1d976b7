use super::{MetalLocator, resolve_coordinate};
use crate::forge::{ForgeOptions, ScrapOutcome, WriteInstruction, plan_destroy, plan_scrap};
use crate::identity::{MetadataTarget, MetalCoordinate};
use crate::registry::{MetadataRegistry, fetch_chunk_table};
use crate::{MetalError, Result};
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct ScrapMetalOperation {
    registry: Arc<dyn MetadataRegistry>,
}

#[derive(Debug, Clone)]
pub enum ScrapSource {
    /// Walk a stored chain from its head and remove every chunk.
    Chain(MetalLocator),
    /// Recompute the chain of a local payload and remove the chunks of it
    /// that are stored, without needing the head key.
    LocalPayload {
        target: MetadataTarget,
        payload: Bytes,
        options: ForgeOptions,
    },
}

#[derive(Debug, Clone)]
pub struct ScrapMetalOperationRequest {
    pub source: ScrapSource,
    /// Submit the removals computed before a broken link.
    pub apply_partial: bool,
}

#[derive(Debug)]
pub enum ScrapMetalOperationOutcome {
    Scrapped {
        coordinate: MetalCoordinate,
        removed: usize,
    },
    Partial {
        coordinate: MetalCoordinate,
        removed: usize,
        pending: usize,
        error: MetalError,
    },
    NotFound,
}

impl ScrapMetalOperation {
    pub fn new(registry: Arc<dyn MetadataRegistry>) -> Self {
        Self { registry }
    }

    pub async fn run(&self, request: ScrapMetalOperationRequest) -> Result<ScrapMetalOperationOutcome> {
        let ScrapMetalOperationRequest {
            source,
            apply_partial,
        } = request;

        match source {
            ScrapSource::Chain(locator) => self.scrap_chain(&locator, apply_partial).await,
            ScrapSource::LocalPayload {
                target,
                payload,
                options,
            } => self.destroy_payload(target, &payload, &options).await,
        }
    }

    async fn scrap_chain(
        &self,
        locator: &MetalLocator,
        apply_partial: bool,
    ) -> Result<ScrapMetalOperationOutcome> {
        let Some(coordinate) = resolve_coordinate(self.registry.as_ref(), locator).await? else {
            return Ok(ScrapMetalOperationOutcome::NotFound);
        };

        let table = fetch_chunk_table(self.registry.as_ref(), &coordinate.target).await?;
        match plan_scrap(coordinate.key, &table) {
            ScrapOutcome::Complete(instructions) => {
                let removed = self.submit(&coordinate.target, &instructions).await?;
                tracing::info!(
                    "scrapped chain {:016X} removed={}",
                    coordinate.key,
                    removed
                );
                Ok(ScrapMetalOperationOutcome::Scrapped {
                    coordinate,
                    removed,
                })
            }
            ScrapOutcome::Partial {
                instructions,
                error,
            } => {
                let (removed, pending) = if apply_partial {
                    (self.submit(&coordinate.target, &instructions).await?, 0)
                } else {
                    (0, instructions.len())
                };
                tracing::warn!(
                    "partial scrap of chain {:016X} removed={} pending={} error={}",
                    coordinate.key,
                    removed,
                    pending,
                    error
                );
                Ok(ScrapMetalOperationOutcome::Partial {
                    coordinate,
                    removed,
                    pending,
                    error,
                })
            }
        }
    }

    async fn destroy_payload(
        &self,
        target: MetadataTarget,
        payload: &[u8],
        options: &ForgeOptions,
    ) -> Result<ScrapMetalOperationOutcome> {
        let table = fetch_chunk_table(self.registry.as_ref(), &target).await?;
        let plan = plan_destroy(payload, options, &table)?;
        let coordinate = target.at(plan.chain.head_key);

        if plan.instructions.is_empty() {
            return Ok(ScrapMetalOperationOutcome::NotFound);
        }

        let removed = self.submit(&target, &plan.instructions).await?;
        tracing::info!(
            "destroyed chain {:016X} removed={} expected={}",
            coordinate.key,
            removed,
            plan.chain.chunks.len()
        );
        Ok(ScrapMetalOperationOutcome::Scrapped {
            coordinate,
            removed,
        })
    }

    async fn submit(&self, target: &MetadataTarget, instructions: &[WriteInstruction]) -> Result<usize> {
        if !instructions.is_empty() {
            self.registry.propose_writes(target, instructions).await?;
        }
        Ok(instructions.len())
    }
}
