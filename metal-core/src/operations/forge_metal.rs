use crate::codec::ChunkVersion;
use crate::forge::{ForgeOptions, plan_forge};
use crate::identity::{CompositeHasher, MetadataTarget, MetalCoordinate, metal_id};
use crate::registry::{MetadataRegistry, fetch_chunk_table};
use crate::{MetalConfig, Result, Seal};
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct ForgeMetalOperation {
    registry: Arc<dyn MetadataRegistry>,
    hasher: Arc<dyn CompositeHasher>,
    config: MetalConfig,
}

#[derive(Debug, Clone)]
pub struct ForgeMetalOperationRequest {
    pub target: MetadataTarget,
    pub payload: Bytes,
    pub seal: Option<Seal>,
    /// Overrides the configured additive.
    pub additive: Option<u16>,
    /// Overrides the configured chunk version.
    pub version: Option<ChunkVersion>,
}

impl ForgeMetalOperationRequest {
    pub fn new(target: MetadataTarget, payload: impl Into<Bytes>) -> Self {
        Self {
            target,
            payload: payload.into(),
            seal: None,
            additive: None,
            version: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForgeMetalOperationResult {
    pub coordinate: MetalCoordinate,
    pub metal_id: String,
    pub additive: u16,
    pub written: usize,
    pub skipped: usize,
    pub attempts: u32,
}

impl ForgeMetalOperation {
    pub fn new(
        registry: Arc<dyn MetadataRegistry>,
        hasher: Arc<dyn CompositeHasher>,
        config: MetalConfig,
    ) -> Self {
        Self {
            registry,
            hasher,
            config,
        }
    }

    pub async fn run(&self, request: ForgeMetalOperationRequest) -> Result<ForgeMetalOperationResult> {
        let ForgeMetalOperationRequest {
            target,
            payload,
            seal,
            additive,
            version,
        } = request;

        let mut options = ForgeOptions::from_config(&self.config);
        if let Some(additive) = additive {
            options.additive = additive;
        }
        if let Some(version) = version {
            options.version = version;
        }
        if let Some(seal) = &seal {
            options = options.with_seal(seal);
        }

        let table = fetch_chunk_table(self.registry.as_ref(), &target).await?;
        let plan = {
            let mut rng = rand::thread_rng();
            plan_forge(
                &payload,
                &options,
                &table,
                self.config.max_forge_attempts,
                &mut rng,
            )?
        };

        if !plan.writes.is_empty() {
            self.registry.propose_writes(&target, &plan.writes).await?;
        }

        let coordinate = target.at(plan.head_key());
        let metal_id = metal_id(self.hasher.as_ref(), &coordinate);
        tracing::info!(
            "forged metal {} head={:016X} written={} skipped={} attempts={}",
            metal_id,
            plan.head_key(),
            plan.writes.len(),
            plan.skipped,
            plan.attempts
        );

        Ok(ForgeMetalOperationResult {
            coordinate,
            metal_id,
            additive: plan.additive(),
            written: plan.writes.len(),
            skipped: plan.skipped,
            attempts: plan.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Address, Sha3CompositeHasher};
    use crate::registry::MemoryRegistry;

    fn operation(registry: Arc<MemoryRegistry>, config: MetalConfig) -> ForgeMetalOperation {
        ForgeMetalOperation::new(registry, Arc::new(Sha3CompositeHasher), config)
    }

    fn target() -> MetadataTarget {
        MetadataTarget::mosaic(Address([3; 24]), Address([4; 24]), 0x1122_3344)
    }

    #[tokio::test]
    async fn test_forge_writes_chain() {
        let registry = Arc::new(MemoryRegistry::new());
        let op = operation(registry.clone(), MetalConfig::default());

        let payload = vec![9u8; 2500];
        let result = op
            .run(ForgeMetalOperationRequest::new(target(), payload))
            .await
            .unwrap();

        assert_eq!(result.written, 3);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.additive, 0);
        assert_eq!(registry.len().await, 3);
        assert!(registry.get(&result.coordinate).await.is_some());
    }

    #[tokio::test]
    async fn test_reforge_writes_nothing() {
        let registry = Arc::new(MemoryRegistry::new());
        let op = operation(registry.clone(), MetalConfig::default());

        let mut request = ForgeMetalOperationRequest::new(target(), vec![1u8; 3000]);
        request.seal = Some(Seal::new(3000).with_name("ones.bin"));
        let first = op.run(request.clone()).await.unwrap();
        let second = op.run(request).await.unwrap();

        assert_eq!(second.written, 0);
        assert_eq!(second.skipped, first.written);
        assert_eq!(second.metal_id, first.metal_id);
    }

    #[tokio::test]
    async fn test_request_overrides_config() {
        let registry = Arc::new(MemoryRegistry::new());
        let op = operation(registry.clone(), MetalConfig::default().with_additive(7));

        let mut request = ForgeMetalOperationRequest::new(target(), b"hello".to_vec());
        let configured = op.run(request.clone()).await.unwrap();
        assert_eq!(configured.additive, 7);

        request.additive = Some(8);
        request.version = Some(ChunkVersion::V1);
        let overridden = op.run(request).await.unwrap();
        assert_eq!(overridden.additive, 8);
        assert_eq!(overridden.coordinate.key >> 63, 0);
        assert_ne!(overridden.coordinate.key, configured.coordinate.key);
    }

    #[tokio::test]
    async fn test_forge_rejects_seal_on_v1() {
        let registry = Arc::new(MemoryRegistry::new());
        let op = operation(registry.clone(), MetalConfig::default().with_version(ChunkVersion::V1));

        let mut request = ForgeMetalOperationRequest::new(target(), b"data".to_vec());
        request.seal = Some(Seal::new(4));
        assert!(matches!(
            op.run(request).await,
            Err(crate::MetalError::MalformedDescriptor(_))
        ));
        assert!(registry.is_empty().await);
    }
}
