use crate::codec::ChunkVersion;
use crate::error::{MetalError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetalConfig {
    /// Chunk format used for new chains.
    #[serde(default)]
    pub version: ChunkVersion,
    /// Additive tried first when forging.
    #[serde(default)]
    pub additive: u16,
    /// Chain builds attempted before a forge gives up on key collisions.
    #[serde(default = "default_max_forge_attempts")]
    pub max_forge_attempts: u32,
}

fn default_max_forge_attempts() -> u32 {
    16
}

impl Default for MetalConfig {
    fn default() -> Self {
        Self {
            version: ChunkVersion::default(),
            additive: 0,
            max_forge_attempts: default_max_forge_attempts(),
        }
    }
}

impl MetalConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("METAL"))
            .build()
            .map_err(|e| MetalError::Config(e.to_string()))?;

        let config: MetalConfig = settings
            .try_deserialize()
            .map_err(|e| MetalError::Config(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn with_version(mut self, version: ChunkVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_additive(mut self, additive: u16) -> Self {
        self.additive = additive;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_forge_attempts == 0 {
            return Err(MetalError::Config(
                "max_forge_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
