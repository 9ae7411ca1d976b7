use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetalError {
    #[error("malformed chunk header: {0}")]
    MalformedHeader(String),

    #[error("malformed chunk magic: 0x{0:02X}")]
    MalformedMagic(u8),

    #[error("unsupported chunk version: 0x{0:02X}")]
    UnsupportedVersion(u8),

    #[error("chunk checksum mismatch: expected {expected:016X}, actual {actual:016X}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    #[error("chunk too large: {size} bytes exceeds {max}")]
    ChunkTooLarge { size: usize, max: usize },

    #[error("chunk lost: {0:016X}")]
    ChunkLost(u64),

    #[error("chain anchor mismatch: expected {expected:016X}, actual {actual:016X}")]
    AnchorMismatch { expected: u64, actual: u64 },

    #[error("chunk key collision: {key:016X}")]
    KeyCollision { key: u64 },

    #[error("key collisions persisted after {attempts} attempts")]
    CollisionRetriesExhausted { attempts: u32 },

    #[error("payload is empty")]
    EmptyPayload,

    #[error("invalid metal id: {0}")]
    InvalidIdentity(String),

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, MetalError>;
