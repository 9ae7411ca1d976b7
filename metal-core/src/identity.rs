//! Metadata coordinates and Metal IDs.
//!
//! A chain lives at `(type, source, target, target_id, head_key)` in the
//! metadata registry. The registry identifies that entry by a composite
//! hash, and a Metal ID is the Base58 form of that hash behind a fixed
//! two-byte header. The coordinate fields themselves cannot be recovered
//! from a Metal ID; they come back from a registry lookup.

use crate::error::{MetalError, Result};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;

pub const METAL_ID_HEADER: [u8; 2] = [0x0B, 0x2A];
pub const ADDRESS_SIZE: usize = 24;
pub const COMPOSITE_HASH_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum MetadataType {
    Account = 0,
    Mosaic = 1,
    Namespace = 2,
}

/// A raw ledger address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl FromStr for Address {
    type Err = MetalError;

    fn from_str(s: &str) -> Result<Self> {
        let mut raw = [0u8; ADDRESS_SIZE];
        hex::decode_to_slice(s.trim(), &mut raw)
            .map_err(|e| MetalError::InvalidIdentity(format!("address {:?}: {}", s, e)))?;
        Ok(Self(raw))
    }
}

/// Everything that locates a metadata entry except its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataTarget {
    pub metadata_type: MetadataType,
    pub source: Address,
    pub target: Address,
    /// Mosaic or namespace id; zero for account metadata.
    pub target_id: u64,
}

impl MetadataTarget {
    pub fn account(source: Address, target: Address) -> Self {
        Self {
            metadata_type: MetadataType::Account,
            source,
            target,
            target_id: 0,
        }
    }

    pub fn mosaic(source: Address, target: Address, mosaic_id: u64) -> Self {
        Self {
            metadata_type: MetadataType::Mosaic,
            source,
            target,
            target_id: mosaic_id,
        }
    }

    pub fn namespace(source: Address, target: Address, namespace_id: u64) -> Self {
        Self {
            metadata_type: MetadataType::Namespace,
            source,
            target,
            target_id: namespace_id,
        }
    }

    pub fn at(self, key: u64) -> MetalCoordinate {
        MetalCoordinate { target: self, key }
    }
}

/// Full on-ledger location of a chain: its target plus the head key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetalCoordinate {
    pub target: MetadataTarget,
    pub key: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeHash(pub [u8; COMPOSITE_HASH_SIZE]);

impl fmt::Display for CompositeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

/// The registry's entry-identifying hash, supplied by the ledger layer.
pub trait CompositeHasher: Send + Sync {
    fn composite_hash(&self, coordinate: &MetalCoordinate) -> CompositeHash;
}

/// SHA3-256 over `source || target || key (LE) || target_id (LE) || type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha3CompositeHasher;

impl CompositeHasher for Sha3CompositeHasher {
    fn composite_hash(&self, coordinate: &MetalCoordinate) -> CompositeHash {
        let target = &coordinate.target;
        let mut hasher = Sha3_256::new();
        hasher.update(target.source.as_bytes());
        hasher.update(target.target.as_bytes());
        hasher.update(coordinate.key.to_le_bytes());
        hasher.update(target.target_id.to_le_bytes());
        hasher.update([target.metadata_type as u8]);
        CompositeHash(hasher.finalize().into())
    }
}

pub fn metal_id_from_hash(hash: &CompositeHash) -> String {
    let mut raw = Vec::with_capacity(METAL_ID_HEADER.len() + COMPOSITE_HASH_SIZE);
    raw.extend_from_slice(&METAL_ID_HEADER);
    raw.extend_from_slice(&hash.0);
    bs58::encode(raw).into_string()
}

pub fn metal_id(hasher: &dyn CompositeHasher, coordinate: &MetalCoordinate) -> String {
    metal_id_from_hash(&hasher.composite_hash(coordinate))
}

/// Recover the composite hash behind a Metal ID.
pub fn restore_metal_id(metal_id: &str) -> Result<CompositeHash> {
    let raw = bs58::decode(metal_id.trim())
        .into_vec()
        .map_err(|e| MetalError::InvalidIdentity(e.to_string()))?;

    if raw.len() != METAL_ID_HEADER.len() + COMPOSITE_HASH_SIZE {
        return Err(MetalError::InvalidIdentity(format!(
            "decoded length {} is not {}",
            raw.len(),
            METAL_ID_HEADER.len() + COMPOSITE_HASH_SIZE
        )));
    }
    if raw[..METAL_ID_HEADER.len()] != METAL_ID_HEADER {
        return Err(MetalError::InvalidIdentity(format!(
            "unexpected header {}",
            hex::encode_upper(&raw[..METAL_ID_HEADER.len()])
        )));
    }

    let mut hash = [0u8; COMPOSITE_HASH_SIZE];
    hash.copy_from_slice(&raw[METAL_ID_HEADER.len()..]);
    Ok(CompositeHash(hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn address(fill: u8) -> Address {
        Address([fill; ADDRESS_SIZE])
    }

    #[test]
    fn test_metal_id_restores_composite_hash() {
        let coordinate = MetadataTarget::account(address(1), address(2)).at(0x1234);
        let hash = Sha3CompositeHasher.composite_hash(&coordinate);
        let id = metal_id(&Sha3CompositeHasher, &coordinate);

        assert_eq!(restore_metal_id(&id).unwrap(), hash);
        assert_eq!(metal_id_from_hash(&hash), id);
    }

    #[test]
    fn test_composite_hash_covers_every_field() {
        let base = MetadataTarget::mosaic(address(1), address(2), 77).at(5);
        let hash = Sha3CompositeHasher.composite_hash(&base);

        let mut variants = vec![base; 5];
        variants[0].target.source = address(9);
        variants[1].target.target = address(9);
        variants[2].target.target_id = 78;
        variants[3].target.metadata_type = MetadataType::Namespace;
        variants[4].key = 6;

        for variant in variants {
            assert_ne!(Sha3CompositeHasher.composite_hash(&variant), hash);
        }
    }

    #[test]
    fn test_restore_rejects_wrong_header() {
        let mut raw = vec![0x0B, 0x2B];
        raw.extend_from_slice(&[0u8; COMPOSITE_HASH_SIZE]);
        let id = bs58::encode(raw).into_string();
        assert!(matches!(
            restore_metal_id(&id),
            Err(MetalError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_restore_rejects_garbage() {
        for id in ["", "0OIl", "FeHj", &bs58::encode([0x0B, 0x2A, 1]).into_string()] {
            assert!(
                matches!(restore_metal_id(id), Err(MetalError::InvalidIdentity(_))),
                "accepted {:?}",
                id
            );
        }
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let address = address(0xAB);
        let parsed: Address = address.to_string().parse().unwrap();
        assert_eq!(parsed, address);
        assert!("ABCD".parse::<Address>().is_err());
    }

    proptest! {
        #[test]
        fn prop_identity_inverse(
            source in any::<[u8; ADDRESS_SIZE]>(),
            target in any::<[u8; ADDRESS_SIZE]>(),
            target_id in any::<u64>(),
            key in any::<u64>(),
            kind in 0u8..3,
        ) {
            let metadata_type = match kind {
                0 => MetadataType::Account,
                1 => MetadataType::Mosaic,
                _ => MetadataType::Namespace,
            };
            let coordinate = MetalCoordinate {
                target: MetadataTarget {
                    metadata_type,
                    source: Address(source),
                    target: Address(target),
                    target_id,
                },
                key,
            };
            let id = metal_id(&Sha3CompositeHasher, &coordinate);
            prop_assert_eq!(
                restore_metal_id(&id).unwrap(),
                Sha3CompositeHasher.composite_hash(&coordinate)
            );
        }
    }
}
