use rand::Rng;
use sha3::{Digest, Sha3_256};

/// Keys with the top bit cleared, as required by version 1 chains.
pub const V1_KEY_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Compute the 64-bit checksum of data.
///
/// The checksum is the first eight bytes of SHA3-256 read little-endian.
pub fn checksum(data: &[u8]) -> u64 {
    let digest = Sha3_256::digest(data);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Compute the 63-bit checksum used by version 1 chains.
pub fn checksum_v1(data: &[u8]) -> u64 {
    checksum(data) & V1_KEY_MASK
}

/// Pick a fresh additive for a collision retry.
pub fn random_additive<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    rng.gen_range(0..=u16::MAX)
}
