//! Forge, scrap and destroy planning.
//!
//! Planners are pure: they take a pre-fetched [`ChunkTable`] of one metadata
//! target and return the write instructions to hand to the registry. Removal
//! is an overwrite with an empty value; the registry prunes zero-length
//! entries itself.

use crate::chain::{BuiltChain, ChainWalker, ChunkTable, build_chain};
use crate::checksum::random_additive;
use crate::codec::ChunkVersion;
use crate::config::MetalConfig;
use crate::error::{MetalError, Result};
use crate::seal::Seal;
use bytes::Bytes;
use rand::Rng;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteInstruction {
    pub key: u64,
    pub value: Bytes,
    /// New value length minus the length currently stored under `key`.
    pub size_delta: i16,
}

impl WriteInstruction {
    /// Fails with [`MetalError::ChunkTooLarge`] when the length change does
    /// not fit the registry's `i16` size delta.
    pub fn write(key: u64, value: Bytes, existing_len: usize) -> Result<Self> {
        let size_delta = size_delta(value.len(), existing_len)?;
        Ok(Self {
            key,
            value,
            size_delta,
        })
    }

    pub fn removal(key: u64, existing_len: usize) -> Result<Self> {
        Self::write(key, Bytes::new(), existing_len)
    }

    pub fn is_removal(&self) -> bool {
        self.value.is_empty()
    }
}

fn size_delta(new_len: usize, existing_len: usize) -> Result<i16> {
    let delta = new_len as i64 - existing_len as i64;
    i16::try_from(delta).map_err(|_| MetalError::ChunkTooLarge {
        size: new_len.max(existing_len),
        max: i16::MAX as usize,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForgeOptions {
    pub version: ChunkVersion,
    pub additive: u16,
    /// Descriptor text spliced ahead of the payload (v2 only).
    pub text: Option<String>,
}

impl ForgeOptions {
    pub fn from_config(config: &MetalConfig) -> Self {
        Self {
            version: config.version,
            additive: config.additive,
            text: None,
        }
    }

    pub fn with_additive(mut self, additive: u16) -> Self {
        self.additive = additive;
        self
    }

    pub fn with_seal(mut self, seal: &Seal) -> Self {
        self.text = Some(seal.stringify());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ForgePlan {
    pub chain: BuiltChain,
    /// Chunks missing from the snapshot, in chain order.
    pub writes: Vec<WriteInstruction>,
    /// Chunks already stored with identical bytes.
    pub skipped: usize,
    /// Chain builds it took to get a collision-free chain.
    pub attempts: u32,
}

impl ForgePlan {
    pub fn head_key(&self) -> u64 {
        self.chain.head_key
    }

    pub fn additive(&self) -> u16 {
        self.chain.additive
    }
}

/// Build a chain for `payload` and diff it against `snapshot`.
///
/// Chunks already stored with the same bytes are skipped, so re-forging a
/// complete chain yields no writes. Key collisions, inside the chain or with
/// foreign entries in the snapshot, restart the build with a random
/// additive, up to `max_attempts` builds.
pub fn plan_forge<R: Rng + ?Sized>(
    payload: &[u8],
    options: &ForgeOptions,
    snapshot: &ChunkTable,
    max_attempts: u32,
    rng: &mut R,
) -> Result<ForgePlan> {
    let max_attempts = max_attempts.max(1);
    let mut additive = options.additive;
    let mut tried = HashSet::new();

    for attempt in 1..=max_attempts {
        tried.insert(additive);
        match build_chain(options.version, payload, options.text.as_deref(), additive) {
            Ok(chain) => match foreign_collision(&chain, snapshot) {
                Some(key) => {
                    tracing::warn!(
                        "chunk {:016X} collides with a foreign entry. additive={:04X} attempt={}",
                        key,
                        additive,
                        attempt
                    );
                }
                None => return diff_chain(chain, snapshot, attempt),
            },
            Err(MetalError::KeyCollision { key }) => {
                tracing::warn!(
                    "chunk {:016X} collides inside the chain. additive={:04X} attempt={}",
                    key,
                    additive,
                    attempt
                );
            }
            Err(error) => return Err(error),
        }

        additive = match untried_additive(rng, &tried) {
            Some(next) => next,
            None => break,
        };
    }

    // Every attempt used a distinct additive.
    Err(MetalError::CollisionRetriesExhausted {
        attempts: tried.len() as u32,
    })
}

/// A random additive outside `tried`, or `None` once every value was used.
fn untried_additive<R: Rng + ?Sized>(rng: &mut R, tried: &HashSet<u16>) -> Option<u16> {
    if tried.len() > usize::from(u16::MAX) {
        return None;
    }
    let mut additive = random_additive(rng);
    while tried.contains(&additive) {
        additive = additive.wrapping_add(1);
    }
    Some(additive)
}

fn foreign_collision(chain: &BuiltChain, snapshot: &ChunkTable) -> Option<u64> {
    chain.chunks.iter().find_map(|chunk| match snapshot.get(&chunk.key) {
        Some(existing) if !existing.is_empty() && *existing != chunk.value => Some(chunk.key),
        _ => None,
    })
}

fn diff_chain(chain: BuiltChain, snapshot: &ChunkTable, attempts: u32) -> Result<ForgePlan> {
    let mut writes = Vec::with_capacity(chain.chunks.len());
    let mut skipped = 0;

    for chunk in &chain.chunks {
        match snapshot.get(&chunk.key) {
            Some(existing) if *existing == chunk.value => skipped += 1,
            existing => writes.push(WriteInstruction::write(
                chunk.key,
                chunk.value.clone(),
                existing.map_or(0, Bytes::len),
            )?),
        }
    }

    tracing::debug!(
        "planned forge head={:016X} chunks={} writes={} skipped={}",
        chain.head_key,
        chain.chunks.len(),
        writes.len(),
        skipped
    );

    Ok(ForgePlan {
        chain,
        writes,
        skipped,
        attempts,
    })
}

/// Proposed keys that already hold a value in `snapshot`.
pub fn check_collisions(
    keys: impl IntoIterator<Item = u64>,
    snapshot: &ChunkTable,
) -> Vec<u64> {
    keys.into_iter()
        .filter(|key| snapshot.contains_key(key))
        .collect()
}

#[derive(Debug)]
pub enum ScrapOutcome {
    Complete(Vec<WriteInstruction>),
    /// The walk stopped at `error`; `instructions` cover the chunks before it.
    Partial {
        instructions: Vec<WriteInstruction>,
        error: MetalError,
    },
}

impl ScrapOutcome {
    pub fn instructions(&self) -> &[WriteInstruction] {
        match self {
            ScrapOutcome::Complete(instructions) => instructions,
            ScrapOutcome::Partial { instructions, .. } => instructions,
        }
    }

    pub fn into_instructions(self) -> Vec<WriteInstruction> {
        match self {
            ScrapOutcome::Complete(instructions) => instructions,
            ScrapOutcome::Partial { instructions, .. } => instructions,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ScrapOutcome::Complete(_))
    }
}

/// Walk the chain at `head_key` and emit a removal for every chunk.
///
/// A head that is absent or already empty means the chain was scrapped
/// before, which yields an empty plan.
pub fn plan_scrap(head_key: u64, snapshot: &ChunkTable) -> ScrapOutcome {
    match snapshot.get(&head_key) {
        Some(value) if !value.is_empty() => {}
        _ => {
            tracing::debug!("chain {:016X} is already scrapped", head_key);
            return ScrapOutcome::Complete(Vec::new());
        }
    }

    let mut walker = ChainWalker::new(head_key, snapshot.clone());
    let mut instructions = Vec::new();
    loop {
        let step = walker.next_chunk().and_then(|visited| {
            visited
                .map(|visited| WriteInstruction::removal(visited.key, visited.value.len()))
                .transpose()
        });
        match step {
            Ok(Some(instruction)) => instructions.push(instruction),
            Ok(None) => return ScrapOutcome::Complete(instructions),
            Err(error) => {
                tracing::warn!(
                    "scrap of chain {:016X} stopped after {} chunks: {}",
                    head_key,
                    instructions.len(),
                    error
                );
                return ScrapOutcome::Partial {
                    instructions,
                    error,
                };
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DestroyPlan {
    pub chain: BuiltChain,
    /// Removals for expected chunks confirmed present with identical bytes.
    pub instructions: Vec<WriteInstruction>,
}

/// Recompute the chain of a local payload and remove whatever of it is stored.
pub fn plan_destroy(
    payload: &[u8],
    options: &ForgeOptions,
    snapshot: &ChunkTable,
) -> Result<DestroyPlan> {
    let chain = build_chain(options.version, payload, options.text.as_deref(), options.additive)?;
    let instructions: Vec<WriteInstruction> = chain
        .chunks
        .iter()
        .filter(|chunk| snapshot.get(&chunk.key) == Some(&chunk.value))
        .map(|chunk| WriteInstruction::removal(chunk.key, chunk.value.len()))
        .collect::<Result<_>>()?;

    tracing::debug!(
        "planned destroy head={:016X} expected={} present={}",
        chain.head_key,
        chain.chunks.len(),
        instructions.len()
    );

    Ok(DestroyPlan {
        chain,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    fn sample_payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 253) as u8).collect()
    }

    fn apply(snapshot: &mut ChunkTable, instructions: &[WriteInstruction]) {
        for instruction in instructions {
            if instruction.is_removal() {
                snapshot.remove(&instruction.key);
            } else {
                snapshot.insert(instruction.key, instruction.value.clone());
            }
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_forge_into_empty_snapshot() {
        let payload = sample_payload(2500);
        let plan = plan_forge(&payload, &ForgeOptions::default(), &ChunkTable::new(), 4, &mut rng())
            .unwrap();

        assert_eq!(plan.attempts, 1);
        assert_eq!(plan.additive(), 0);
        assert_eq!(plan.skipped, 0);
        assert_eq!(plan.writes.len(), 3);
        assert_eq!(plan.writes[0].key, plan.head_key());
        assert!(plan.writes.iter().all(|w| w.size_delta == w.value.len() as i16));
    }

    #[test]
    fn test_forge_is_deterministic() {
        let payload = sample_payload(1800);
        let options = ForgeOptions::default().with_additive(5);
        let a = plan_forge(&payload, &options, &ChunkTable::new(), 4, &mut rng()).unwrap();
        let b = plan_forge(&payload, &options, &ChunkTable::new(), 4, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(a.head_key(), b.head_key());
        assert_eq!(a.writes, b.writes);
    }

    #[test]
    fn test_reforge_is_idempotent() {
        let payload = sample_payload(3000);
        let options = ForgeOptions::default().with_seal(&Seal::for_payload(&payload));
        let mut snapshot = ChunkTable::new();

        let first = plan_forge(&payload, &options, &snapshot, 4, &mut rng()).unwrap();
        apply(&mut snapshot, &first.writes);

        let second = plan_forge(&payload, &options, &snapshot, 4, &mut rng()).unwrap();
        assert!(second.writes.is_empty());
        assert_eq!(second.skipped, first.chain.chunks.len());
        assert_eq!(second.head_key(), first.head_key());
    }

    #[test]
    fn test_reforge_fills_gaps() {
        let payload = sample_payload(4000);
        let mut snapshot = ChunkTable::new();
        let first =
            plan_forge(&payload, &ForgeOptions::default(), &snapshot, 4, &mut rng()).unwrap();
        apply(&mut snapshot, &first.writes[..2]);

        let second =
            plan_forge(&payload, &ForgeOptions::default(), &snapshot, 4, &mut rng()).unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.writes, first.writes[2..].to_vec());
    }

    #[test]
    fn test_foreign_collision_retries_with_new_additive() {
        let payload = sample_payload(900);
        let original = build_chain(ChunkVersion::V2, &payload, None, 0).unwrap();
        let mut snapshot = ChunkTable::new();
        snapshot.insert(original.head_key, Bytes::from_static(b"foreign"));

        let plan = plan_forge(&payload, &ForgeOptions::default(), &snapshot, 8, &mut rng()).unwrap();
        assert!(plan.attempts >= 2);
        assert_ne!(plan.additive(), 0);
        assert_ne!(plan.head_key(), original.head_key);
        assert!(check_collisions(plan.chain.keys(), &snapshot).is_empty());
    }

    #[test]
    fn test_empty_foreign_value_is_reused() {
        let payload = sample_payload(900);
        let original = build_chain(ChunkVersion::V2, &payload, None, 0).unwrap();
        let mut snapshot = ChunkTable::new();
        snapshot.insert(original.head_key, Bytes::new());

        let plan = plan_forge(&payload, &ForgeOptions::default(), &snapshot, 1, &mut rng()).unwrap();
        assert_eq!(plan.head_key(), original.head_key);
        assert_eq!(plan.writes.len(), 1);
    }

    #[test]
    fn test_collision_retries_are_bounded() {
        let payload = sample_payload(900);
        let original = build_chain(ChunkVersion::V2, &payload, None, 0).unwrap();
        let mut snapshot = ChunkTable::new();
        snapshot.insert(original.head_key, Bytes::from_static(b"foreign"));

        let result = plan_forge(&payload, &ForgeOptions::default(), &snapshot, 1, &mut rng());
        assert!(matches!(
            result,
            Err(MetalError::CollisionRetriesExhausted { attempts: 1 })
        ));
    }

    #[test]
    fn test_forge_propagates_input_errors() {
        let result = plan_forge(b"", &ForgeOptions::default(), &ChunkTable::new(), 4, &mut rng());
        assert!(matches!(result, Err(MetalError::EmptyPayload)));
    }

    #[test]
    fn test_check_collisions() {
        let mut snapshot = ChunkTable::new();
        snapshot.insert(1, Bytes::from_static(b"x"));
        snapshot.insert(3, Bytes::from_static(b"y"));
        assert_eq!(check_collisions([1, 2, 3, 4], &snapshot), vec![1, 3]);
        assert!(check_collisions([], &snapshot).is_empty());
    }

    #[test]
    fn test_scrap_complete_chain() {
        let payload = sample_payload(2500);
        let mut snapshot = ChunkTable::new();
        let plan =
            plan_forge(&payload, &ForgeOptions::default(), &snapshot, 4, &mut rng()).unwrap();
        apply(&mut snapshot, &plan.writes);
        snapshot.insert(99, Bytes::from_static(b"unrelated"));

        let outcome = plan_scrap(plan.head_key(), &snapshot);
        assert!(outcome.is_complete());
        let instructions = outcome.into_instructions();
        assert_eq!(instructions.len(), 3);
        assert!(instructions.iter().all(WriteInstruction::is_removal));
        assert_eq!(
            instructions.iter().map(|i| i.key).collect::<Vec<_>>(),
            plan.chain.keys().collect::<Vec<_>>()
        );
        assert_eq!(instructions[0].size_delta, -1024);

        apply(&mut snapshot, &instructions);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_scrap_stops_at_lost_chunk() {
        let payload = sample_payload(3500);
        let mut snapshot = ChunkTable::new();
        let plan =
            plan_forge(&payload, &ForgeOptions::default(), &snapshot, 4, &mut rng()).unwrap();
        apply(&mut snapshot, &plan.writes);
        let lost = plan.chain.chunks[2].key;
        snapshot.remove(&lost);

        match plan_scrap(plan.head_key(), &snapshot) {
            ScrapOutcome::Partial {
                instructions,
                error,
            } => {
                assert_eq!(instructions.len(), 2);
                assert!(matches!(error, MetalError::ChunkLost(key) if key == lost));
            }
            other => panic!("expected partial scrap, got {:?}", other),
        }
    }

    #[test]
    fn test_double_scrap_is_a_no_op() {
        let payload = sample_payload(1500);
        let mut snapshot = ChunkTable::new();
        let plan =
            plan_forge(&payload, &ForgeOptions::default(), &snapshot, 4, &mut rng()).unwrap();
        apply(&mut snapshot, &plan.writes);

        let first = plan_scrap(plan.head_key(), &snapshot).into_instructions();
        apply(&mut snapshot, &first);

        let second = plan_scrap(plan.head_key(), &snapshot);
        assert!(second.is_complete());
        assert!(second.instructions().is_empty());

        let mut zeroed = ChunkTable::new();
        zeroed.insert(plan.head_key(), Bytes::new());
        assert!(plan_scrap(plan.head_key(), &zeroed).instructions().is_empty());
    }

    #[test]
    fn test_destroy_removes_only_present_chunks() {
        let payload = sample_payload(4000);
        let options = ForgeOptions::default().with_additive(3);
        let mut snapshot = ChunkTable::new();
        let plan = plan_forge(&payload, &options, &snapshot, 4, &mut rng()).unwrap();
        // A forge that failed after two writes.
        apply(&mut snapshot, &plan.writes[1..3]);
        snapshot.insert(7, Bytes::from_static(b"unrelated"));

        let destroy = plan_destroy(&payload, &options, &snapshot).unwrap();
        assert_eq!(destroy.chain.head_key, plan.head_key());
        assert_eq!(
            destroy.instructions.iter().map(|i| i.key).collect::<Vec<_>>(),
            vec![plan.writes[1].key, plan.writes[2].key]
        );

        apply(&mut snapshot, &destroy.instructions);
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_destroy_ignores_foreign_values() {
        let payload = sample_payload(700);
        let options = ForgeOptions::default();
        let chain = build_chain(ChunkVersion::V2, &payload, None, 0).unwrap();
        let mut snapshot = ChunkTable::new();
        snapshot.insert(chain.head_key, Bytes::from_static(b"not ours"));

        let destroy = plan_destroy(&payload, &options, &snapshot).unwrap();
        assert!(destroy.instructions.is_empty());
    }

    #[test]
    fn test_size_delta_out_of_range_is_an_error() {
        assert_eq!(size_delta(10, 4).unwrap(), 6);
        assert_eq!(size_delta(0, 1024).unwrap(), -1024);
        assert!(matches!(
            size_delta(100_000, 0),
            Err(MetalError::ChunkTooLarge { size: 100_000, .. })
        ));
        assert!(matches!(
            WriteInstruction::removal(7, 40_000),
            Err(MetalError::ChunkTooLarge { size: 40_000, .. })
        ));
    }

    #[test]
    fn test_retry_never_repeats_an_additive() {
        let payload = sample_payload(900);
        let original = build_chain(ChunkVersion::V2, &payload, None, 0).unwrap();
        let mut snapshot = ChunkTable::new();
        snapshot.insert(original.head_key, Bytes::from_static(b"foreign"));

        // This rng draws additive 0 on every retry.
        let mut stuck = StepRng::new(0, 0);
        let plan =
            plan_forge(&payload, &ForgeOptions::default(), &snapshot, 2, &mut stuck).unwrap();
        assert_eq!(plan.attempts, 2);
        assert_eq!(plan.additive(), 1);
    }

    #[test]
    fn test_untried_additive_skips_used_values() {
        let tried: HashSet<u16> = [0, 1, 2].into_iter().collect();
        assert_eq!(untried_additive(&mut StepRng::new(0, 0), &tried), Some(3));

        let all: HashSet<u16> = (0..=u16::MAX).collect();
        assert_eq!(untried_additive(&mut StepRng::new(0, 0), &all), None);
    }
}
