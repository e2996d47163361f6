use std::collections::BTreeSet;
use std::hash::Hasher;
use std::sync::Mutex;

use fnv::FnvHasher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::error::{Error, Result};
use crate::partition::wire;
use crate::partition::{
    plan_for_fanout, Partition, PartitionContext, Partitioner, AFFINITY_MASTER, AFFINITY_TYPE_KEY,
};
use crate::row::Row;

/// Routes rows by FNV-1a 64-bit hash of the row key, modulo the downstream
/// fan-out.
///
/// Routing is deterministic: identical `(key, num_outputs)` always lands in
/// the same partition.
#[derive(Debug, Default)]
pub struct HashKeyPartitioner;

impl HashKeyPartitioner {
    pub fn new() -> Self {
        Self
    }
}

impl Partitioner for HashKeyPartitioner {
    fn plan_next(&self, num_executors: usize) -> Vec<Partition> {
        plan_for_fanout(num_executors)
    }

    fn determine_partition(
        &self,
        _ctx: &dyn PartitionContext,
        row: &Row,
        num_outputs: usize,
    ) -> Result<String> {
        if num_outputs == 0 {
            return Err(Error::InvalidFanOut(0));
        }
        let mut hasher = FnvHasher::default();
        hasher.write(row.key.as_bytes());
        let slot = hasher.finish() % num_outputs as u64;
        Ok(slot.to_string())
    }

    fn wire_tag(&self) -> &'static str {
        wire::HASH_KEY
    }
}

/// Distributes a predefined key set, one non-elastic partition per key.
///
/// The partition id equals the key. Rows whose key is outside the set are
/// dropped via the no-output sentinel.
#[derive(Debug)]
pub struct FiniteKeyPartitioner {
    keys: BTreeSet<String>,
}

impl FiniteKeyPartitioner {
    pub fn new<K>(keys: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Partitioner for FiniteKeyPartitioner {
    /// Ignores the executor count: one pinned partition per key, in sorted
    /// key order so plans are stable.
    fn plan_next(&self, _num_executors: usize) -> Vec<Partition> {
        self.keys
            .iter()
            .map(|key| Partition::pinned(key.clone()))
            .collect()
    }

    fn determine_partition(
        &self,
        _ctx: &dyn PartitionContext,
        row: &Row,
        _num_outputs: usize,
    ) -> Result<String> {
        if !self.keys.contains(&row.key) {
            return Err(Error::NoOutput);
        }
        Ok(row.key.clone())
    }

    fn wire_tag(&self) -> &'static str {
        wire::FINITE_KEY
    }

    fn wire_body(&self) -> serde_json::Value {
        json!({ "keys": self.keys })
    }
}

/// Routes each row to a uniformly random downstream partition.
///
/// Each instance owns a seedable RNG so tests can pin the sequence; the seed
/// travels in the wire body, so a deserialised copy replays the same draws.
#[derive(Debug)]
pub struct ShuffledPartitioner {
    seed: u64,
    rng: Mutex<StdRng>,
}

impl ShuffledPartitioner {
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for ShuffledPartitioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Partitioner for ShuffledPartitioner {
    fn plan_next(&self, num_executors: usize) -> Vec<Partition> {
        plan_for_fanout(num_executors)
    }

    fn determine_partition(
        &self,
        _ctx: &dyn PartitionContext,
        _row: &Row,
        num_outputs: usize,
    ) -> Result<String> {
        if num_outputs == 0 {
            return Err(Error::InvalidFanOut(0));
        }
        let slot = self
            .rng
            .lock()
            .expect("shuffle rng poisoned")
            .gen_range(0..num_outputs);
        Ok(slot.to_string())
    }

    fn wire_tag(&self) -> &'static str {
        wire::SHUFFLED
    }

    fn wire_body(&self) -> serde_json::Value {
        json!({ "seed": self.seed })
    }
}

/// Forwards every row to the downstream partition with the same id as the
/// task emitting it.
#[derive(Debug, Default)]
pub struct PreservePartitioner;

impl PreservePartitioner {
    pub fn new() -> Self {
        Self
    }
}

impl Partitioner for PreservePartitioner {
    fn plan_next(&self, num_executors: usize) -> Vec<Partition> {
        plan_for_fanout(num_executors)
    }

    fn determine_partition(
        &self,
        ctx: &dyn PartitionContext,
        _row: &Row,
        _num_outputs: usize,
    ) -> Result<String> {
        Ok(ctx.partition_id().to_string())
    }

    fn is_preserved(&self) -> bool {
        true
    }

    fn wire_tag(&self) -> &'static str {
        wire::PRESERVE
    }
}

/// Decorator pinning every planned partition to master nodes.
///
/// Routing delegates to the wrapped partitioner unchanged; planning
/// delegates and then stamps `Type=master` into each partition's assignment
/// affinity.
#[derive(Debug)]
pub struct MasterAffinityPartitioner {
    inner: Box<dyn Partitioner>,
}

impl MasterAffinityPartitioner {
    pub fn wrap(inner: Box<dyn Partitioner>) -> Self {
        Self { inner }
    }
}

impl Partitioner for MasterAffinityPartitioner {
    fn plan_next(&self, num_executors: usize) -> Vec<Partition> {
        let mut planned = self.inner.plan_next(num_executors);
        for partition in &mut planned {
            partition
                .assignment_affinity
                .insert(AFFINITY_TYPE_KEY.to_string(), AFFINITY_MASTER.to_string());
        }
        planned
    }

    fn determine_partition(
        &self,
        ctx: &dyn PartitionContext,
        row: &Row,
        num_outputs: usize,
    ) -> Result<String> {
        self.inner.determine_partition(ctx, row, num_outputs)
    }

    fn is_preserved(&self) -> bool {
        self.inner.is_preserved()
    }

    fn wire_tag(&self) -> &'static str {
        wire::MASTER_AFFINITY
    }

    fn wire_body(&self) -> serde_json::Value {
        json!({ "inner": wire::envelope(self.inner.as_ref()) })
    }
}
