//! Partitioning: the per-row routing policy between stages and the planning
//! step that materialises a stage's partitions.
//!
//! A [`Partitioner`] is consulted by the master once per stage
//! ([`Partitioner::plan_next`]) and by producers once per row
//! ([`Partitioner::determine_partition`]). Instances are immutable after
//! construction and shared read-only across all executors of a stage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::row::Row;

mod partitioners;
pub mod wire;

pub use partitioners::{
    FiniteKeyPartitioner, HashKeyPartitioner, MasterAffinityPartitioner, PreservePartitioner,
    ShuffledPartitioner,
};

/// Affinity label key used for placement constraints.
pub const AFFINITY_TYPE_KEY: &str = "Type";

/// Affinity label value pinning a partition to master nodes.
pub const AFFINITY_MASTER: &str = "master";

/// A unit of parallelism within a stage's plan.
///
/// Elastic partitions are freely placeable and may be packed by the
/// scheduler; non-elastic partitions must land on a host satisfying their
/// assignment affinity. Partitions are created by planning and never mutated
/// at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: String,
    pub is_elastic: bool,
    #[serde(default)]
    pub assignment_affinity: HashMap<String, String>,
}

impl Partition {
    /// A freely-placeable partition.
    pub fn elastic(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_elastic: true,
            assignment_affinity: HashMap::new(),
        }
    }

    /// A partition that must be placed on a host satisfying its affinity.
    pub fn pinned(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_elastic: false,
            assignment_affinity: HashMap::new(),
        }
    }
}

/// One elastic partition per executor slot, with decimal ids `"0".."n-1"`.
pub fn plan_for_fanout(num_executors: usize) -> Vec<Partition> {
    (0..num_executors)
        .map(|i| Partition::elastic(i.to_string()))
        .collect()
}

/// Producer-side view of the running task, consulted per row.
pub trait PartitionContext {
    /// Partition id of the task emitting the row.
    fn partition_id(&self) -> &str;
}

/// Routing policy of a stage.
///
/// `plan_next` is called once by the master when scheduling the stage;
/// `determine_partition` is called per row on the producer side. Returning
/// [`Error::NoOutput`](crate::Error::NoOutput) from `determine_partition`
/// drops the row silently; any other error is fatal to the producing task.
pub trait Partitioner: Send + Sync + std::fmt::Debug {
    /// Partitions the downstream stage will have. May depend on the number
    /// of offered executor slots or be fan-out-independent.
    fn plan_next(&self, num_executors: usize) -> Vec<Partition>;

    /// Destination partition id for one row, given the live downstream
    /// fan-out.
    fn determine_partition(
        &self,
        ctx: &dyn PartitionContext,
        row: &Row,
        num_outputs: usize,
    ) -> Result<String>;

    /// Whether this partitioner is (or wraps) the identity-forwarding
    /// [`PreservePartitioner`].
    fn is_preserved(&self) -> bool {
        false
    }

    /// Registered name for the wire envelope.
    fn wire_tag(&self) -> &'static str;

    /// Variant-owned body for the wire envelope.
    fn wire_body(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

#[cfg(test)]
#[path = "tests/partitioner_tests.rs"]
mod tests;
