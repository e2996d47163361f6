//! Fluent job construction.
//!
//! A job is a sequence of stages. Each stage names a registered runner,
//! carries an opaque config blob, and owns the partitioner that routes rows
//! *into* it; `plan_next(fanout)` on that partitioner materialises the
//! stage's partitions.

use std::sync::Arc;

use shardflow_core::partition::{HashKeyPartitioner, Partitioner};
use shardflow_core::stage::StageDescriptor;

/// One planned stage of a job.
pub struct StageSpec {
    pub name: String,
    pub descriptor: StageDescriptor,
    /// Routes rows into this stage and plans its partitions.
    pub partitioner: Arc<dyn Partitioner>,
    /// Executor slots offered when planning this stage.
    pub fanout: usize,
}

/// Builder for a stage chain.
pub struct JobBuilder {
    job_id: String,
    stages: Vec<StageSpec>,
}

impl JobBuilder {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage running the named registered runner.
    ///
    /// Defaults: hash-partitioned input, fan-out 1. Adjust with
    /// [`partitioned_by`](Self::partitioned_by) and [`fanout`](Self::fanout).
    pub fn stage(
        mut self,
        name: impl Into<String>,
        runner: impl Into<String>,
        config: Vec<u8>,
    ) -> Self {
        self.stages.push(StageSpec {
            name: name.into(),
            descriptor: StageDescriptor::new(runner, config),
            partitioner: Arc::new(HashKeyPartitioner::new()),
            fanout: 1,
        });
        self
    }

    /// Set the partitioner routing rows into the stage appended last.
    pub fn partitioned_by(mut self, partitioner: impl Partitioner + 'static) -> Self {
        self.last_stage("partitioned_by").partitioner = Arc::new(partitioner);
        self
    }

    /// Set the fan-out of the stage appended last.
    pub fn fanout(mut self, fanout: usize) -> Self {
        self.last_stage("fanout").fanout = fanout;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    fn last_stage(&mut self, caller: &str) -> &mut StageSpec {
        self.stages
            .last_mut()
            .unwrap_or_else(|| panic!("{caller} called before any stage was added"))
    }
}
