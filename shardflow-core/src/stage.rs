//! Stage runners: the user transformation a task drives, and the machinery
//! that materialises one from a shipped descriptor.
//!
//! A stage's closure crosses the wire as a [`StageDescriptor`] naming a
//! registered runner plus an opaque config blob. The worker's
//! [`RunnerRegistry`] maps runner names to factories; materialisation
//! happens once per task.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::context::TaskContext;
use crate::error::Error;
use crate::output::OutputWriter;
use crate::row::Row;

/// User transformation of one stage.
///
/// Per task the sequence is `setup`, one `apply` per input batch, then
/// `teardown` exactly once after the input stream closed without error.
/// `apply` calls never overlap for the same task, so implementations may
/// hold per-task mutable state without locking. The runner knows nothing of
/// partitioning: it writes rows to the output writer, which owns routing.
pub trait StageRunner: Send + std::fmt::Debug {
    fn setup(&mut self, _ctx: &TaskContext) -> Result<()> {
        Ok(())
    }

    /// Transform one input batch. May emit any number of rows, including
    /// none, including rows whose keys are unrelated to the inputs.
    fn apply(&mut self, ctx: &TaskContext, batch: Vec<Row>, out: &mut OutputWriter) -> Result<()>;

    /// Runs after the last `apply`; may emit a final burst of rows, e.g. an
    /// aggregator flushing its state.
    fn teardown(&mut self, _ctx: &TaskContext, _out: &mut OutputWriter) -> Result<()> {
        Ok(())
    }
}

/// Serialised stage closure: a registered runner name plus its config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub runner: String,
    pub config: Vec<u8>,
}

impl StageDescriptor {
    pub fn new(runner: impl Into<String>, config: Vec<u8>) -> Self {
        Self {
            runner: runner.into(),
            config,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Factory producing a runner from its config blob.
pub type RunnerFactory = Box<dyn Fn(&[u8]) -> Result<Box<dyn StageRunner>> + Send + Sync>;

/// Named runner factories known to a worker.
#[derive(Default)]
pub struct RunnerRegistry {
    factories: HashMap<String, RunnerFactory>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Box<dyn StageRunner>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&[u8]) -> Result<Box<dyn StageRunner>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Materialise the runner a descriptor names.
    pub fn build(&self, descriptor: &StageDescriptor) -> crate::Result<Box<dyn StageRunner>> {
        let factory = self
            .factories
            .get(&descriptor.runner)
            .ok_or_else(|| Error::UnknownRunner(descriptor.runner.clone()))?;
        factory(&descriptor.config).map_err(|err| Error::Setup(err.to_string()))
    }
}

/// One transformation step of a job, identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    name: String,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode the broadcast payload into a descriptor and build its runner.
    pub fn materialize(
        &self,
        registry: &RunnerRegistry,
        payload: &[u8],
    ) -> crate::Result<Box<dyn StageRunner>> {
        let descriptor =
            StageDescriptor::from_bytes(payload).map_err(|err| Error::Decode(err.to_string()))?;
        registry.build(&descriptor)
    }
}
