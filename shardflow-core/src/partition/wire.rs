//! Wire envelope for partitioners.
//!
//! A partitioner crosses the wire as a JSON object `{"tag": <registered
//! name>, "body": <variant body>}`. A [`Registry`] maps tags to factories;
//! decoding an unregistered tag yields a typed error. The master-affinity
//! wrapper nests its inner partitioner's envelope inside its own body, so
//! factories receive the registry for recursive decoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::partition::{
    FiniteKeyPartitioner, HashKeyPartitioner, MasterAffinityPartitioner, Partitioner,
    PreservePartitioner, ShuffledPartitioner,
};

pub const HASH_KEY: &str = "hash_key";
pub const FINITE_KEY: &str = "finite_key";
pub const SHUFFLED: &str = "shuffled";
pub const PRESERVE: &str = "preserve";
pub const MASTER_AFFINITY: &str = "master_affinity";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    tag: String,
    body: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FiniteKeyBody {
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ShuffledBody {
    seed: u64,
}

#[derive(Debug, Deserialize)]
struct MasterAffinityBody {
    inner: serde_json::Value,
}

/// Factory materialising one registered variant from its envelope body.
pub type PartitionerFactory = fn(&Registry, &serde_json::Value) -> Result<Box<dyn Partitioner>>;

/// Tag-to-factory registry for decoding partitioner envelopes.
pub struct Registry {
    factories: HashMap<&'static str, PartitionerFactory>,
}

impl Registry {
    /// Empty registry; custom deployments register their own variants.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry knowing every built-in variant.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(HASH_KEY, |_, _| Ok(Box::new(HashKeyPartitioner::new())));
        registry.register(PRESERVE, |_, _| Ok(Box::new(PreservePartitioner::new())));
        registry.register(FINITE_KEY, |_, body| {
            let body: FiniteKeyBody = parse_body(FINITE_KEY, body)?;
            Ok(Box::new(FiniteKeyPartitioner::new(body.keys)))
        });
        registry.register(SHUFFLED, |_, body| {
            let body: ShuffledBody = parse_body(SHUFFLED, body)?;
            Ok(Box::new(ShuffledPartitioner::with_seed(body.seed)))
        });
        registry.register(MASTER_AFFINITY, |registry, body| {
            let body: MasterAffinityBody = parse_body(MASTER_AFFINITY, body)?;
            let inner = registry.decode_value(&body.inner)?;
            Ok(Box::new(MasterAffinityPartitioner::wrap(inner)))
        });
        registry
    }

    pub fn register(&mut self, tag: &'static str, factory: PartitionerFactory) {
        self.factories.insert(tag, factory);
    }

    /// Decode a partitioner from its serialised envelope.
    pub fn decode(&self, data: &[u8]) -> Result<Box<dyn Partitioner>> {
        let envelope: serde_json::Value = serde_json::from_slice(data)
            .map_err(|err| Error::Decode(format!("partitioner envelope: {err}")))?;
        self.decode_value(&envelope)
    }

    /// Decode a partitioner from an already-parsed envelope value. Used for
    /// nested envelopes inside wrapper bodies.
    pub fn decode_value(&self, envelope: &serde_json::Value) -> Result<Box<dyn Partitioner>> {
        let envelope: Envelope = serde_json::from_value(envelope.clone())
            .map_err(|err| Error::Decode(format!("partitioner envelope: {err}")))?;
        let factory = self
            .factories
            .get(envelope.tag.as_str())
            .ok_or(Error::UnknownPartitioner(envelope.tag))?;
        factory(self, &envelope.body)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(tag: &str, body: &serde_json::Value) -> Result<T> {
    serde_json::from_value(body.clone())
        .map_err(|err| Error::Decode(format!("{tag} body: {err}")))
}

/// The envelope of a partitioner as a JSON value.
pub fn envelope(partitioner: &dyn Partitioner) -> serde_json::Value {
    json!({ "tag": partitioner.wire_tag(), "body": partitioner.wire_body() })
}

/// Serialise a partitioner for the wire.
pub fn encode(partitioner: &dyn Partitioner) -> Vec<u8> {
    serde_json::to_vec(&envelope(partitioner)).expect("partitioner envelope is plain json")
}

/// Decode a partitioner using the built-in registry.
pub fn decode(data: &[u8]) -> Result<Box<dyn Partitioner>> {
    Registry::with_builtins().decode(data)
}

#[cfg(test)]
#[path = "tests/wire_tests.rs"]
mod tests;
