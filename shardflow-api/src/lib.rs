//! # Shardflow API
//!
//! User-facing surface for composing and running shardflow jobs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shardflow_api::job::JobBuilder;
//! use shardflow_api::local::LocalPipeline;
//! use shardflow_core::partition::{HashKeyPartitioner, ShuffledPartitioner};
//! use shardflow_core::row::Row;
//! use shardflow_core::stage::RunnerRegistry;
//!
//! let registry = RunnerRegistry::new(); // register your stage runners here
//! let job = JobBuilder::new("wordcount")
//!     .stage("split", "wordcount::split", Vec::new())
//!     .partitioned_by(ShuffledPartitioner::new())
//!     .fanout(2)
//!     .stage("count", "wordcount::count", Vec::new())
//!     .partitioned_by(HashKeyPartitioner::new())
//!     .fanout(2);
//! let rows = LocalPipeline::new(registry)
//!     .run(&job, vec![Row::value("hello world")])
//!     .unwrap();
//! ```
//!
//! - [`job`] — [`JobBuilder`](job::JobBuilder): fluent construction of a
//!   stage chain with per-stage partitioning and fan-out.
//! - [`local`] — [`LocalPipeline`](local::LocalPipeline): runs a job inside
//!   the current process, one executor thread per task.

pub mod job;
pub mod local;

pub use shardflow_core;
