//! # Shardflow Core
//!
//! Worker-side execution core for the shardflow map-reduce dataflow engine.
//!
//! This crate provides the pieces a worker needs to run one stage of a job
//! on one partition and shuffle its output to the next stage:
//!
//! - [`row`] — The unit of data: [`Row`](row::Row) (an ordered key plus
//!   named [`Value`](row::Value)s) with a self-describing binary codec.
//! - [`partition`] — The routing policy: the
//!   [`Partitioner`](partition::Partitioner) contract, its variants, and
//!   the wire envelope that ships them between master and workers.
//! - [`channel`] — Bounded, backpressure-aware batch channels between
//!   tasks.
//! - [`input`] / [`output`] — The [`InputReader`](input::InputReader) feeding
//!   a task and the [`OutputWriter`](output::OutputWriter) that routes every
//!   produced row to its destination partition.
//! - [`stage`] — The [`StageRunner`](stage::StageRunner) contract for user
//!   transformations and the registry that materialises them from shipped
//!   descriptors.
//! - [`context`] — Per-task context: broadcast table, partition identity,
//!   cancellation.
//! - [`executor`] — The [`TaskExecutor`](executor::TaskExecutor) driving one
//!   `(stage, partition)` from setup to terminal report.
//! - [`job`] — Task references and the [`JobReporter`](job::JobReporter)
//!   outcome sink.

pub mod channel;
pub mod context;
pub mod error;
pub mod executor;
pub mod input;
pub mod job;
pub mod output;
pub mod partition;
pub mod row;
pub mod stage;

pub use error::{Error, Result};
