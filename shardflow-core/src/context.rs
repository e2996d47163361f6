//! Per-task context: the worker's broadcast table, the task's partition
//! identity, and the cancellation signal.
//!
//! The broadcast table is written once by worker init and read-only for the
//! lifetime of every task on that worker. Cancellation propagates by
//! disconnecting a zero-capacity channel: the input reader and shuffle
//! endpoints select against the signal, so closing the context unblocks a
//! running drain loop with a cancellation error.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::error::{Error, Result};
use crate::partition::PartitionContext;

/// Broadcast key under which a stage's serialised closure is published.
///
/// The scheme is an implementation detail of master/worker wiring; going
/// through this helper keeps user broadcast keys from colliding with it.
pub fn stage_broadcast_key(stage_name: &str) -> String {
    format!("__stage{stage_name}")
}

/// Owner side of a cancellation pair. Cancels on [`cancel`](Self::cancel) or
/// on drop.
pub struct CancelHandle {
    _sender: Sender<()>,
}

impl CancelHandle {
    /// Cancel every task watching the paired signal.
    pub fn cancel(self) {}
}

/// Watcher side of a cancellation pair. Cloneable; becomes ready once the
/// handle is gone.
#[derive(Clone)]
pub struct CancelSignal {
    pub(crate) receiver: Receiver<()>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Create a linked cancellation handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = bounded(0);
    (CancelHandle { _sender: sender }, CancelSignal { receiver })
}

/// Read-only key/value blobs shared with every task on a worker.
pub type BroadcastTable = HashMap<String, Vec<u8>>;

/// Context handed to every task of one worker for one job.
pub struct TaskContext {
    partition_id: String,
    broadcasts: Arc<BroadcastTable>,
    cancel: CancelSignal,
}

impl TaskContext {
    pub fn new(
        partition_id: impl Into<String>,
        broadcasts: Arc<BroadcastTable>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            broadcasts,
            cancel,
        }
    }

    /// Look up a broadcast blob by key.
    pub fn broadcast(&self, key: &str) -> Option<&[u8]> {
        self.broadcasts.get(key).map(Vec::as_slice)
    }

    /// The serialised closure of the named stage.
    pub fn stage_payload(&self, stage_name: &str) -> Result<&[u8]> {
        let key = stage_broadcast_key(stage_name);
        match self.broadcasts.get(&key) {
            Some(payload) => Ok(payload.as_slice()),
            None => Err(Error::MissingBroadcast(key)),
        }
    }

    /// A watcher on this task's cancellation.
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl PartitionContext for TaskContext {
    fn partition_id(&self) -> &str {
        &self.partition_id
    }
}
