//! Bounded batch channels between tasks.
//!
//! Built on crossbeam-channel for backpressure-aware delivery of row
//! batches. A batch is atomic: it is never split mid-delivery, and per
//! sender batches arrive in emission order. Senders are cloneable so many
//! upstream tasks can fan into one downstream partition; the stream closes
//! when every sender is gone.

use std::sync::{Arc, OnceLock};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{Error, Result};
use crate::row::Row;

/// Default channel buffer size (bounded for backpressure).
///
/// Larger buffers more memory and throughput under bursty load, smaller
/// buffers lower latency.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sending half of a batch channel.
///
/// A failing producer records its error in the shared fault slot before
/// dropping the sender; the consumer retrieves it after the stream closes.
#[derive(Clone)]
pub struct BatchSender {
    pub(crate) sender: Sender<Vec<Row>>,
    fault: Arc<OnceLock<Error>>,
}

impl BatchSender {
    /// Deliver one batch. Blocks while the channel is full (backpressure).
    pub fn send(&self, batch: Vec<Row>) -> Result<()> {
        self.sender
            .send(batch)
            .map_err(|_| Error::Transport("channel closed: receiver dropped".to_string()))
    }

    /// Attach an error to the stream. The first recorded fault wins; closure
    /// itself happens when the last sender drops.
    pub fn fail(&self, err: Error) {
        let _ = self.fault.set(err);
    }
}

/// Receiving half of a batch channel. Single-consumer.
pub struct BatchReceiver {
    pub(crate) receiver: Receiver<Vec<Row>>,
    fault: Arc<OnceLock<Error>>,
}

impl BatchReceiver {
    /// Next batch, or `None` once every sender is gone and the buffer is
    /// drained.
    pub fn recv(&self) -> Option<Vec<Row>> {
        self.receiver.recv().ok()
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` also when no
    /// batch is currently buffered.
    pub fn try_recv(&self) -> Option<Vec<Row>> {
        self.receiver.try_recv().ok()
    }

    /// The fault a producer attached before closing, if any.
    pub fn fault(&self) -> Option<Error> {
        self.fault.get().cloned()
    }
}

/// Create a bounded batch channel pair with the given capacity.
pub fn batch_channel(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (sender, receiver) = bounded(capacity);
    let fault = Arc::new(OnceLock::new());
    (
        BatchSender {
            sender,
            fault: Arc::clone(&fault),
        },
        BatchReceiver { receiver, fault },
    )
}

/// Create a batch channel with [`DEFAULT_CHANNEL_CAPACITY`].
pub fn batch_channel_default() -> (BatchSender, BatchReceiver) {
    batch_channel(DEFAULT_CHANNEL_CAPACITY)
}
