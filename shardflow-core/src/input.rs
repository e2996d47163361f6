//! Input side of a task: a bounded lazy stream of row batches.
//!
//! Closure of the stream is the sole normal termination signal for the
//! executor's drain loop. Reception errors and cancellation are surfaced by
//! closing the stream and attaching an error the executor retrieves after
//! the loop exits.

use crate::channel::BatchReceiver;
use crate::context::CancelSignal;
use crate::error::Error;
use crate::row::Row;

/// Single-consumer stream of input batches feeding one task.
pub struct InputReader {
    receiver: BatchReceiver,
    cancel: CancelSignal,
    fault: Option<Error>,
}

impl InputReader {
    pub fn new(receiver: BatchReceiver, cancel: CancelSignal) -> Self {
        Self {
            receiver,
            cancel,
            fault: None,
        }
    }

    /// Next batch, or `None` when the stream closed or the task was
    /// cancelled. Blocks while upstream has produced nothing; backpressure
    /// is exerted by the bounded channel underneath.
    pub fn recv(&mut self) -> Option<Vec<Row>> {
        if self.fault.is_some() {
            return None;
        }
        let data = &self.receiver.receiver;
        let cancel = &self.cancel.receiver;
        crossbeam_channel::select! {
            recv(data) -> msg => msg.ok(),
            recv(cancel) -> _ => {
                self.fault = Some(Error::Cancelled);
                None
            }
        }
    }

    /// The error attached to the stream, if any. Meaningful once
    /// [`recv`](Self::recv) has returned `None`.
    pub fn take_error(&mut self) -> Option<Error> {
        self.fault.take().or_else(|| self.receiver.fault())
    }
}
