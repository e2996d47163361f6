//! Output side of a task: per-row routing into per-partition batches and
//! their delivery on the shuffle transport.
//!
//! The writer consults the stage's partitioner for every row, groups rows
//! per destination partition, and emits a batch once the accumulator reaches
//! the configured size or on explicit flush. The transport itself is an
//! external collaborator behind [`ShuffleEndpoint`]; per-endpoint queues
//! absorb backpressure, and no accumulator state is shared across tasks.

use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::BatchSender;
use crate::context::{CancelSignal, TaskContext};
use crate::error::{Error, Result};
use crate::partition::Partitioner;
use crate::row::Row;

/// Rows accumulated per destination partition before a batch is emitted.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// One reliable, ordered lane to a destination partition.
pub trait ShuffleEndpoint: Send {
    /// Deliver one batch. Blocks while the destination cannot keep up.
    fn send(&mut self, batch: Vec<Row>) -> Result<()>;

    /// Half-close the lane and await the terminal acknowledgement.
    fn close(&mut self) -> Result<()>;
}

/// In-process endpoint over a bounded batch channel.
///
/// Blocked sends honour the task's cancellation signal. For local delivery
/// the channel handing the batch to the consumer is the acknowledgement, so
/// close only drops the sending half.
pub struct LocalEndpoint {
    sender: Option<BatchSender>,
    cancel: CancelSignal,
}

impl LocalEndpoint {
    pub fn new(sender: BatchSender, cancel: CancelSignal) -> Self {
        Self {
            sender: Some(sender),
            cancel,
        }
    }
}

impl ShuffleEndpoint for LocalEndpoint {
    fn send(&mut self, batch: Vec<Row>) -> Result<()> {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return Err(Error::Transport("endpoint already closed".to_string())),
        };
        let data = &sender.sender;
        let cancel = &self.cancel.receiver;
        crossbeam_channel::select! {
            send(data, batch) -> sent => {
                sent.map_err(|_| Error::Transport("channel closed: receiver dropped".to_string()))
            }
            recv(cancel) -> _ => Err(Error::Cancelled),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.sender = None;
        Ok(())
    }
}

/// Multiplexer routing every produced row to its destination partition.
pub struct OutputWriter {
    ctx: Arc<TaskContext>,
    partitioner: Arc<dyn Partitioner>,
    endpoints: HashMap<String, Box<dyn ShuffleEndpoint>>,
    accumulators: HashMap<String, Vec<Row>>,
    batch_size: usize,
    closed: Option<Result<()>>,
}

impl OutputWriter {
    pub fn new(
        ctx: Arc<TaskContext>,
        partitioner: Arc<dyn Partitioner>,
        endpoints: HashMap<String, Box<dyn ShuffleEndpoint>>,
    ) -> Self {
        Self {
            ctx,
            partitioner,
            endpoints,
            accumulators: HashMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            closed: None,
        }
    }

    /// Override the per-partition batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Live downstream fan-out.
    pub fn num_outputs(&self) -> usize {
        self.endpoints.len()
    }

    /// Route one row. A no-output verdict from the partitioner drops the row
    /// silently; any other partitioner error is fatal to the task.
    pub fn write(&mut self, row: Row) -> Result<()> {
        let id = match self
            .partitioner
            .determine_partition(&*self.ctx, &row, self.endpoints.len())
        {
            Ok(id) => id,
            Err(Error::NoOutput) => return Ok(()),
            Err(err) => return Err(err),
        };
        let accumulator = self.accumulators.entry(id.clone()).or_default();
        accumulator.push(row);
        if accumulator.len() >= self.batch_size {
            self.flush_partition(&id)?;
        }
        Ok(())
    }

    /// Route a sequence of rows in order.
    pub fn write_all(&mut self, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        for row in rows {
            self.write(row)?;
        }
        Ok(())
    }

    /// Emit every non-empty accumulator.
    pub fn flush(&mut self) -> Result<()> {
        let ids: Vec<String> = self.accumulators.keys().cloned().collect();
        for id in ids {
            self.flush_partition(&id)?;
        }
        Ok(())
    }

    fn flush_partition(&mut self, id: &str) -> Result<()> {
        let batch = match self.accumulators.get_mut(id) {
            Some(accumulator) if !accumulator.is_empty() => std::mem::take(accumulator),
            _ => return Ok(()),
        };
        let endpoint = self
            .endpoints
            .get_mut(id)
            .ok_or_else(|| Error::Transport(format!("no endpoint for partition {id}")))?;
        endpoint.send(batch)
    }

    /// Flush all accumulators, half-close every endpoint, and await
    /// acknowledgement. Returns on the first error. Idempotent: a second
    /// invocation returns the cached outcome of the first.
    pub fn close(&mut self) -> Result<()> {
        if let Some(outcome) = &self.closed {
            return outcome.clone();
        }
        let outcome = self.close_inner();
        self.closed = Some(outcome.clone());
        outcome
    }

    fn close_inner(&mut self) -> Result<()> {
        self.flush()?;
        for endpoint in self.endpoints.values_mut() {
            endpoint.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{batch_channel, BatchReceiver};
    use crate::context::{cancel_pair, BroadcastTable, CancelHandle};
    use crate::partition::{FiniteKeyPartitioner, HashKeyPartitioner, PreservePartitioner};

    fn writer_with(
        partition_ids: &[&str],
        partitioner: Arc<dyn Partitioner>,
        task_partition: &str,
    ) -> (OutputWriter, HashMap<String, BatchReceiver>, CancelHandle) {
        let (cancel, signal) = cancel_pair();
        let ctx = Arc::new(TaskContext::new(
            task_partition,
            Arc::new(BroadcastTable::new()),
            signal.clone(),
        ));
        let mut endpoints: HashMap<String, Box<dyn ShuffleEndpoint>> = HashMap::new();
        let mut receivers = HashMap::new();
        for id in partition_ids {
            let (sender, receiver) = batch_channel(64);
            endpoints.insert(
                id.to_string(),
                Box::new(LocalEndpoint::new(sender, signal.clone())),
            );
            receivers.insert(id.to_string(), receiver);
        }
        (OutputWriter::new(ctx, partitioner, endpoints), receivers, cancel)
    }

    fn drain(receiver: &BatchReceiver) -> Vec<Row> {
        let mut rows = Vec::new();
        while let Some(batch) = receiver.try_recv() {
            rows.extend(batch);
        }
        rows
    }

    #[test]
    fn test_batches_emitted_at_threshold() {
        let (writer, receivers, _cancel) =
            writer_with(&["0"], Arc::new(HashKeyPartitioner::new()), "0");
        let mut writer = writer.with_batch_size(2);

        writer.write(Row::key_value("a", 1i64)).unwrap();
        assert!(receivers["0"].try_recv().is_none());

        writer.write(Row::key_value("a", 2i64)).unwrap();
        let batch = receivers["0"].try_recv().unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_finite_key_routing_drops_foreign_keys() {
        let (writer, receivers, _cancel) = writer_with(
            &["x", "y"],
            Arc::new(FiniteKeyPartitioner::new(["x", "y"])),
            "0",
        );
        let mut writer = writer;

        for key in ["x", "z", "y", "z"] {
            writer.write(Row::key_value(key, 1i64)).unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(drain(&receivers["x"]).len(), 1);
        assert_eq!(drain(&receivers["y"]).len(), 1);
    }

    #[test]
    fn test_preserve_routing_keeps_emission_order() {
        let (writer, receivers, _cancel) =
            writer_with(&["7"], Arc::new(PreservePartitioner::new()), "7");
        let mut writer = writer.with_batch_size(3);

        for i in 0..10i64 {
            writer.write(Row::key_value(format!("k{i}"), i)).unwrap();
        }
        writer.flush().unwrap();

        let rows = drain(&receivers["7"]);
        assert_eq!(rows.len(), 10);
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("k{i}")).collect();
        assert_eq!(keys, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_unknown_destination_is_transport_error() {
        let (writer, _receivers, _cancel) =
            writer_with(&["0"], Arc::new(PreservePartitioner::new()), "9");
        let mut writer = writer.with_batch_size(1);

        let err = writer.write(Row::value(1i64)).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_close_flushes_and_is_idempotent() {
        let (writer, receivers, _cancel) =
            writer_with(&["0"], Arc::new(HashKeyPartitioner::new()), "0");
        let mut writer = writer;

        writer.write(Row::key_value("a", 1i64)).unwrap();
        writer.close().unwrap();
        assert_eq!(drain(&receivers["0"]).len(), 1);

        // Second close returns the cached outcome without touching endpoints.
        writer.close().unwrap();
    }

    #[test]
    fn test_write_after_endpoint_closed_fails() {
        let (writer, _receivers, _cancel) =
            writer_with(&["0"], Arc::new(HashKeyPartitioner::new()), "0");
        let mut writer = writer.with_batch_size(1);

        writer.close().unwrap();
        let err = writer.write(Row::value(1i64)).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_zero_fanout_is_fatal() {
        let (writer, _receivers, _cancel) =
            writer_with(&[], Arc::new(HashKeyPartitioner::new()), "0");
        let mut writer = writer;

        let err = writer.write(Row::value(1i64)).unwrap_err();
        assert_eq!(err, Error::InvalidFanOut(0));
    }
}
