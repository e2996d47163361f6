//! In-process job execution: one executor thread per task, wired with the
//! core batch channels.
//!
//! The driver plays both out-of-scope roles around the execution core: the
//! master (planning partitions, publishing stage closures to the broadcast
//! table, stamping task references) and the shuffle fabric (local endpoints
//! between consecutive stages). The final stage drains into a single gather
//! lane returned to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, ensure, Context};

use shardflow_core::channel::{batch_channel, BatchReceiver, BatchSender, DEFAULT_CHANNEL_CAPACITY};
use shardflow_core::context::{
    cancel_pair, stage_broadcast_key, BroadcastTable, TaskContext,
};
use shardflow_core::executor::TaskExecutor;
use shardflow_core::input::InputReader;
use shardflow_core::job::{InMemoryReporter, JobReporter, Task, TaskReference};
use shardflow_core::output::{LocalEndpoint, OutputWriter, ShuffleEndpoint};
use shardflow_core::partition::{HashKeyPartitioner, Partition, PartitionContext, Partitioner};
use shardflow_core::row::Row;
use shardflow_core::stage::{RunnerRegistry, Stage};

use crate::job::JobBuilder;

/// Runs a job's stage chain inside the current process.
pub struct LocalPipeline {
    registry: Arc<RunnerRegistry>,
    channel_capacity: usize,
}

impl LocalPipeline {
    pub fn new(registry: RunnerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Override the capacity of the inter-stage channels.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Execute the job over the given source rows and collect the final
    /// stage's output. The first task failure fails the job.
    pub fn run(&self, job: &JobBuilder, input: Vec<Row>) -> anyhow::Result<Vec<Row>> {
        let stages = job.stages();
        ensure!(!stages.is_empty(), "job {} has no stages", job.job_id());
        for spec in stages {
            ensure!(
                spec.fanout >= 1,
                "stage {} has zero fan-out",
                spec.name
            );
        }
        tracing::info!(
            job = job.job_id(),
            stages = stages.len(),
            rows = input.len(),
            "starting local pipeline"
        );

        // Publish every stage's serialised closure the way worker init would.
        let mut broadcasts = BroadcastTable::new();
        for spec in stages {
            let payload = spec
                .descriptor
                .to_bytes()
                .with_context(|| format!("serialize stage {}", spec.name))?;
            broadcasts.insert(stage_broadcast_key(&spec.name), payload);
        }
        let broadcasts = Arc::new(broadcasts);

        // Plan each stage and build its inbound lanes.
        let mut inbound: Vec<StageLanes> = Vec::with_capacity(stages.len());
        for spec in stages {
            let plan = spec.partitioner.plan_next(spec.fanout);
            ensure!(!plan.is_empty(), "stage {} planned no partitions", spec.name);
            let mut senders = HashMap::new();
            let mut receivers = Vec::new();
            for partition in plan {
                let (sender, receiver) = batch_channel(self.channel_capacity);
                ensure!(
                    senders.insert(partition.id.clone(), sender).is_none(),
                    "duplicate partition id {} in stage {} plan",
                    partition.id,
                    spec.name
                );
                receivers.push((partition, receiver));
            }
            inbound.push(StageLanes { senders, receivers });
        }

        // Terminal gather lane for the last stage's output.
        let (sink_sender, sink_receiver) = batch_channel(self.channel_capacity);
        let gather_partitioner: Arc<dyn Partitioner> = Arc::new(HashKeyPartitioner::new());

        let reporter = Arc::new(InMemoryReporter::new());
        let source_senders = inbound[0].senders.clone();
        let mut handles = Vec::new();
        let mut cancel_handles = Vec::new();

        for (index, spec) in stages.iter().enumerate() {
            let (downstream_partitioner, downstream_senders) = if index + 1 < stages.len() {
                (
                    Arc::clone(&stages[index + 1].partitioner),
                    inbound[index + 1].senders.clone(),
                )
            } else {
                let mut gather = HashMap::new();
                gather.insert("0".to_string(), sink_sender.clone());
                (Arc::clone(&gather_partitioner), gather)
            };

            let receivers = std::mem::take(&mut inbound[index].receivers);
            for (partition, receiver) in receivers {
                let (cancel, signal) = cancel_pair();
                cancel_handles.push(cancel);
                let ctx = Arc::new(TaskContext::new(
                    partition.id.clone(),
                    Arc::clone(&broadcasts),
                    signal.clone(),
                ));
                let input = InputReader::new(receiver, signal.clone());
                let endpoints: HashMap<String, Box<dyn ShuffleEndpoint>> = downstream_senders
                    .iter()
                    .map(|(id, sender)| {
                        (
                            id.clone(),
                            Box::new(LocalEndpoint::new(sender.clone(), signal.clone()))
                                as Box<dyn ShuffleEndpoint>,
                        )
                    })
                    .collect();
                let output = OutputWriter::new(
                    Arc::clone(&ctx),
                    Arc::clone(&downstream_partitioner),
                    endpoints,
                );
                let task = Task::new(TaskReference::new(
                    job.job_id(),
                    &spec.name,
                    &partition.id,
                ));
                let mut executor = TaskExecutor::new(
                    ctx,
                    task,
                    Stage::new(&spec.name),
                    Arc::clone(&self.registry),
                    input,
                    output,
                    Arc::clone(&reporter) as Arc<dyn JobReporter>,
                );
                handles.push(thread::spawn(move || executor.execute()));
            }
        }
        // Only the spawned tasks may keep inter-stage lanes open, otherwise
        // upstream completion never propagates.
        drop(inbound);
        drop(sink_sender);

        let first_partitioner = Arc::clone(&stages[0].partitioner);
        let source = thread::spawn(move || feed_source(first_partitioner, source_senders, input));

        // Drain the gather lane before joining: the last stage blocks on a
        // full sink otherwise.
        let mut results = Vec::new();
        while let Some(batch) = sink_receiver.recv() {
            results.extend(batch);
        }

        source
            .join()
            .map_err(|_| anyhow!("source thread panicked"))??;
        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow!("executor thread panicked"))?;
        }
        drop(cancel_handles);

        if let Some((task, cause)) = reporter.failures().into_iter().next() {
            bail!("task {task} failed: {cause}");
        }
        tracing::info!(job = job.job_id(), rows = results.len(), "local pipeline finished");
        Ok(results)
    }
}

struct StageLanes {
    senders: HashMap<String, BatchSender>,
    receivers: Vec<(Partition, BatchReceiver)>,
}

/// The source routes rows into the first stage with that stage's own
/// partitioner, standing in for an upstream stage's output writer.
fn feed_source(
    partitioner: Arc<dyn Partitioner>,
    senders: HashMap<String, BatchSender>,
    input: Vec<Row>,
) -> anyhow::Result<()> {
    struct SourceContext;

    impl PartitionContext for SourceContext {
        fn partition_id(&self) -> &str {
            "0"
        }
    }

    let fanout = senders.len();
    let mut pending: HashMap<String, Vec<Row>> = HashMap::new();
    for row in input {
        match partitioner.determine_partition(&SourceContext, &row, fanout) {
            Ok(id) => pending.entry(id).or_default().push(row),
            Err(err) if err.is_no_output() => {}
            Err(err) => return Err(err.into()),
        }
    }
    for (id, rows) in pending {
        let sender = senders
            .get(&id)
            .ok_or_else(|| anyhow!("no inbound lane for partition {id}"))?;
        sender.send(rows)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardflow_core::row::{Value, DEFAULT_FIELD};
    use shardflow_core::stage::StageRunner;

    #[derive(Debug)]
    struct DoubleRunner;

    impl StageRunner for DoubleRunner {
        fn apply(
            &mut self,
            _ctx: &TaskContext,
            batch: Vec<Row>,
            out: &mut OutputWriter,
        ) -> anyhow::Result<()> {
            for row in batch {
                let doubled = match row.get(DEFAULT_FIELD) {
                    Some(Value::Int(v)) => v * 2,
                    other => return Err(anyhow!("unexpected value in double stage: {other:?}")),
                };
                out.write(Row::key_value(row.key, doubled))?;
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct ExplodeRunner;

    impl StageRunner for ExplodeRunner {
        fn apply(
            &mut self,
            _ctx: &TaskContext,
            _batch: Vec<Row>,
            _out: &mut OutputWriter,
        ) -> anyhow::Result<()> {
            Err(anyhow!("exploded"))
        }
    }

    fn registry() -> RunnerRegistry {
        RunnerRegistry::new()
            .with_runner("test::double", |_| {
                Ok(Box::new(DoubleRunner) as Box<dyn StageRunner>)
            })
            .with_runner("test::explode", |_| {
                Ok(Box::new(ExplodeRunner) as Box<dyn StageRunner>)
            })
    }

    #[test]
    fn test_single_stage_job() {
        let job = JobBuilder::new("double")
            .stage("double", "test::double", Vec::new())
            .fanout(2);
        let input: Vec<Row> = (1..=10i64)
            .map(|i| Row::key_value(format!("k{i}"), i))
            .collect();

        let mut results = LocalPipeline::new(registry()).run(&job, input).unwrap();
        results.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(results.len(), 10);
        let k1 = results.iter().find(|r| r.key == "k1").unwrap();
        assert_eq!(k1.get(DEFAULT_FIELD), Some(&Value::Int(2)));
    }

    #[test]
    fn test_failing_stage_fails_the_job() {
        let job = JobBuilder::new("explode").stage("explode", "test::explode", Vec::new());
        let err = LocalPipeline::new(registry())
            .run(&job, vec![Row::value(1i64)])
            .unwrap_err();
        assert!(err.to_string().contains("explode"));
    }

    #[test]
    fn test_empty_job_is_rejected() {
        let job = JobBuilder::new("empty");
        assert!(LocalPipeline::new(registry())
            .run(&job, Vec::new())
            .is_err());
    }
}
