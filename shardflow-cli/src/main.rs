use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shardflow_api::job::JobBuilder;
use shardflow_api::local::LocalPipeline;
use shardflow_core::context::TaskContext;
use shardflow_core::output::OutputWriter;
use shardflow_core::partition::{
    wire, FiniteKeyPartitioner, HashKeyPartitioner, MasterAffinityPartitioner, Partitioner,
    PreservePartitioner, ShuffledPartitioner,
};
use shardflow_core::row::{Row, Value, DEFAULT_FIELD};
use shardflow_core::stage::{RunnerRegistry, StageRunner};

#[derive(Parser, Debug)]
#[command(name = "shardflow")]
#[command(about = "Shardflow dataflow engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the canonical wordcount job through the local pipeline.
    Wordcount {
        /// Input text file; a built-in sample is used when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 2)]
        fanout: usize,
    },
    /// Print the partition plan a partitioner produces for a fan-out.
    Plan {
        #[arg(long, value_enum, default_value = "hash")]
        partitioner: PartitionerKind,
        #[arg(long, default_value_t = 4)]
        fanout: usize,
        /// Fixed key set for the finite partitioner.
        #[arg(long, value_delimiter = ',')]
        keys: Vec<String>,
        /// Wrap the plan with master-node assignment affinity.
        #[arg(long, default_value_t = false)]
        assign_master: bool,
        /// Also print the wire envelope of the partitioner.
        #[arg(long, default_value_t = false)]
        wire: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PartitionerKind {
    Hash,
    Shuffled,
    Preserve,
    Finite,
}

#[derive(Debug)]
struct SplitLines;

impl StageRunner for SplitLines {
    fn apply(&mut self, _ctx: &TaskContext, batch: Vec<Row>, out: &mut OutputWriter) -> Result<()> {
        for row in batch {
            let line = match row.get(DEFAULT_FIELD) {
                Some(Value::String(line)) => line.clone(),
                other => return Err(anyhow!("expected a line, found {other:?}")),
            };
            for word in line.split_whitespace() {
                out.write(Row::key_value(word.to_lowercase(), 1i64))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CountWords {
    counts: HashMap<String, i64>,
}

impl StageRunner for CountWords {
    fn apply(
        &mut self,
        _ctx: &TaskContext,
        batch: Vec<Row>,
        _out: &mut OutputWriter,
    ) -> Result<()> {
        for row in batch {
            let increment = match row.get(DEFAULT_FIELD) {
                Some(Value::Int(increment)) => *increment,
                other => return Err(anyhow!("expected a count, found {other:?}")),
            };
            *self.counts.entry(row.key).or_insert(0) += increment;
        }
        Ok(())
    }

    fn teardown(&mut self, _ctx: &TaskContext, out: &mut OutputWriter) -> Result<()> {
        for (word, count) in self.counts.drain() {
            out.write(Row::key_value(word, count))?;
        }
        Ok(())
    }
}

const SAMPLE_TEXT: &str = "the quick brown fox\njumps over the lazy dog\nthe dog sleeps";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Wordcount { input, fanout } => run_wordcount(input, fanout),
        Commands::Plan {
            partitioner,
            fanout,
            keys,
            assign_master,
            wire,
        } => print_plan(partitioner, fanout, keys, assign_master, wire),
    }
}

fn run_wordcount(input: Option<PathBuf>, fanout: usize) -> Result<()> {
    let text = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE_TEXT.to_string(),
    };
    let rows: Vec<Row> = text.lines().map(Row::value).collect();

    let registry = RunnerRegistry::new()
        .with_runner("wordcount::split", |_| {
            Ok(Box::new(SplitLines) as Box<dyn StageRunner>)
        })
        .with_runner("wordcount::count", |_| {
            Ok(Box::new(CountWords::default()) as Box<dyn StageRunner>)
        });

    let job = JobBuilder::new("wordcount")
        .stage("split", "wordcount::split", Vec::new())
        .partitioned_by(ShuffledPartitioner::new())
        .fanout(fanout)
        .stage("count", "wordcount::count", Vec::new())
        .partitioned_by(HashKeyPartitioner::new())
        .fanout(fanout);

    let results = LocalPipeline::new(registry).run(&job, rows)?;

    let mut counts: Vec<(String, i64)> = results
        .into_iter()
        .map(|row| {
            let count = match row.get(DEFAULT_FIELD) {
                Some(Value::Int(count)) => *count,
                _ => 0,
            };
            (row.key, count)
        })
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (word, count) in counts {
        println!("{count:>6}  {word}");
    }
    Ok(())
}

fn print_plan(
    kind: PartitionerKind,
    fanout: usize,
    keys: Vec<String>,
    assign_master: bool,
    print_wire: bool,
) -> Result<()> {
    let mut partitioner: Box<dyn Partitioner> = match kind {
        PartitionerKind::Hash => Box::new(HashKeyPartitioner::new()),
        PartitionerKind::Shuffled => Box::new(ShuffledPartitioner::new()),
        PartitionerKind::Preserve => Box::new(PreservePartitioner::new()),
        PartitionerKind::Finite => {
            if keys.is_empty() {
                return Err(anyhow!("--keys is required for the finite partitioner"));
            }
            Box::new(FiniteKeyPartitioner::new(keys))
        }
    };
    if assign_master {
        partitioner = Box::new(MasterAffinityPartitioner::wrap(partitioner));
    }

    for partition in partitioner.plan_next(fanout) {
        let placement = if partition.is_elastic {
            "elastic".to_string()
        } else {
            "pinned".to_string()
        };
        let affinity = if partition.assignment_affinity.is_empty() {
            String::new()
        } else {
            let mut labels: Vec<String> = partition
                .assignment_affinity
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            labels.sort();
            format!("  affinity: {}", labels.join(","))
        };
        println!("partition {:<12} {placement}{affinity}", partition.id);
    }

    if print_wire {
        println!("{}", String::from_utf8_lossy(&wire::encode(partitioner.as_ref())));
    }
    Ok(())
}
